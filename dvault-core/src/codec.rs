//! Typed property codec
//!
//! Converts properties to and from the attribute text used by the DocView
//! format:
//!
//! ```text
//! plain string          hello
//! typed scalar          {Long}42
//! multi-valued          {Name}[mix:versionable,mix:lockable]
//! binary                {Binary}aGVsbG8=
//! ```
//!
//! Escapes: `\\` for a backslash, `\,` for a comma inside a multi value,
//! `\[` / `\{` for a leading bracket of a single value, `\uXXXX` for
//! control characters and `\0` for an empty element of a multi value.

use crate::error::{Result, VaultError};
use crate::value::{Property, PropertyType};

/// Encode a property value into its attribute text
pub fn format(property: &Property) -> String {
    let mut out = String::new();
    if property.property_type() != PropertyType::String {
        out.push('{');
        out.push_str(property.property_type().name());
        out.push('}');
    }
    if property.is_multi() {
        out.push('[');
        for (i, value) in property.values().iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            escape_into(&mut out, &value.to_string(), true);
        }
        out.push(']');
    } else if let Some(value) = property.value() {
        escape_into(&mut out, &value.to_string(), false);
    }
    out
}

fn escape_into(out: &mut String, value: &str, multi: bool) {
    if multi && value.is_empty() {
        out.push_str("\\0");
        return;
    }
    for (i, c) in value.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' if multi => out.push_str("\\,"),
            '[' | '{' if i == 0 && !multi => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
}

/// Raw decoded attribute: type tag, multiplicity and unescaped value texts
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue {
    pub property_type: PropertyType,
    pub multi: bool,
    pub values: Vec<String>,
}

impl DecodedValue {
    /// Build a typed property from the decoded texts
    pub fn into_property(self, name: &str) -> Result<Property> {
        Property::from_strings(name, self.property_type, self.multi, &self.values)
    }
}

/// Decode attribute text into type, multiplicity and value texts
///
/// A missing or unknown `{Type}` prefix decodes as STRING (an unknown prefix
/// is kept as part of the value).
pub fn decode(text: &str) -> Result<DecodedValue> {
    let (property_type, rest) = split_type_prefix(text);
    if let Some(body) = rest.strip_prefix('[') {
        let inner = body.strip_suffix(']').ok_or_else(|| {
            VaultError::Malformed(format!("unterminated multi value: {}", text))
        })?;
        let values = if inner.is_empty() {
            Vec::new()
        } else {
            unescape(inner, true)?
        };
        Ok(DecodedValue {
            property_type,
            multi: true,
            values,
        })
    } else {
        let mut values = unescape(rest, false)?;
        Ok(DecodedValue {
            property_type,
            multi: false,
            values: vec![values.pop().unwrap_or_default()],
        })
    }
}

/// Decode attribute text into a typed property
pub fn parse(name: &str, text: &str) -> Result<Property> {
    decode(text)?.into_property(name)
}

fn split_type_prefix(text: &str) -> (PropertyType, &str) {
    if let Some(stripped) = text.strip_prefix('{') {
        if let Some(end) = stripped.find('}') {
            if let Some(ptype) = PropertyType::from_name(&stripped[..end]) {
                return (ptype, &stripped[end + 1..]);
            }
        }
    }
    (PropertyType::String, text)
}

fn unescape(text: &str, multi: bool) -> Result<Vec<String>> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('0') => {}
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    let decoded = u32::from_str_radix(&hex, 16)
                        .ok()
                        .filter(|_| hex.len() == 4)
                        .and_then(char::from_u32)
                        .ok_or_else(|| {
                            VaultError::Malformed(format!("invalid \\u escape in: {}", text))
                        })?;
                    current.push(decoded);
                }
                Some(other) => current.push(other),
                None => {
                    return Err(VaultError::Malformed(format!(
                        "dangling escape at end of: {}",
                        text
                    )));
                }
            },
            ',' if multi => values.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    values.push(current);
    Ok(values)
}

/// Serde adapter storing an ordered property list as a map of codec texts
pub mod serde_properties {
    use super::{format, parse};
    use crate::value::Property;
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(properties: &[Property], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(properties.iter().map(|p| (p.name(), format(p))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Property>, D::Error> {
        struct PropertiesVisitor;

        impl<'de> Visitor<'de> for PropertiesVisitor {
            type Value = Vec<Property>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of property names to encoded values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut properties = Vec::new();
                while let Some((name, text)) = map.next_entry::<String, String>()? {
                    properties.push(parse(&name, &text).map_err(serde::de::Error::custom)?);
                }
                Ok(properties)
            }
        }

        deserializer.deserialize_map(PropertiesVisitor)
    }
}
