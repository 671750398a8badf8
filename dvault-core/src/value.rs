//! Typed property values
//!
//! A property carries a type tag, a multiplicity flag and an ordered list
//! of values of that type.

use crate::error::{Result, VaultError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use std::fmt;

/// Property type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    String,
    Binary,
    Long,
    Double,
    Date,
    Boolean,
    Name,
    Path,
    Reference,
    WeakReference,
    Uri,
    Decimal,
}

impl PropertyType {
    /// All type tags
    pub const ALL: [PropertyType; 12] = [
        PropertyType::String,
        PropertyType::Binary,
        PropertyType::Long,
        PropertyType::Double,
        PropertyType::Date,
        PropertyType::Boolean,
        PropertyType::Name,
        PropertyType::Path,
        PropertyType::Reference,
        PropertyType::WeakReference,
        PropertyType::Uri,
        PropertyType::Decimal,
    ];

    /// Canonical type name as used in the `{Type}` value prefix
    pub fn name(&self) -> &'static str {
        match self {
            PropertyType::String => "String",
            PropertyType::Binary => "Binary",
            PropertyType::Long => "Long",
            PropertyType::Double => "Double",
            PropertyType::Date => "Date",
            PropertyType::Boolean => "Boolean",
            PropertyType::Name => "Name",
            PropertyType::Path => "Path",
            PropertyType::Reference => "Reference",
            PropertyType::WeakReference => "WeakReference",
            PropertyType::Uri => "URI",
            PropertyType::Decimal => "Decimal",
        }
    }

    /// Look up a type by its canonical name. `Undefined` maps to STRING.
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "Undefined" {
            return Some(PropertyType::String);
        }
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single typed value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Binary(Bytes),
    Long(i64),
    Double(f64),
    Date(DateTime<FixedOffset>),
    Boolean(bool),
    Name(String),
    Path(String),
    Reference(String),
    WeakReference(String),
    Uri(String),
    /// Decimal text, validated on parse and kept verbatim
    Decimal(String),
}

impl Value {
    /// Parse the textual form of a value of the given type
    ///
    /// BINARY text is base64, DATE text is ISO 8601.
    pub fn parse(ptype: PropertyType, text: &str) -> Result<Self> {
        let invalid = |reason: &dyn fmt::Display| VaultError::invalid_value(ptype.name(), text, reason);
        Ok(match ptype {
            PropertyType::String => Value::String(text.to_string()),
            PropertyType::Binary => Value::Binary(Bytes::from(
                BASE64.decode(text.trim()).map_err(|e| invalid(&e))?,
            )),
            PropertyType::Long => Value::Long(text.trim().parse().map_err(|e| invalid(&e))?),
            PropertyType::Double => Value::Double(text.trim().parse().map_err(|e| invalid(&e))?),
            PropertyType::Date => Value::Date(
                DateTime::parse_from_rfc3339(text.trim()).map_err(|e| invalid(&e))?,
            ),
            PropertyType::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => return Err(invalid(&"expected 'true' or 'false'")),
            },
            PropertyType::Name => Value::Name(text.to_string()),
            PropertyType::Path => Value::Path(text.to_string()),
            PropertyType::Reference => Value::Reference(text.to_string()),
            PropertyType::WeakReference => Value::WeakReference(text.to_string()),
            PropertyType::Uri => Value::Uri(text.to_string()),
            PropertyType::Decimal => {
                if !is_decimal(text.trim()) {
                    return Err(invalid(&"not a decimal number"));
                }
                Value::Decimal(text.trim().to_string())
            }
        })
    }

    /// Type tag of this value
    pub fn property_type(&self) -> PropertyType {
        match self {
            Value::String(_) => PropertyType::String,
            Value::Binary(_) => PropertyType::Binary,
            Value::Long(_) => PropertyType::Long,
            Value::Double(_) => PropertyType::Double,
            Value::Date(_) => PropertyType::Date,
            Value::Boolean(_) => PropertyType::Boolean,
            Value::Name(_) => PropertyType::Name,
            Value::Path(_) => PropertyType::Path,
            Value::Reference(_) => PropertyType::Reference,
            Value::WeakReference(_) => PropertyType::WeakReference,
            Value::Uri(_) => PropertyType::Uri,
            Value::Decimal(_) => PropertyType::Decimal,
        }
    }

    /// Current time as a DATE value, truncated to the serialized precision
    pub fn now() -> Self {
        let now = Utc::now().fixed_offset();
        let text = now.to_rfc3339_opts(SecondsFormat::Millis, false);
        match DateTime::parse_from_rfc3339(&text) {
            Ok(date) => Value::Date(date),
            Err(_) => Value::Date(now),
        }
    }

    /// String content for textual values; `None` for typed scalars
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s)
            | Value::Name(s)
            | Value::Path(s)
            | Value::Reference(s)
            | Value::WeakReference(s)
            | Value::Uri(s)
            | Value::Decimal(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Binary(data) => f.write_str(&BASE64.encode(data)),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            // fixed form, sub-millisecond precision is dropped
            Value::Date(d) => f.write_str(&d.to_rfc3339_opts(SecondsFormat::Millis, false)),
            Value::Boolean(b) => write!(f, "{}", b),
            other => f.write_str(other.as_str().unwrap_or_default()),
        }
    }
}

fn is_decimal(s: &str) -> bool {
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (mantissa, exponent) = match body.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (body, None),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    let mantissa_ok = !(int.is_empty() && frac.is_empty()) && digits(int) && digits(frac);
    let exponent_ok = exponent.is_none_or(|e| {
        let e = e.strip_prefix(['-', '+']).unwrap_or(e);
        !e.is_empty() && digits(e)
    });
    mantissa_ok && exponent_ok
}

/// A named, typed, possibly multi-valued property
///
/// Invariants: a single-valued property holds exactly one value and every
/// value carries the property type.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    ptype: PropertyType,
    multi: bool,
    values: Vec<Value>,
}

impl Property {
    /// Create a single-valued property
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            ptype: value.property_type(),
            multi: false,
            values: vec![value],
        }
    }

    /// Create a multi-valued property; every value must be of `ptype`
    pub fn multi(name: impl Into<String>, ptype: PropertyType, values: Vec<Value>) -> Result<Self> {
        let name = name.into();
        if let Some(bad) = values.iter().find(|v| v.property_type() != ptype) {
            return Err(VaultError::invalid_value(
                ptype.name(),
                &bad.to_string(),
                format!("value of type {} in property {}", bad.property_type(), name),
            ));
        }
        Ok(Self {
            name,
            ptype,
            multi: true,
            values,
        })
    }

    /// Create a property from textual values, parsing each according to `ptype`
    pub fn from_strings(
        name: impl Into<String>,
        ptype: PropertyType,
        multi: bool,
        values: &[String],
    ) -> Result<Self> {
        let name = name.into();
        let parsed = values
            .iter()
            .map(|v| Value::parse(ptype, v))
            .collect::<Result<Vec<_>>>()?;
        if multi {
            Self::multi(name, ptype, parsed)
        } else {
            match <[Value; 1]>::try_from(parsed) {
                Ok([value]) => Ok(Self::new(name, value)),
                Err(parsed) => Err(VaultError::Malformed(format!(
                    "single-valued property {} has {} values",
                    name,
                    parsed.len()
                ))),
            }
        }
    }

    /// Convenience constructor for a single STRING property
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, Value::String(value.into()))
    }

    /// Convenience constructor for a multi-valued NAME property
    pub fn names(name: impl Into<String>, values: &[String]) -> Self {
        Self {
            name: name.into(),
            ptype: PropertyType::Name,
            multi: true,
            values: values.iter().cloned().map(Value::Name).collect(),
        }
    }

    /// Convenience constructor for a multi-valued REFERENCE property
    pub fn references(name: impl Into<String>, values: &[String]) -> Self {
        Self {
            name: name.into(),
            ptype: PropertyType::Reference,
            multi: true,
            values: values.iter().cloned().map(Value::Reference).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_type(&self) -> PropertyType {
        self.ptype
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// First (for single-valued properties: the only) value
    pub fn value(&self) -> Option<&Value> {
        self.values.first()
    }

    /// Textual form of every value
    pub fn value_strings(&self) -> Vec<String> {
        self.values.iter().map(|v| v.to_string()).collect()
    }

    /// Same property under another name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}
