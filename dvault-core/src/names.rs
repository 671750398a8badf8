//! Well-known item names and the two reversible name escapings
//!
//! - ISO 9075 escaping turns arbitrary node, type and property names into
//!   valid XML element/attribute tokens.
//! - Platform escaping turns node names into portable file names for the
//!   package directory layout.

/// Repository item names used by the pipeline
pub mod jcr {
    pub const PRIMARY_TYPE: &str = "jcr:primaryType";
    pub const MIXIN_TYPES: &str = "jcr:mixinTypes";
    pub const UUID: &str = "jcr:uuid";
    pub const CONTENT: &str = "jcr:content";
    pub const CREATED: &str = "jcr:created";
    pub const PREDECESSORS: &str = "jcr:predecessors";
    pub const SUCCESSORS: &str = "jcr:successors";
    pub const VERSIONABLE_UUID: &str = "jcr:versionableUuid";
    pub const VERSION_LABELS: &str = "jcr:versionLabels";
    pub const ROOT_VERSION: &str = "jcr:rootVersion";
    pub const FROZEN_NODE: &str = "jcr:frozenNode";
    pub const FROZEN_UUID: &str = "jcr:frozenUuid";
    pub const FROZEN_PRIMARY_TYPE: &str = "jcr:frozenPrimaryType";
    pub const FROZEN_MIXIN_TYPES: &str = "jcr:frozenMixinTypes";
    pub const SYSTEM: &str = "jcr:system";
    pub const VERSION_STORAGE: &str = "jcr:versionStorage";

    /// Absolute path of the version storage root
    pub const VERSION_STORAGE_PATH: &str = "/jcr:system/jcr:versionStorage";

    pub const NT_UNSTRUCTURED: &str = "nt:unstructured";
    pub const NT_FOLDER: &str = "nt:folder";
    pub const NT_VERSION_HISTORY: &str = "nt:versionHistory";
    pub const NT_VERSION: &str = "nt:version";
    pub const NT_VERSION_LABELS: &str = "nt:versionLabels";
    pub const NT_FROZEN_NODE: &str = "nt:frozenNode";
    pub const MIX_VERSIONABLE: &str = "mix:versionable";
    pub const MIX_REFERENCEABLE: &str = "mix:referenceable";
    pub const REP_ROOT: &str = "rep:root";
    pub const REP_SYSTEM: &str = "rep:system";
    pub const REP_VERSION_STORAGE: &str = "rep:versionStorage";
    pub const REP_ACL: &str = "rep:ACL";
    pub const REP_CUG_POLICY: &str = "rep:CugPolicy";
    pub const REP_ACCESS_CONTROLLABLE: &str = "rep:AccessControllable";
}

/// Vault namespace items used in serialized content
pub mod vlt {
    /// Reserved attribute carrying the original node name
    pub const NODENAME: &str = "vlt:nodename";
    /// Root element of a version sidecar
    pub const VERSIONS: &str = "vlt:versions";
    /// Attribute of the version sidecar root carrying the aggregate path
    pub const PATH: &str = "path";

    pub const NS_URI: &str = "http://www.day.com/jcr/vault/1.0";
}

/// Namespace declarations written on every serialized root element
pub const NAMESPACES: &[(&str, &str)] = &[
    ("xmlns:jcr", "http://www.jcp.org/jcr/1.0"),
    ("xmlns:nt", "http://www.jcp.org/jcr/nt/1.0"),
    ("xmlns:mix", "http://www.jcp.org/jcr/mix/1.0"),
    ("xmlns:rep", "internal"),
    ("xmlns:vlt", vlt::NS_URI),
];

fn is_name_start_char(c: char) -> bool {
    c == ':' || c == '_' || c.is_alphabetic()
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c) || c == '-' || c == '.' || c.is_numeric()
}

/// Escape a name so that it is a valid XML name token (ISO 9075)
pub fn iso9075_encode(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len());
    for (i, &c) in chars.iter().enumerate() {
        let valid = if i == 0 { is_name_start_char(c) } else { is_name_char(c) };
        // a literal "_x" would be read back as an escape sequence
        let literal_escape = c == '_' && chars.get(i + 1) == Some(&'x');
        if valid && !literal_escape {
            out.push(c);
        } else {
            out.push_str(&format!("_x{:04X}_", c as u32));
        }
    }
    out
}

/// Reverse [`iso9075_encode`]
pub fn iso9075_decode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(pos) = rest.find("_x") {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos + 2..];
        match decode_hex_escape(candidate) {
            Some((c, consumed)) => {
                out.push(c);
                rest = &candidate[consumed..];
            }
            None => {
                out.push_str("_x");
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse `HHHH_` (4 to 6 hex digits) at the start of `s`
fn decode_hex_escape(s: &str) -> Option<(char, usize)> {
    let end = s.find('_')?;
    if !(4..=6).contains(&end) || !s[..end].chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let code = u32::from_str_radix(&s[..end], 16).ok()?;
    char::from_u32(code).map(|c| (c, end + 1))
}

const ILLEGAL_FILE_CHARS: &[char] = &['%', '/', '\\', ':', '*', '?', '"', '<', '>', '|'];

fn percent_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if ILLEGAL_FILE_CHARS.contains(&c) || (c as u32) < 0x20 {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

fn percent_unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '%' {
            if let Some(code) = s.get(i + 1..i + 3).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(code as char);
                chars.next();
                chars.next();
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Convert a repository node name into a portable file name
///
/// `jcr:content` becomes `_jcr_content`, a leading underscore is doubled
/// and characters that are illegal in file names are percent-encoded.
pub fn to_platform_name(name: &str) -> String {
    match name.split_once(':') {
        Some((prefix, local)) if !prefix.is_empty() && !prefix.contains('_') => {
            format!("_{}_{}", percent_escape(prefix), percent_escape(local))
        }
        _ if name.starts_with('_') => format!("_{}", percent_escape(name)),
        _ => percent_escape(name),
    }
}

/// Reverse [`to_platform_name`]
pub fn from_platform_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("__") {
        return percent_unescape(&format!("_{}", rest));
    }
    if let Some(rest) = name.strip_prefix('_') {
        if let Some((prefix, local)) = rest.split_once('_') {
            if !prefix.is_empty() {
                return format!("{}:{}", percent_unescape(prefix), percent_unescape(local));
            }
        }
    }
    percent_unescape(name)
}

/// Convert an absolute repository path into relative platform path segments
pub fn to_platform_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(to_platform_name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso9075_keeps_valid_names() {
        assert_eq!(iso9075_encode("jcr:primaryType"), "jcr:primaryType");
        assert_eq!(iso9075_encode("nt:unstructured"), "nt:unstructured");
        assert_eq!(iso9075_encode("my-prop.x"), "my-prop.x");
    }

    #[test]
    fn test_iso9075_escapes_invalid_chars() {
        assert_eq!(iso9075_encode("1.0"), "_x0031_.0");
        assert_eq!(iso9075_encode("my prop"), "my_x0020_prop");
        assert_eq!(iso9075_encode("a_xb"), "a_x005F_xb");
    }

    #[test]
    fn test_iso9075_roundtrip() {
        for name in ["1.0", "my prop", "a_xb", "_x0020_", "label with spaces", "ok", "é-ü"] {
            assert_eq!(iso9075_decode(&iso9075_encode(name)), name, "name {:?}", name);
        }
    }

    #[test]
    fn test_iso9075_decode_ignores_incomplete_escape() {
        assert_eq!(iso9075_decode("a_xzz_b"), "a_xzz_b");
        assert_eq!(iso9075_decode("a_x"), "a_x");
    }

    #[test]
    fn test_platform_name_namespaces() {
        assert_eq!(to_platform_name("jcr:content"), "_jcr_content");
        assert_eq!(from_platform_name("_jcr_content"), "jcr:content");
        assert_eq!(to_platform_name("rep:policy"), "_rep_policy");
    }

    #[test]
    fn test_platform_name_roundtrip() {
        for name in ["page", "_hidden", "a:b", "with/slash", "100%", "a_b", "q?"] {
            assert_eq!(from_platform_name(&to_platform_name(name)), name, "name {:?}", name);
        }
    }

    #[test]
    fn test_platform_path_segments() {
        assert_eq!(
            to_platform_path("/content/site/jcr:content"),
            vec!["content", "site", "_jcr_content"]
        );
        assert!(to_platform_path("/").is_empty());
    }
}
