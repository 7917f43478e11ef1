//! Distinguished name parsing and formatting
//!
//! DNs are handled as strings. The only structure extracted is the sequence
//! of RDNs, split on commas that are neither escaped with a backslash nor
//! inside a double-quoted value. Everything else about an RDN (multi-valued
//! `+` components, hex escapes) is preserved verbatim.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Coarse entry type derived from the first RDN's attribute.
///
/// This is a display heuristic, not a schema lookup: a `cn=` entry is shown
/// as a user even when it is a group or a DICOM device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryType {
    Domain,
    OrganizationalUnit,
    User,
    GenericEntry,
}

/// Byte offset of the quote closing the one opened at `open`, provided only
/// whitespace follows it before the next separator or the end.
fn closing_quote(bytes: &[u8], open: usize) -> Option<usize> {
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => {
                let closes = bytes[i + 1..]
                    .iter()
                    .find(|b| **b != b' ')
                    .map_or(true, |b| matches!(b, b',' | b'+'));
                return closes.then_some(i);
            }
            _ => i += 1,
        }
    }
    None
}

/// Byte offsets of every unescaped, unquoted comma in `dn`.
///
/// A `"` only quotes when it opens a value and is properly closed; any
/// other quote is an ordinary character.
fn separator_positions(dn: &str) -> Vec<usize> {
    let bytes = dn.as_bytes();
    let mut positions = Vec::new();
    let mut in_value = false;
    let mut value_start = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                value_start = false;
                i += 2;
                continue;
            }
            b'"' if value_start => {
                value_start = false;
                if let Some(end) = closing_quote(bytes, i) {
                    i = end + 1;
                    continue;
                }
            }
            b'=' if !in_value => {
                in_value = true;
                value_start = true;
            }
            b',' => {
                positions.push(i);
                in_value = false;
                value_start = false;
            }
            b'+' => {
                in_value = false;
                value_start = false;
            }
            b' ' => {}
            _ => value_start = false,
        }
        i += 1;
    }

    positions
}

fn first_separator(dn: &str) -> Option<usize> {
    separator_positions(dn).into_iter().next()
}

/// Parent DN: everything after the first unescaped comma, trimmed.
///
/// Returns `None` for a single-RDN DN.
pub fn parent_of(dn: &str) -> Option<&str> {
    first_separator(dn).map(|idx| dn[idx + 1..].trim())
}

/// The component before the first unescaped comma, trimmed.
pub fn first_rdn(dn: &str) -> &str {
    match first_separator(dn) {
        Some(idx) => dn[..idx].trim(),
        None => dn.trim(),
    }
}

/// All RDN components of `dn`, in order, each trimmed.
pub fn rdn_components(dn: &str) -> Vec<&str> {
    let mut components = Vec::new();
    let mut start = 0;
    for idx in separator_positions(dn) {
        components.push(dn[start..idx].trim());
        start = idx + 1;
    }
    components.push(dn[start..].trim());
    components
}

/// Number of RDNs in `dn`.
pub fn depth(dn: &str) -> usize {
    separator_positions(dn).len() + 1
}

/// Every proper ancestor of `dn`, closest first.
///
/// `cn=Bob,ou=People,dc=example,dc=com` yields
/// `ou=People,dc=example,dc=com`, `dc=example,dc=com`, `dc=com`.
pub fn ancestor_chain(dn: &str) -> Vec<&str> {
    let mut chain = Vec::new();
    let mut current = dn;
    while let Some(parent) = parent_of(current) {
        if parent.is_empty() {
            break;
        }
        chain.push(parent);
        current = parent;
    }
    chain
}

/// Attribute name and raw (still escaped) value of an RDN.
///
/// For a multi-valued RDN (`cn=a+sn=b`) only the first assertion is
/// returned. An RDN without `=` yields an empty attribute name.
pub fn split_rdn(rdn: &str) -> (&str, &str) {
    let rdn = rdn.trim();
    match rdn.find('=') {
        Some(idx) => {
            let value = &rdn[idx + 1..];
            let value = match plus_separator(value) {
                Some(end) => &value[..end],
                None => value,
            };
            (rdn[..idx].trim(), value.trim())
        }
        None => ("", rdn),
    }
}

fn plus_separator(value: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '+' => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Naming attribute of `dn`, lowercased.
pub fn naming_attribute(dn: &str) -> String {
    split_rdn(first_rdn(dn)).0.to_ascii_lowercase()
}

/// Unescaped value of the first RDN.
pub fn naming_value(dn: &str) -> String {
    unescape_value(split_rdn(first_rdn(dn)).1)
}

/// Classify an entry by the attribute prefix of its first RDN.
pub fn classify(dn: &str) -> EntryType {
    match naming_attribute(dn).as_str() {
        "dc" => EntryType::Domain,
        "ou" => EntryType::OrganizationalUnit,
        "cn" => EntryType::User,
        _ => EntryType::GenericEntry,
    }
}

/// Decode RFC 4514 escapes (`\,`, `\\`, `\2C`) and surrounding quotes.
pub fn unescape_value(raw: &str) -> String {
    let raw = raw.trim();
    let raw = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };

    let bytes = raw.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let hex = bytes
                .get(i + 1..i + 3)
                .filter(|pair| pair.iter().all(u8::is_ascii_hexdigit))
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok());
            match hex {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                }
                None => {
                    out.push(bytes[i + 1]);
                    i += 2;
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Escape a value for use inside an RDN.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && (ch == '#' || ch == ' '))
            || (idx == last && ch == ' ');
        if needs_escape {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Build `attr=value` with the value escaped.
pub fn make_rdn(attribute: &str, value: &str) -> String {
    format!("{}={}", attribute, escape_value(value))
}

/// Replace the first RDN of `dn`, keeping its parent.
pub fn with_first_rdn(dn: &str, new_rdn: &str) -> String {
    match parent_of(dn) {
        Some(parent) if !parent.is_empty() => format!("{},{}", new_rdn, parent),
        _ => new_rdn.to_string(),
    }
}

/// `rdn` with its first assertion's value replaced by `value`.
///
/// Further assertions of a multi-valued RDN are kept: `cn=a+sn=b` with `c`
/// becomes `cn=c+sn=b`.
pub fn replace_naming_value(rdn: &str, value: &str) -> String {
    let rdn = rdn.trim();
    let Some(eq) = rdn.find('=') else {
        return rdn.to_string();
    };
    let rest = match plus_separator(&rdn[eq + 1..]) {
        Some(end) => &rdn[eq + 1 + end..],
        None => "",
    };
    format!("{}{}", make_rdn(rdn[..eq].trim(), value), rest)
}

/// Case-insensitive comparison of two RDNs' attribute and unescaped value.
fn rdn_eq(a: &str, b: &str) -> bool {
    let (attr_a, value_a) = split_rdn(a);
    let (attr_b, value_b) = split_rdn(b);
    attr_a.eq_ignore_ascii_case(attr_b)
        && unescape_value(value_a).eq_ignore_ascii_case(&unescape_value(value_b))
}

/// Whether `dn` equals `base` or lies underneath it.
pub fn is_within(dn: &str, base: &str) -> bool {
    let dn_parts = rdn_components(dn);
    let base_parts = rdn_components(base);
    if base_parts.len() > dn_parts.len() {
        return false;
    }
    let offset = dn_parts.len() - base_parts.len();
    dn_parts[offset..]
        .iter()
        .zip(base_parts.iter())
        .all(|(a, b)| rdn_eq(a, b))
}

/// Reject DNs that cannot be sent to a server.
pub fn validate_dn(dn: &str) -> AppResult<()> {
    if dn.trim().is_empty() {
        return Err(AppError::Malformed("DN must not be empty".to_string()));
    }
    for rdn in rdn_components(dn) {
        let (attribute, value) = split_rdn(rdn);
        if attribute.is_empty() || value.is_empty() {
            return Err(AppError::Malformed(format!(
                "Invalid DN format \"{}\": every component must be an attribute=value pair",
                dn
            )));
        }
    }
    Ok(())
}
