//! Quick-add entry templates and the ad-hoc checks run before an add
//!
//! The checks are not schema validation; they catch the mistakes that most
//! often produce an opaque server error.

use super::dn;
use super::entry::{find_attribute, AttributeValue, Attributes};
use crate::error::{AppError, AppResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Object classes the console knows templates or rules for
static KNOWN_OBJECT_CLASSES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "top",
        "person",
        "organizationalperson",
        "inetorgperson",
        "organizationalunit",
        "groupofnames",
        "posixaccount",
        "account",
        "dcobject",
        "organization",
        "domain",
        "country",
    ]
    .into_iter()
    .collect()
});

/// Required attributes per object class (lowercased class name)
const REQUIRED_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("person", &["cn", "sn"]),
    ("organizationalunit", &["ou"]),
    ("groupofnames", &["member"]),
    ("posixaccount", &["uid", "uidNumber", "gidNumber", "homeDirectory"]),
];

/// Template kinds offered by quick-add
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateKind {
    Person,
    OrganizationalUnit,
    GroupOfNames,
    PosixAccount,
}

impl TemplateKind {
    /// Parse a template name; unknown names fall back to organizationalUnit.
    pub fn parse_or_default(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "person" | "inetorgperson" => TemplateKind::Person,
            "groupofnames" | "group" => TemplateKind::GroupOfNames,
            "posixaccount" => TemplateKind::PosixAccount,
            _ => TemplateKind::OrganizationalUnit,
        }
    }
}

/// Suggested DN and starter attributes for a new entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryTemplate {
    pub kind: TemplateKind,
    pub dn: String,
    pub attributes: Attributes,
}

fn attrs(pairs: Vec<(&str, AttributeValue)>) -> Attributes {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn under(rdn: &str, base_dn: &str) -> String {
    if base_dn.trim().is_empty() {
        rdn.to_string()
    } else {
        format!("{},{}", rdn, base_dn.trim())
    }
}

/// Starter entry of `kind` underneath `base_dn`.
pub fn entry_template(kind: TemplateKind, base_dn: &str) -> EntryTemplate {
    let (dn, attributes) = match kind {
        TemplateKind::Person => (
            under("cn=John Doe", base_dn),
            attrs(vec![
                (
                    "objectClass",
                    vec!["top", "person", "organizationalPerson", "inetOrgPerson"].into(),
                ),
                ("cn", "John Doe".into()),
                ("sn", "Doe".into()),
                ("givenName", "John".into()),
                ("uid", "jdoe".into()),
                ("mail", "john.doe@example.com".into()),
                ("displayName", "John Doe".into()),
            ]),
        ),
        TemplateKind::OrganizationalUnit => (
            under("ou=NewOU", base_dn),
            attrs(vec![
                ("objectClass", vec!["top", "organizationalUnit"].into()),
                ("ou", "NewOU".into()),
                ("description", "New Organizational Unit".into()),
            ]),
        ),
        TemplateKind::GroupOfNames => (
            under("cn=NewGroup", base_dn),
            attrs(vec![
                ("objectClass", vec!["top", "groupOfNames"].into()),
                ("cn", "NewGroup".into()),
                ("description", "New Group".into()),
                // groupOfNames needs at least one member; the template admin
                // is a placeholder the operator replaces.
                ("member", under("cn=admin", base_dn).into()),
            ]),
        ),
        TemplateKind::PosixAccount => (
            under("uid=user1", base_dn),
            attrs(vec![
                ("objectClass", vec!["top", "account", "posixAccount"].into()),
                ("uid", "user1".into()),
                ("cn", "User One".into()),
                ("uidNumber", "1000".into()),
                ("gidNumber", "1000".into()),
                ("homeDirectory", "/home/user1".into()),
                ("loginShell", "/bin/bash".into()),
            ]),
        ),
    };

    EntryTemplate {
        kind,
        dn,
        attributes,
    }
}

/// Check a quick-add request before anything is sent to the server.
pub fn validate_new_entry(entry_dn: &str, attributes: &Attributes, base_dn: &str) -> AppResult<()> {
    if !entry_dn.contains('=') {
        return Err(AppError::Malformed(
            "Invalid DN format. DN must contain at least one attribute=value pair.".to_string(),
        ));
    }
    dn::validate_dn(entry_dn)?;

    if base_dn.trim().is_empty() {
        return Err(AppError::Malformed(
            "No database selected. Please select a database first.".to_string(),
        ));
    }
    if !dn::is_within(entry_dn, base_dn) {
        return Err(AppError::Malformed(format!(
            "Entry DN \"{}\" must end with the selected database \"{}\"",
            entry_dn, base_dn
        )));
    }

    let classes = match find_attribute(attributes, "objectClass") {
        Some((_, AttributeValue::Many(classes))) if !classes.is_empty() => classes,
        _ => {
            return Err(AppError::Malformed(
                "objectClass must be an array of strings".to_string(),
            ))
        }
    };

    let lowered: Vec<String> = classes.iter().map(|c| c.to_ascii_lowercase()).collect();
    for (class, original) in lowered.iter().zip(classes) {
        if !KNOWN_OBJECT_CLASSES.contains(class.as_str()) {
            tracing::warn!(object_class = %original, dn = %entry_dn, "Unknown objectClass");
        }
    }

    for (class, required) in REQUIRED_ATTRIBUTES {
        if !lowered.iter().any(|c| c == class) {
            continue;
        }
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|attr| !has_value(attributes, attr))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Malformed(format!(
                "{} entries require {} attribute(s)",
                class_display(class),
                missing
                    .iter()
                    .map(|a| format!("'{}'", a))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
    }

    Ok(())
}

fn has_value(attributes: &Attributes, name: &str) -> bool {
    match find_attribute(attributes, name) {
        Some((_, AttributeValue::One(v))) => !v.trim().is_empty(),
        Some((_, AttributeValue::Many(vs))) => vs.iter().any(|v| !v.trim().is_empty()),
        None => false,
    }
}

fn class_display(lowered: &str) -> &'static str {
    match lowered {
        "person" => "person",
        "organizationalunit" => "organizationalUnit",
        "groupofnames" => "groupOfNames",
        "posixaccount" => "posixAccount",
        _ => "these",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "dc=example,dc=com";

    #[test]
    fn test_templates_validate_against_their_base() {
        for kind in [
            TemplateKind::Person,
            TemplateKind::OrganizationalUnit,
            TemplateKind::GroupOfNames,
            TemplateKind::PosixAccount,
        ] {
            let template = entry_template(kind, BASE);
            assert!(template.dn.ends_with(BASE));
            validate_new_entry(&template.dn, &template.attributes, BASE)
                .unwrap_or_else(|e| panic!("{:?} template invalid: {}", kind, e));
        }
    }

    #[test]
    fn test_unknown_template_falls_back_to_ou() {
        assert_eq!(TemplateKind::parse_or_default("printer"), TemplateKind::OrganizationalUnit);
        assert_eq!(TemplateKind::parse_or_default("Person"), TemplateKind::Person);
    }

    #[test]
    fn test_rejects_dn_outside_base() {
        let template = entry_template(TemplateKind::OrganizationalUnit, "dc=other,dc=org");
        let err = validate_new_entry(&template.dn, &template.attributes, BASE).unwrap_err();
        assert!(err.to_string().contains("must end with the selected database"));
    }

    #[test]
    fn test_rejects_dn_without_equals() {
        let err = validate_new_entry("NewOU", &Attributes::new(), BASE).unwrap_err();
        assert!(err.to_string().contains("Invalid DN format"));
    }

    #[test]
    fn test_object_class_must_be_list() {
        let mut attributes = Attributes::new();
        attributes.insert("objectClass".to_string(), "organizationalUnit".into());
        attributes.insert("ou".to_string(), "X".into());
        let err = validate_new_entry("ou=X,dc=example,dc=com", &attributes, BASE).unwrap_err();
        assert_eq!(err.to_string(), "objectClass must be an array of strings");
    }

    #[test]
    fn test_person_requires_sn() {
        let mut template = entry_template(TemplateKind::Person, BASE);
        template.attributes.remove("sn");
        let err = validate_new_entry(&template.dn, &template.attributes, BASE).unwrap_err();
        assert_eq!(err.to_string(), "person entries require 'sn' attribute(s)");
    }

    #[test]
    fn test_posix_requires_numbers() {
        let mut template = entry_template(TemplateKind::PosixAccount, BASE);
        template.attributes.remove("uidNumber");
        template.attributes.remove("gidNumber");
        let err = validate_new_entry(&template.dn, &template.attributes, BASE).unwrap_err();
        assert_eq!(
            err.to_string(),
            "posixAccount entries require 'uidNumber', 'gidNumber' attribute(s)"
        );
    }
}
