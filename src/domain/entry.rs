use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Filter matching every entry
pub const MATCH_ALL_FILTER: &str = "(objectClass=*)";

/// A single attribute's value as exchanged with the browser: a lone string
/// for single-valued attributes, an ordered list otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    One(String),
    Many(Vec<String>),
}

impl AttributeValue {
    /// Collapse a value list the way search results are presented.
    pub fn from_values(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            AttributeValue::One(values.remove(0))
        } else {
            AttributeValue::Many(values)
        }
    }

    pub fn values(&self) -> Vec<String> {
        match self {
            AttributeValue::One(v) => vec![v.clone()],
            AttributeValue::Many(vs) => vs.clone(),
        }
    }

    pub fn first(&self) -> Option<&str> {
        match self {
            AttributeValue::One(v) => Some(v.as_str()),
            AttributeValue::Many(vs) => vs.first().map(String::as_str),
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        match self {
            AttributeValue::One(v) => v.eq_ignore_ascii_case(needle),
            AttributeValue::Many(vs) => vs.iter().any(|v| v.eq_ignore_ascii_case(needle)),
        }
    }

    /// Same values regardless of single/list representation.
    pub fn same_values(&self, other: &AttributeValue) -> bool {
        self.values() == other.values()
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::One(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::One(value)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(values: Vec<&str>) -> Self {
        AttributeValue::Many(values.into_iter().map(String::from).collect())
    }
}

/// Attribute name to value mapping, ordered by name.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Case-insensitive attribute lookup.
pub fn find_attribute<'a>(attributes: &'a Attributes, name: &str) -> Option<(&'a String, &'a AttributeValue)> {
    attributes
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
}

/// Snapshot of one directory entry returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dn: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl DirectoryEntry {
    /// Build an entry; a `dn` key inside `attributes` is dropped.
    pub fn new(dn: impl Into<String>, mut attributes: Attributes) -> Self {
        attributes.retain(|key, _| !key.eq_ignore_ascii_case("dn"));
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Build from the multi-valued map a directory client returns.
    pub fn from_multi(dn: impl Into<String>, attrs: HashMap<String, Vec<String>>) -> Self {
        let attributes = attrs
            .into_iter()
            .map(|(k, v)| (k, AttributeValue::from_values(v)))
            .collect();
        Self::new(dn, attributes)
    }

    pub fn get(&self, attr: &str) -> Option<&AttributeValue> {
        find_attribute(&self.attributes, attr).map(|(_, v)| v)
    }

    pub fn first(&self, attr: &str) -> Option<&str> {
        self.get(attr).and_then(AttributeValue::first)
    }

    pub fn has_object_class(&self, class: &str) -> bool {
        self.get("objectClass")
            .map(|v| v.contains(class))
            .unwrap_or(false)
    }
}

/// Per-operation connection parameters supplied by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub endpoint: String,
    pub bind_identity: String,
    pub credential: String,
    pub allow_insecure_transport: bool,
}

impl ConnectionContext {
    pub fn new(
        endpoint: impl Into<String>,
        bind_identity: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            bind_identity: bind_identity.into(),
            credential: credential.into(),
            allow_insecure_transport: false,
        }
    }

    pub fn insecure(mut self, allow: bool) -> Self {
        self.allow_insecure_transport = allow;
        self
    }
}

// Never print the credential.
impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("endpoint", &self.endpoint)
            .field("bind_identity", &self.bind_identity)
            .field("credential", &"***")
            .field("allow_insecure_transport", &self.allow_insecure_transport)
            .finish()
    }
}

/// Kind of a single attribute modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifyKind {
    Add,
    Delete,
    Replace,
}

/// One attribute change inside a modify request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMutation {
    #[serde(rename = "type")]
    pub kind: ModifyKind,
    pub attribute: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl PendingMutation {
    pub fn replace(attribute: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            kind: ModifyKind::Replace,
            attribute: attribute.into(),
            values,
        }
    }
}

/// Search scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchScope {
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "one", alias = "onelevel", alias = "single")]
    OneLevel,
    #[default]
    #[serde(rename = "sub", alias = "subtree")]
    Subtree,
}

/// Parameters of a single search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub filter: String,
    pub scope: SearchScope,
    /// `None` requests all user attributes
    pub attributes: Option<Vec<String>>,
    /// 0 = unlimited
    pub size_limit: u32,
}

impl SearchRequest {
    /// Subtree search for everything under `base_dn`.
    pub fn subtree(base_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            filter: MATCH_ALL_FILTER.to_string(),
            scope: SearchScope::Subtree,
            attributes: None,
            size_limit: 0,
        }
    }

    /// Base-scope lookup of exactly `dn`, used as an existence check.
    pub fn base(dn: impl Into<String>) -> Self {
        Self {
            scope: SearchScope::Base,
            ..Self::subtree(dn)
        }
    }

    /// Immediate children of `base_dn`.
    pub fn one_level(base_dn: impl Into<String>) -> Self {
        Self {
            scope: SearchScope::OneLevel,
            ..Self::subtree(base_dn)
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn with_size_limit(mut self, size_limit: u32) -> Self {
        self.size_limit = size_limit;
        self
    }
}
