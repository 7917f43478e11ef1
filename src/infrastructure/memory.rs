//! In-memory directory for offline mode and tests
//!
//! Enforces the server rules the console depends on (parents before
//! children, unique DNs, leaf-only deletes) and records every call so tests
//! can assert on ordering and call counts.

use super::directory::{validate_endpoint, DirectoryService, RenameRequest};
use super::filter::Filter;
use crate::domain::dn;
use crate::domain::{
    find_attribute, AttributeValue, Attributes, ConnectionContext, DirectoryEntry, ModifyKind,
    PendingMutation, SearchRequest, SearchScope,
};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Operational attributes maintained by the in-memory directory
const CREATE_TIMESTAMP: &str = "createTimestamp";
const MODIFY_TIMESTAMP: &str = "modifyTimestamp";

/// Directory operation kinds, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    Search,
    Add,
    Modify,
    Delete,
    Rename,
}

/// One recorded call against the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect { bind_dn: String },
    Search { base_dn: String, scope: SearchScope },
    Add { dn: String },
    Modify { dn: String, changes: Vec<PendingMutation> },
    Delete { dn: String },
    Rename { dn: String, new_rdn: String },
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::Connect { .. } => Operation::Connect,
            Call::Search { .. } => Operation::Search,
            Call::Add { .. } => Operation::Add,
            Call::Modify { .. } => Operation::Modify,
            Call::Delete { .. } => Operation::Delete,
            Call::Rename { .. } => Operation::Rename,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    dn: String,
    attributes: Attributes,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

impl StoredEntry {
    fn new(dn: String, attributes: Attributes) -> Self {
        let now = Utc::now();
        Self {
            dn,
            attributes,
            created: now,
            modified: now,
        }
    }

    /// Snapshot projected onto the requested attribute list.
    fn project(&self, requested: Option<&[String]>) -> DirectoryEntry {
        let requested = requested.filter(|r| !r.is_empty());
        let all_user = requested.map_or(true, |r| r.iter().any(|a| a == "*"));
        let all_operational = requested.map_or(false, |r| r.iter().any(|a| a == "+"));
        let wants = |name: &str| {
            requested.map_or(false, |r| r.iter().any(|a| a.eq_ignore_ascii_case(name)))
        };

        let mut attributes: Attributes = self
            .attributes
            .iter()
            .filter(|(name, _)| all_user || wants(name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        for (name, at) in [(CREATE_TIMESTAMP, self.created), (MODIFY_TIMESTAMP, self.modified)] {
            if all_operational || wants(name) {
                attributes.insert(name.to_string(), generalized_time(at).into());
            }
        }

        DirectoryEntry::new(self.dn.clone(), attributes)
    }
}

fn generalized_time(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%SZ").to_string()
}

/// Case-insensitive lookup key for a DN.
fn dn_key(value: &str) -> String {
    if value.trim().is_empty() {
        return String::new();
    }
    dn::rdn_components(value)
        .iter()
        .map(|rdn| {
            let (attribute, raw) = dn::split_rdn(rdn);
            format!(
                "{}={}",
                attribute.to_ascii_lowercase(),
                dn::escape_value(&dn::unescape_value(raw)).to_lowercase()
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parent_key(key: &str) -> Option<String> {
    dn::parent_of(key).filter(|p| !p.is_empty()).map(String::from)
}

fn is_descendant_key(key: &str, ancestor: &str) -> bool {
    key != ancestor && dn::is_within(key, ancestor)
}

/// Insert `value` into `attribute`, keeping existing values.
fn add_value(attributes: &mut Attributes, attribute: &str, value: &str) {
    let key = find_attribute(attributes, attribute)
        .map(|(k, _)| k.clone())
        .unwrap_or_else(|| attribute.to_string());
    let mut values = attributes.get(&key).map(AttributeValue::values).unwrap_or_default();
    if !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        values.push(value.to_string());
    }
    attributes.insert(key, AttributeValue::from_values(values));
}

/// Remove `value` from `attribute`, dropping the attribute once empty.
fn remove_value(attributes: &mut Attributes, attribute: &str, value: &str) {
    let Some(key) = find_attribute(attributes, attribute).map(|(k, _)| k.clone()) else {
        return;
    };
    let values: Vec<String> = attributes
        .get(&key)
        .map(AttributeValue::values)
        .unwrap_or_default()
        .into_iter()
        .filter(|v| !v.eq_ignore_ascii_case(value))
        .collect();
    if values.is_empty() {
        attributes.remove(&key);
    } else {
        attributes.insert(key, AttributeValue::from_values(values));
    }
}

fn apply_change(attributes: &mut Attributes, change: &PendingMutation) -> AppResult<()> {
    let existing = find_attribute(attributes, &change.attribute).map(|(k, v)| (k.clone(), v.values()));

    match change.kind {
        ModifyKind::Add => {
            if change.values.is_empty() {
                return Err(AppError::InvalidAttributeSyntax(format!(
                    "{}: no values to add",
                    change.attribute
                )));
            }
            let mut values = existing.as_ref().map(|(_, v)| v.clone()).unwrap_or_default();
            for value in &change.values {
                if values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
                    return Err(AppError::EntryAlreadyExists(format!(
                        "Attribute or value exists: {}={}",
                        change.attribute, value
                    )));
                }
                values.push(value.clone());
            }
            let key = existing.map(|(k, _)| k).unwrap_or_else(|| change.attribute.clone());
            attributes.insert(key, AttributeValue::from_values(values));
        }
        ModifyKind::Delete => {
            let Some((key, values)) = existing else {
                return Err(AppError::NoSuchAttribute(change.attribute.clone()));
            };
            if change.values.is_empty() {
                attributes.remove(&key);
                return Ok(());
            }
            for value in &change.values {
                if !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
                    return Err(AppError::NoSuchAttribute(format!(
                        "{}: value {} not present",
                        change.attribute, value
                    )));
                }
                remove_value(attributes, &key, value);
            }
        }
        ModifyKind::Replace => {
            if let Some((key, _)) = &existing {
                attributes.remove(key);
            }
            if !change.values.is_empty() {
                let key = existing.map(|(k, _)| k).unwrap_or_else(|| change.attribute.clone());
                attributes.insert(key, AttributeValue::from_values(change.values.clone()));
            }
        }
    }
    Ok(())
}

/// In-memory [`DirectoryService`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    entries: Arc<RwLock<BTreeMap<String, StoredEntry>>>,
    calls: Arc<RwLock<Vec<Call>>>,
    refused: Arc<RwLock<HashSet<String>>>,
    failures: Arc<RwLock<HashMap<Operation, AppError>>>,
    credentials: Option<(String, String)>,
    naming_contexts: HashSet<String>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-populated with `entries`; parents are not checked.
    pub fn with_entries(entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        let map = entries
            .into_iter()
            .map(|entry| (dn_key(&entry.dn), StoredEntry::new(entry.dn, entry.attributes)))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(map)),
            ..Self::default()
        }
    }

    /// Only accept binds with exactly this identity and credential.
    pub fn with_credentials(mut self, bind_identity: &str, credential: &str) -> Self {
        self.credentials = Some((bind_identity.to_string(), credential.to_string()));
        self
    }

    /// Allow `dn` to be added without its parent, like a server suffix.
    pub fn with_naming_context(mut self, dn: &str) -> Self {
        self.naming_contexts.insert(dn_key(dn));
        self
    }

    /// Refuse every future add of `dn` with `InsufficientAccess`.
    pub async fn refuse_add(&self, dn: &str) {
        self.refused.write().await.insert(dn_key(dn));
    }

    /// Fail the next call of `operation` with `error`.
    pub async fn fail_next(&self, operation: Operation, error: AppError) {
        self.failures.write().await.insert(operation, error);
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<Call> {
        self.calls.read().await.clone()
    }

    pub async fn calls_of(&self, operation: Operation) -> Vec<Call> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation() == operation)
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    /// Current state of `dn` with every user attribute.
    pub async fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        self.entries
            .read()
            .await
            .get(&dn_key(dn))
            .map(|stored| stored.project(None))
    }

    pub async fn contains(&self, dn: &str) -> bool {
        self.entries.read().await.contains_key(&dn_key(dn))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Validate the endpoint, record the call, check the bind and consume any
    /// injected failure.
    async fn begin(&self, ctx: &ConnectionContext, call: Call) -> AppResult<()> {
        validate_endpoint(&ctx.endpoint)?;
        let operation = call.operation();
        self.calls.write().await.push(call);

        if let Some((identity, credential)) = &self.credentials {
            if !identity.eq_ignore_ascii_case(ctx.bind_identity.trim()) || *credential != ctx.credential {
                tracing::debug!(bind_dn = %ctx.bind_identity, "In-memory bind rejected");
                return Err(AppError::BindFailed("Invalid credentials".to_string()));
            }
        }

        match self.failures.write().await.remove(&operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DirectoryService for InMemoryDirectory {
    async fn connect(&self, ctx: &ConnectionContext) -> AppResult<()> {
        self.begin(
            ctx,
            Call::Connect {
                bind_dn: ctx.bind_identity.clone(),
            },
        )
        .await
    }

    async fn search(
        &self,
        ctx: &ConnectionContext,
        request: &SearchRequest,
    ) -> AppResult<Vec<DirectoryEntry>> {
        self.begin(
            ctx,
            Call::Search {
                base_dn: request.base_dn.clone(),
                scope: request.scope,
            },
        )
        .await?;

        let filter = Filter::parse(&request.filter)?;
        let base = dn_key(&request.base_dn);
        let entries = self.entries.read().await;

        if !base.is_empty() && !entries.contains_key(&base) {
            return Err(AppError::NoSuchObject(request.base_dn.clone()));
        }

        let mut hits: Vec<&StoredEntry> = entries
            .iter()
            .filter(|(key, _)| match request.scope {
                SearchScope::Base => **key == base,
                SearchScope::OneLevel => parent_key(key).unwrap_or_default() == base,
                SearchScope::Subtree => base.is_empty() || **key == base || is_descendant_key(key, &base),
            })
            .map(|(_, stored)| stored)
            .filter(|stored| filter.matches(&stored.attributes))
            .collect();
        hits.sort_by(|a, b| dn::depth(&a.dn).cmp(&dn::depth(&b.dn)).then_with(|| a.dn.cmp(&b.dn)));

        if request.size_limit > 0 {
            hits.truncate(request.size_limit as usize);
        }

        Ok(hits
            .into_iter()
            .map(|stored| stored.project(request.attributes.as_deref()))
            .collect())
    }

    async fn add(&self, ctx: &ConnectionContext, dn: &str, attributes: &Attributes) -> AppResult<()> {
        self.begin(ctx, Call::Add { dn: dn.to_string() }).await?;
        dn::validate_dn(dn)?;

        let key = dn_key(dn);
        if self.refused.read().await.contains(&key) {
            return Err(AppError::InsufficientAccess(format!(
                "Insufficient access rights to add {}",
                dn
            )));
        }

        let mut entries = self.entries.write().await;
        if entries.contains_key(&key) {
            return Err(AppError::EntryAlreadyExists(dn.to_string()));
        }
        if let Some(parent) = parent_key(&key) {
            if !entries.contains_key(&parent) && !self.naming_contexts.contains(&key) {
                let parent_dn = dn::parent_of(dn).unwrap_or_default();
                return Err(AppError::NoSuchObject(format!(
                    "Parent entry {} does not exist",
                    parent_dn
                )));
            }
        }

        let mut stored: Attributes = attributes
            .iter()
            .filter(|(name, value)| !name.eq_ignore_ascii_case("dn") && !value.values().is_empty())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if find_attribute(&stored, "objectClass").is_none() {
            return Err(AppError::Directory(format!(
                "Object class violation: {} has no objectClass",
                dn
            )));
        }
        let (naming_attr, naming_raw) = dn::split_rdn(dn::first_rdn(dn));
        add_value(&mut stored, naming_attr, &dn::unescape_value(naming_raw));

        entries.insert(key, StoredEntry::new(dn.trim().to_string(), stored));
        tracing::debug!(dn = %dn, "In-memory entry added");
        Ok(())
    }

    async fn modify(
        &self,
        ctx: &ConnectionContext,
        dn: &str,
        changes: &[PendingMutation],
    ) -> AppResult<()> {
        self.begin(
            ctx,
            Call::Modify {
                dn: dn.to_string(),
                changes: changes.to_vec(),
            },
        )
        .await?;
        if changes.is_empty() {
            return Err(AppError::Malformed("Modify requires at least one change".to_string()));
        }

        let mut entries = self.entries.write().await;
        let stored = entries
            .get_mut(&dn_key(dn))
            .ok_or_else(|| AppError::NoSuchObject(dn.to_string()))?;

        let mut updated = stored.attributes.clone();
        for change in changes {
            apply_change(&mut updated, change)?;
        }

        let (naming_attr, naming_raw) = dn::split_rdn(dn::first_rdn(&stored.dn));
        let naming_value = dn::unescape_value(naming_raw);
        let keeps_rdn = find_attribute(&updated, naming_attr)
            .map(|(_, v)| v.contains(&naming_value))
            .unwrap_or(false);
        if !keeps_rdn {
            return Err(AppError::Directory(format!(
                "Not allowed on RDN: {} must keep {}={}",
                dn, naming_attr, naming_value
            )));
        }

        stored.attributes = updated;
        stored.modified = Utc::now();
        Ok(())
    }

    async fn delete(&self, ctx: &ConnectionContext, dn: &str) -> AppResult<()> {
        self.begin(ctx, Call::Delete { dn: dn.to_string() }).await?;

        let key = dn_key(dn);
        let mut entries = self.entries.write().await;
        if !entries.contains_key(&key) {
            return Err(AppError::NoSuchObject(dn.to_string()));
        }
        if entries.keys().any(|k| parent_key(k).as_deref() == Some(key.as_str())) {
            return Err(AppError::Directory(format!(
                "Operation not allowed on non-leaf: {}",
                dn
            )));
        }
        entries.remove(&key);
        Ok(())
    }

    async fn rename(
        &self,
        ctx: &ConnectionContext,
        dn: &str,
        request: &RenameRequest,
    ) -> AppResult<()> {
        self.begin(
            ctx,
            Call::Rename {
                dn: dn.to_string(),
                new_rdn: request.new_rdn.clone(),
            },
        )
        .await?;
        dn::validate_dn(&request.new_rdn)?;

        let old_key = dn_key(dn);
        let mut entries = self.entries.write().await;
        let stored = entries
            .get(&old_key)
            .cloned()
            .ok_or_else(|| AppError::NoSuchObject(dn.to_string()))?;

        let parent = match request.new_superior.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(superior) => {
                if !entries.contains_key(&dn_key(superior)) {
                    return Err(AppError::NoSuchObject(superior.to_string()));
                }
                Some(superior.to_string())
            }
            None => dn::parent_of(&stored.dn).filter(|p| !p.is_empty()).map(String::from),
        };
        let new_dn = match parent {
            Some(parent) => format!("{},{}", request.new_rdn.trim(), parent),
            None => request.new_rdn.trim().to_string(),
        };
        let new_key = dn_key(&new_dn);
        if new_key != old_key && entries.contains_key(&new_key) {
            return Err(AppError::EntryAlreadyExists(new_dn));
        }

        let mut attributes = stored.attributes.clone();
        let (old_attr, old_raw) = dn::split_rdn(dn::first_rdn(&stored.dn));
        let (new_attr, new_raw) = dn::split_rdn(&request.new_rdn);
        if request.delete_old_rdn {
            remove_value(&mut attributes, old_attr, &dn::unescape_value(old_raw));
        }
        add_value(&mut attributes, new_attr, &dn::unescape_value(new_raw));

        let descendants: Vec<String> = entries
            .keys()
            .filter(|k| is_descendant_key(k, &old_key))
            .cloned()
            .collect();
        let old_depth = dn::depth(&stored.dn);
        for key in descendants {
            if let Some(mut child) = entries.remove(&key) {
                let components = dn::rdn_components(&child.dn);
                let leading = components[..components.len().saturating_sub(old_depth)].join(",");
                child.dn = format!("{},{}", leading, new_dn);
                entries.insert(dn_key(&child.dn), child);
            }
        }

        entries.remove(&old_key);
        entries.insert(
            new_key,
            StoredEntry {
                dn: new_dn,
                attributes,
                created: stored.created,
                modified: Utc::now(),
            },
        );
        Ok(())
    }
}

fn demo_entry(dn: &str, pairs: Vec<(&str, AttributeValue)>) -> DirectoryEntry {
    let attributes = pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
    DirectoryEntry::new(dn, attributes)
}

/// Sample data served in offline mode: a small people directory plus a
/// DICOM archive configuration.
pub fn demo_entries() -> Vec<DirectoryEntry> {
    const DEVICE: &str =
        "dicomDeviceName=dcm4chee-arc,cn=Devices,cn=DICOM Configuration,dc=dcm4che,dc=org";
    vec![
        demo_entry(
            "dc=example,dc=com",
            vec![
                ("objectClass", vec!["top", "dcObject", "organization"].into()),
                ("dc", "example".into()),
                ("o", "Example Inc.".into()),
            ],
        ),
        demo_entry(
            "ou=People,dc=example,dc=com",
            vec![
                ("objectClass", vec!["top", "organizationalUnit"].into()),
                ("ou", "People".into()),
            ],
        ),
        demo_entry(
            "cn=Bob,ou=People,dc=example,dc=com",
            vec![
                (
                    "objectClass",
                    vec!["top", "person", "organizationalPerson", "inetOrgPerson"].into(),
                ),
                ("cn", "Bob".into()),
                ("sn", "Builder".into()),
                ("mail", "bob@example.com".into()),
            ],
        ),
        demo_entry(
            "ou=Groups,dc=example,dc=com",
            vec![
                ("objectClass", vec!["top", "organizationalUnit"].into()),
                ("ou", "Groups".into()),
            ],
        ),
        demo_entry(
            "dc=dcm4che,dc=org",
            vec![
                ("objectClass", vec!["top", "dcObject", "organization"].into()),
                ("dc", "dcm4che".into()),
                ("o", "dcm4che.org".into()),
            ],
        ),
        demo_entry(
            "cn=DICOM Configuration,dc=dcm4che,dc=org",
            vec![
                ("objectClass", vec!["top", "dicomConfigurationRoot"].into()),
                ("cn", "DICOM Configuration".into()),
            ],
        ),
        demo_entry(
            "cn=Devices,cn=DICOM Configuration,dc=dcm4che,dc=org",
            vec![
                ("objectClass", vec!["top", "dicomDevicesRoot"].into()),
                ("cn", "Devices".into()),
            ],
        ),
        demo_entry(
            DEVICE,
            vec![
                ("objectClass", vec!["top", "dicomDevice"].into()),
                ("dicomDeviceName", "dcm4chee-arc".into()),
                ("dicomInstalled", "TRUE".into()),
            ],
        ),
        demo_entry(
            &format!("cn=dicom,{}", DEVICE),
            vec![
                ("objectClass", vec!["top", "dicomNetworkConnection"].into()),
                ("cn", "dicom".into()),
                ("dicomHostname", "localhost".into()),
                ("dicomPort", "11112".into()),
            ],
        ),
        demo_entry(
            &format!("dicomAETitle=DCM4CHEE,{}", DEVICE),
            vec![
                ("objectClass", vec!["top", "dicomNetworkAE"].into()),
                ("dicomAETitle", "DCM4CHEE".into()),
                ("dicomDescription", "Archive AE".into()),
                ("dicomAssociationAcceptor", "TRUE".into()),
                (
                    "dicomNetworkConnectionReference",
                    format!("cn=dicom,{}", DEVICE).into(),
                ),
            ],
        ),
    ]
}

impl InMemoryDirectory {
    /// Offline demo directory accepting any credentials.
    pub fn demo() -> Self {
        Self::with_entries(demo_entries())
            .with_naming_context("dc=example,dc=com")
            .with_naming_context("dc=dcm4che,dc=org")
    }
}
