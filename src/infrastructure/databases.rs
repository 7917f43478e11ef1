//! Base DN ("database") discovery and creation
//!
//! The list of known base DNs is owned by the browser; it is passed in and
//! the merged list is handed back.

use super::ancestors::{ancestor_attributes, entry_exists, ensure_ancestors, AncestorReport};
use super::directory::DirectoryService;
use crate::domain::dn;
use crate::domain::{ConnectionContext, SearchRequest};
use crate::error::{AppError, AppResult, ErrorKind};
use serde::Serialize;
use std::collections::BTreeSet;

pub const DEFAULT_DISCOVERY_ROOT: &str = "dc=dcm4che,dc=org";

/// Base DNs checked when the discovery search fails
pub const DEFAULT_FALLBACK_BASE_DNS: &[&str] = &[
    "dc=dcm4che,dc=org",
    "dc=example,dc=com",
    "dc=test,dc=com",
    "dc=local",
    "dc=internal",
    "dc=corp",
];

/// Where discovery looks for base DNs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub root: String,
    pub fallbacks: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            root: DEFAULT_DISCOVERY_ROOT.to_string(),
            fallbacks: DEFAULT_FALLBACK_BASE_DNS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Merged database list plus what this call found on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseList {
    pub databases: Vec<String>,
    pub discovered: Vec<String>,
}

/// Result of a database creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseCreation {
    pub dn: String,
    pub databases: Vec<String>,
    pub created_on_server: bool,
    pub ancestors: AncestorReport,
    pub warnings: Vec<String>,
}

/// Sorted union without duplicates or blanks.
fn merge(known: &[String], found: &[String]) -> Vec<String> {
    known
        .iter()
        .chain(found)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn looks_like_base(candidate: &str) -> bool {
    dn::rdn_components(candidate).iter().any(|rdn| {
        let attr = dn::split_rdn(rdn).0.to_ascii_lowercase();
        matches!(attr.as_str(), "dc" | "ou" | "o")
    })
}

/// Discover base DNs and merge them with `known`.
///
/// Lists the children of the discovery root; when that search fails, each
/// fallback DN is checked with a base search instead. Failed checks are
/// skipped.
pub async fn discover_databases<D>(
    dir: &D,
    ctx: &ConnectionContext,
    options: &DiscoveryOptions,
    known: &[String],
) -> AppResult<DatabaseList>
where
    D: DirectoryService + ?Sized,
{
    let request = SearchRequest::one_level(options.root.clone());
    let discovered: Vec<String> = match dir.search(ctx, &request).await {
        Ok(entries) => entries
            .into_iter()
            .map(|e| e.dn)
            .filter(|d| looks_like_base(d))
            .collect(),
        Err(e) if e.kind() == ErrorKind::BindFailed => return Err(e),
        Err(e) => {
            tracing::info!(root = %options.root, error = %e, "Discovery search failed, checking well-known base DNs");
            let mut found = Vec::new();
            for candidate in &options.fallbacks {
                match entry_exists(dir, ctx, candidate).await {
                    Ok(true) => found.push(candidate.clone()),
                    Ok(false) => {}
                    Err(e) => {
                        tracing::debug!(base_dn = %candidate, error = %e, "Fallback base DN check failed");
                    }
                }
            }
            found
        }
    };

    tracing::info!(count = discovered.len(), "Database discovery complete");
    Ok(DatabaseList {
        databases: merge(known, &discovered),
        discovered,
    })
}

/// Create a base DN on the server, ancestors first.
///
/// A DN that already exists is reported as created without touching its
/// ancestors. A server-side failure is not an error: the DN is still added to the
/// returned list with a warning so it can be created by hand.
pub async fn create_database<D>(
    dir: &D,
    ctx: &ConnectionContext,
    requested: &str,
    known: &[String],
) -> AppResult<DatabaseCreation>
where
    D: DirectoryService + ?Sized,
{
    let target = requested.trim();
    if target.is_empty() {
        return Err(AppError::Malformed("Database DN is required".to_string()));
    }
    dn::validate_dn(target)?;

    if entry_exists(dir, ctx, target).await? {
        tracing::info!(dn = %target, "Database already exists");
        return Ok(DatabaseCreation {
            dn: target.to_string(),
            databases: merge(known, &[target.to_string()]),
            created_on_server: true,
            ancestors: AncestorReport::default(),
            warnings: Vec::new(),
        });
    }

    let mut warnings = Vec::new();
    let mut ancestors = AncestorReport::default();

    let created_on_server = match ensure_ancestors(dir, ctx, target).await {
        Ok(report) => {
            warnings.extend(report.warnings.iter().cloned());
            ancestors = report;
            match dir.add(ctx, target, &ancestor_attributes(target)).await {
                Ok(()) => true,
                Err(e) if e.kind() == ErrorKind::EntryAlreadyExists => true,
                Err(e) => {
                    warnings.push(format!("Could not create {} on the server: {}", target, e));
                    false
                }
            }
        }
        Err(e) if e.kind() == ErrorKind::BindFailed => return Err(e),
        Err(e) => {
            warnings.push(format!("Could not prepare parents of {}: {}", target, e));
            false
        }
    };

    if created_on_server {
        tracing::info!(dn = %target, "Database created");
    } else {
        tracing::warn!(dn = %target, "Database kept locally without server entry");
    }

    Ok(DatabaseCreation {
        dn: target.to_string(),
        databases: merge(known, &[target.to_string()]),
        created_on_server,
        ancestors,
        warnings,
    })
}

/// Drop a base DN from the known list.
pub fn remove_database(known: &[String], target: &str) -> Vec<String> {
    let target = target.trim();
    let remaining: Vec<String> = known
        .iter()
        .filter(|d| !d.trim().eq_ignore_ascii_case(target))
        .cloned()
        .collect();
    merge(&remaining, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::{InMemoryDirectory, Operation};

    fn ctx() -> ConnectionContext {
        ConnectionContext::new("ldap://memory", "cn=admin", "secret")
    }

    #[tokio::test]
    async fn test_discovery_lists_root_children() {
        let dir = InMemoryDirectory::demo();
        let known = vec!["dc=example,dc=com".to_string()];
        let list = discover_databases(&dir, &ctx(), &DiscoveryOptions::default(), &known)
            .await
            .unwrap();
        assert_eq!(list.discovered, vec!["cn=DICOM Configuration,dc=dcm4che,dc=org"]);
        assert_eq!(
            list.databases,
            vec!["cn=DICOM Configuration,dc=dcm4che,dc=org", "dc=example,dc=com"]
        );
    }

    #[tokio::test]
    async fn test_discovery_falls_back_to_well_known_dns() {
        let dir = InMemoryDirectory::demo();
        let options = DiscoveryOptions {
            root: "dc=missing,dc=org".to_string(),
            ..DiscoveryOptions::default()
        };
        let list = discover_databases(&dir, &ctx(), &options, &[]).await.unwrap();
        assert_eq!(list.discovered, vec!["dc=dcm4che,dc=org", "dc=example,dc=com"]);
        assert_eq!(dir.calls_of(Operation::Search).await.len(), 1 + DEFAULT_FALLBACK_BASE_DNS.len());
    }

    #[tokio::test]
    async fn test_create_database_builds_ancestors() {
        let dir = InMemoryDirectory::new();
        let created = create_database(&dir, &ctx(), "  ou=Archive,dc=local ", &[])
            .await
            .unwrap();
        assert!(created.created_on_server);
        assert_eq!(created.dn, "ou=Archive,dc=local");
        assert_eq!(created.ancestors.created, vec!["dc=local"]);
        assert!(dir.contains("ou=Archive,dc=local").await);
        assert_eq!(created.databases, vec!["ou=Archive,dc=local"]);
    }

    #[tokio::test]
    async fn test_existing_database_counts_as_created() {
        let dir = InMemoryDirectory::demo();
        let created = create_database(&dir, &ctx(), "dc=example,dc=com", &[])
            .await
            .unwrap();
        assert!(created.created_on_server);
        assert!(created.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_existing_database_skips_parent_walk() {
        let dir = InMemoryDirectory::demo();
        dir.refuse_add("dc=com").await;
        let created = create_database(&dir, &ctx(), "dc=example,dc=com", &[])
            .await
            .unwrap();
        assert!(created.created_on_server);
        assert!(created.warnings.is_empty());
        assert!(created.ancestors.created.is_empty());
        assert_eq!(dir.calls_of(Operation::Search).await.len(), 1);
        assert!(dir.calls_of(Operation::Add).await.is_empty());
        assert_eq!(created.databases, vec!["dc=example,dc=com"]);
    }

    #[tokio::test]
    async fn test_refused_database_kept_with_warning() {
        let dir = InMemoryDirectory::new();
        dir.refuse_add("dc=corp").await;
        let created = create_database(&dir, &ctx(), "dc=corp", &["dc=local".to_string()])
            .await
            .unwrap();
        assert!(!created.created_on_server);
        assert_eq!(created.warnings.len(), 1);
        assert_eq!(created.databases, vec!["dc=corp", "dc=local"]);
    }

    #[tokio::test]
    async fn test_blank_database_is_malformed() {
        let dir = InMemoryDirectory::new();
        let err = create_database(&dir, &ctx(), "   ", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn test_remove_database() {
        let known = vec!["dc=local".to_string(), "dc=corp".to_string()];
        assert_eq!(remove_database(&known, "DC=corp"), vec!["dc=local"]);
    }
}
