//! Ancestor ensurer
//!
//! Before an entry is added every ancestor DN must exist. The chain is walked
//! root first; missing ancestors get a minimal synthesized entry. There is no
//! transaction across the walk: an interrupted run leaves the ancestors it
//! already created in place, and the next run skips them.

use super::directory::DirectoryService;
use crate::domain::dn;
use crate::domain::{AttributeValue, Attributes, ConnectionContext, SearchRequest};
use crate::error::{AppError, AppResult, ErrorKind};
use serde::Serialize;

/// Outcome of an ancestor walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AncestorReport {
    /// Ancestors that were already present, root first
    pub existing: Vec<String>,
    /// Ancestors created by this walk, root first
    pub created: Vec<String>,
    pub warnings: Vec<String>,
}

impl AncestorReport {
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

/// Minimal attributes for an ancestor entry, chosen by its naming attribute.
pub fn ancestor_attributes(ancestor: &str) -> Attributes {
    let naming_attr = dn::naming_attribute(ancestor);
    let value = dn::naming_value(ancestor);

    let (classes, attr) = match naming_attr.as_str() {
        "dc" => (vec!["top", "dcObject"], "dc"),
        "ou" => (vec!["top", "organizationalUnit"], "ou"),
        "o" => (vec!["top", "organization"], "o"),
        _ => (vec!["top", "organizationalUnit"], "cn"),
    };

    let mut attributes = Attributes::new();
    attributes.insert("objectClass".to_string(), classes.into());
    attributes.insert(attr.to_string(), AttributeValue::One(value));
    attributes
}

/// A single-RDN `dc=` entry, which servers often refuse to create.
fn is_top_level_domain(ancestor: &str) -> bool {
    dn::depth(ancestor) == 1 && dn::naming_attribute(ancestor) == "dc"
}

/// Whether `target` exists, judged by a base-scope search.
///
/// Bind and transport failures are returned as errors; every other failed
/// lookup means the entry is missing.
pub async fn entry_exists<D>(dir: &D, ctx: &ConnectionContext, target: &str) -> AppResult<bool>
where
    D: DirectoryService + ?Sized,
{
    match dir.search(ctx, &SearchRequest::base(target)).await {
        Ok(hits) => Ok(hits.len() == 1),
        Err(e) if matches!(e.kind(), ErrorKind::BindFailed | ErrorKind::TransportFailed) => Err(e),
        Err(e) => {
            tracing::debug!(dn = %target, error_kind = %e.kind(), "Existence check failed, treating as missing");
            Ok(false)
        }
    }
}

/// Make sure every ancestor of `target` exists, creating the missing ones
/// root first.
pub async fn ensure_ancestors<D>(
    dir: &D,
    ctx: &ConnectionContext,
    target: &str,
) -> AppResult<AncestorReport>
where
    D: DirectoryService + ?Sized,
{
    dn::validate_dn(target)?;
    let mut report = AncestorReport::default();

    for ancestor in dn::ancestor_chain(target).into_iter().rev() {
        if entry_exists(dir, ctx, ancestor).await? {
            report.existing.push(ancestor.to_string());
            continue;
        }

        let attributes = ancestor_attributes(ancestor);
        match dir.add(ctx, ancestor, &attributes).await {
            Ok(()) => {
                tracing::info!(dn = %ancestor, "Created missing ancestor");
                report.created.push(ancestor.to_string());
            }
            Err(e) if e.kind() == ErrorKind::EntryAlreadyExists => {
                report.existing.push(ancestor.to_string());
            }
            Err(e) if is_top_level_domain(ancestor) => {
                tracing::warn!(dn = %ancestor, error = %e, "Top-level domain not created, continuing");
                report.add_warning(format!(
                    "Could not create top-level entry {}: {}",
                    ancestor, e
                ));
            }
            Err(e) => {
                tracing::error!(dn = %ancestor, target = %target, error = %e, "Ancestor creation failed");
                return Err(AppError::ParentCreationFailed {
                    dn: ancestor.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::{Call, InMemoryDirectory, Operation};

    const TARGET: &str = "cn=Bob,ou=People,dc=example,dc=com";

    fn ctx() -> ConnectionContext {
        ConnectionContext::new("ldap://memory", "cn=admin", "secret")
    }

    async fn added(dir: &InMemoryDirectory) -> Vec<String> {
        dir.calls_of(Operation::Add)
            .await
            .into_iter()
            .filter_map(|c| match c {
                Call::Add { dn } => Some(dn),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_synthesized_attributes() {
        let dc = ancestor_attributes("dc=example,dc=com");
        assert!(dc["objectClass"].contains("dcObject"));
        assert_eq!(dc["dc"], AttributeValue::One("example".to_string()));

        let org = ancestor_attributes("o=Acme\\, Inc,dc=com");
        assert!(org["objectClass"].contains("organization"));
        assert_eq!(org["o"], AttributeValue::One("Acme, Inc".to_string()));

        let fallback = ancestor_attributes("cn=Devices,dc=com");
        assert!(fallback["objectClass"].contains("organizationalUnit"));
        assert_eq!(fallback["cn"], AttributeValue::One("Devices".to_string()));
    }

    #[tokio::test]
    async fn test_parents_created_before_children() {
        let dir = InMemoryDirectory::new();
        let report = ensure_ancestors(&dir, &ctx(), TARGET).await.unwrap();

        assert_eq!(
            added(&dir).await,
            vec!["dc=com", "dc=example,dc=com", "ou=People,dc=example,dc=com"]
        );
        assert_eq!(report.created.len(), 3);
        assert!(report.existing.is_empty());

        let calls = dir.calls().await;
        let domain_add = calls
            .iter()
            .position(|c| *c == Call::Add { dn: "dc=example,dc=com".to_string() })
            .unwrap();
        let people_check = calls
            .iter()
            .position(|c| matches!(c, Call::Search { base_dn, .. } if base_dn == "ou=People,dc=example,dc=com"))
            .unwrap();
        assert!(domain_add < people_check);
        assert!(!dir.contains(TARGET).await);
    }

    #[tokio::test]
    async fn test_second_run_adds_nothing() {
        let dir = InMemoryDirectory::new();
        ensure_ancestors(&dir, &ctx(), TARGET).await.unwrap();
        dir.clear_calls().await;

        let report = ensure_ancestors(&dir, &ctx(), TARGET).await.unwrap();
        assert!(added(&dir).await.is_empty());
        assert_eq!(report.existing.len(), 3);
        assert!(report.created.is_empty());
    }

    #[tokio::test]
    async fn test_top_level_domain_failure_is_warning() {
        let dir = InMemoryDirectory::new().with_naming_context("dc=example,dc=com");
        dir.refuse_add("dc=com").await;

        let report = ensure_ancestors(&dir, &ctx(), TARGET).await.unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.created,
            vec!["dc=example,dc=com", "ou=People,dc=example,dc=com"]
        );
        assert!(dir.contains("ou=People,dc=example,dc=com").await);
    }

    #[tokio::test]
    async fn test_other_failure_is_fatal() {
        let dir = InMemoryDirectory::demo();
        dir.refuse_add("ou=Devices,ou=Lab,dc=example,dc=com").await;

        let err = ensure_ancestors(&dir, &ctx(), "cn=CT,ou=Devices,ou=Lab,dc=example,dc=com")
            .await
            .unwrap_err();
        match err {
            AppError::ParentCreationFailed { dn, .. } => {
                assert_eq!(dn, "ou=Devices,ou=Lab,dc=example,dc=com")
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(dir.contains("ou=Lab,dc=example,dc=com").await);
    }

    #[tokio::test]
    async fn test_transport_failure_on_check_propagates() {
        let dir = InMemoryDirectory::new();
        dir.fail_next(Operation::Search, AppError::TransportFailed("connection reset".to_string()))
            .await;
        let err = ensure_ancestors(&dir, &ctx(), TARGET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailed);
        assert!(added(&dir).await.is_empty());
    }

    #[tokio::test]
    async fn test_single_rdn_target_has_no_ancestors() {
        let dir = InMemoryDirectory::new();
        let report = ensure_ancestors(&dir, &ctx(), "dc=local").await.unwrap();
        assert_eq!(report, AncestorReport::default());
        assert!(dir.calls().await.is_empty());
    }
}
