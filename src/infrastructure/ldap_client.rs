//! LDAP-backed [`DirectoryService`]
//!
//! Each call opens its own connection, binds with the caller's identity, runs
//! one operation and unbinds. Dropping a session stops its connection driver,
//! so a cancelled request releases the socket as well.

use super::directory::{
    classify_result, kind_from_message, result_code, validate_endpoint, DirectoryService, Phase,
    RenameRequest,
};
use crate::domain::dn;
use crate::domain::{
    Attributes, ConnectionContext, DirectoryEntry, ModifyKind, PendingMutation, SearchRequest,
    SearchScope,
};
use crate::error::{AppError, AppResult, ErrorKind};
use async_trait::async_trait;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry, SearchOptions,
    SearchResult,
};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout of a single operation, bind included
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Directory client talking to a real LDAP server
#[derive(Debug, Clone)]
pub struct LdapDirectory {
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl Default for LdapDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_OPERATION_TIMEOUT)
    }
}

/// One bound connection; the driver task is aborted on drop.
struct Session {
    ldap: Ldap,
    driver: JoinHandle<()>,
}

impl Session {
    async fn open(
        ctx: &ConnectionContext,
        connect_timeout: Duration,
        operation_timeout: Duration,
    ) -> AppResult<Self> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(connect_timeout)
            .set_no_tls_verify(ctx.allow_insecure_transport);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, ctx.endpoint.trim())
            .await
            .map_err(|e| map_ldap_error(&e, Phase::Bind))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::debug!(error = %e, "LDAP connection driver stopped");
            }
        });

        let mut session = Session { ldap, driver };
        let bound = session
            .ldap
            .with_timeout(operation_timeout)
            .simple_bind(&ctx.bind_identity, &ctx.credential)
            .await
            .and_then(|r| r.success());

        if let Err(e) = bound {
            session.close().await;
            return Err(map_ldap_error(&e, Phase::Bind));
        }

        Ok(session)
    }

    async fn close(mut self) {
        if let Err(e) = self.ldap.unbind().await {
            tracing::debug!(error = %e, "Unbind failed");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl LdapDirectory {
    pub fn new(connect_timeout: Duration, operation_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            operation_timeout,
        }
    }

    /// Open a bound session, run `op` on it and close the session whatever
    /// the outcome.
    async fn with_session<T, F, Fut>(
        &self,
        ctx: &ConnectionContext,
        operation: &'static str,
        op: F,
    ) -> AppResult<T>
    where
        F: FnOnce(Ldap) -> Fut + Send,
        Fut: Future<Output = Result<T, LdapError>> + Send,
        T: Send,
    {
        validate_endpoint(&ctx.endpoint)?;

        tracing::debug!(
            endpoint = %ctx.endpoint,
            bind_dn = %ctx.bind_identity,
            operation,
            "Opening LDAP session"
        );

        let session = Session::open(ctx, self.connect_timeout, self.operation_timeout)
            .await
            .map_err(|e| {
                tracing::warn!(endpoint = %ctx.endpoint, operation, error = %e, "LDAP bind failed");
                e
            })?;

        let mut ldap = session.ldap.clone();
        ldap.with_timeout(self.operation_timeout);
        let result = op(ldap).await;
        session.close().await;

        result.map_err(|e| {
            let err = map_ldap_error(&e, Phase::Operation);
            tracing::warn!(
                endpoint = %ctx.endpoint,
                operation,
                error_kind = %err.kind(),
                error = %err,
                "LDAP operation failed"
            );
            err
        })
    }
}

/// Translate an ldap3 failure into the console's error kinds.
pub(crate) fn map_ldap_error(err: &LdapError, phase: Phase) -> AppError {
    let message = err.to_string();
    match err {
        LdapError::LdapResult { result } => classify_result(phase, result.rc, &message),
        LdapError::Io { .. } | LdapError::Timeout { .. } => AppError::TransportFailed(message),
        LdapError::UrlParsing { .. } | LdapError::UnknownScheme(..) => {
            AppError::Malformed(format!("Invalid LDAP URL: {}", message))
        }
        _ => {
            let kind = kind_from_message(&message).unwrap_or(ErrorKind::TransportFailed);
            AppError::from_kind(kind, message)
        }
    }
}

fn to_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Attribute list for an add; attributes without values are left out.
fn to_add_attributes(attributes: &Attributes) -> Vec<(String, HashSet<String>)> {
    attributes
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("dn"))
        .map(|(name, value)| (name.clone(), value.values().into_iter().collect::<HashSet<_>>()))
        .filter(|(_, values)| !values.is_empty())
        .collect()
}

fn to_mods(changes: &[PendingMutation]) -> Vec<Mod<String>> {
    changes
        .iter()
        .map(|change| {
            let values: HashSet<String> = change.values.iter().cloned().collect();
            match change.kind {
                ModifyKind::Add => Mod::Add(change.attribute.clone(), values),
                ModifyKind::Delete => Mod::Delete(change.attribute.clone(), values),
                ModifyKind::Replace => Mod::Replace(change.attribute.clone(), values),
            }
        })
        .collect()
}

fn requested_attributes(request: &SearchRequest) -> Vec<String> {
    match &request.attributes {
        Some(attrs) if !attrs.is_empty() => attrs.clone(),
        _ => vec!["*".to_string()],
    }
}

fn to_entry(entry: SearchEntry) -> DirectoryEntry {
    if !entry.bin_attrs.is_empty() {
        tracing::debug!(
            dn = %entry.dn,
            count = entry.bin_attrs.len(),
            "Skipping binary attributes"
        );
    }
    DirectoryEntry::from_multi(entry.dn, entry.attrs)
}

#[async_trait]
impl DirectoryService for LdapDirectory {
    async fn connect(&self, ctx: &ConnectionContext) -> AppResult<()> {
        self.with_session(ctx, "connect", |_ldap| async { Ok::<_, LdapError>(()) })
            .await?;
        tracing::info!(endpoint = %ctx.endpoint, bind_dn = %ctx.bind_identity, "LDAP bind verified");
        Ok(())
    }

    async fn search(
        &self,
        ctx: &ConnectionContext,
        request: &SearchRequest,
    ) -> AppResult<Vec<DirectoryEntry>> {
        let base = request.base_dn.clone();
        let filter = request.filter.clone();
        let scope = to_scope(request.scope);
        let attrs = requested_attributes(request);
        let size_limit = i32::try_from(request.size_limit).unwrap_or(i32::MAX);

        let (entries, truncated) = self
            .with_session(ctx, "search", move |mut ldap| async move {
                if size_limit > 0 {
                    ldap.with_search_options(SearchOptions::new().sizelimit(size_limit));
                }
                let SearchResult(entries, result) = ldap.search(&base, scope, &filter, attrs).await?;
                let truncated = result.rc == result_code::SIZE_LIMIT_EXCEEDED;
                if !truncated {
                    result.success()?;
                }
                Ok((entries, truncated))
            })
            .await?;

        if truncated {
            tracing::warn!(
                base_dn = %request.base_dn,
                size_limit = request.size_limit,
                "Search result truncated by size limit"
            );
        }

        tracing::debug!(base_dn = %request.base_dn, count = entries.len(), "Search complete");
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(to_entry)
            .collect())
    }

    async fn add(&self, ctx: &ConnectionContext, dn: &str, attributes: &Attributes) -> AppResult<()> {
        dn::validate_dn(dn)?;
        let target = dn.to_string();
        let attrs = to_add_attributes(attributes);
        self.with_session(ctx, "add", move |mut ldap| async move {
            ldap.add(&target, attrs).await?.success()?;
            Ok(())
        })
        .await?;
        tracing::info!(dn = %dn, "Entry added");
        Ok(())
    }

    async fn modify(
        &self,
        ctx: &ConnectionContext,
        dn: &str,
        changes: &[PendingMutation],
    ) -> AppResult<()> {
        dn::validate_dn(dn)?;
        if changes.is_empty() {
            return Err(AppError::Malformed("Modify requires at least one change".to_string()));
        }
        let target = dn.to_string();
        let mods = to_mods(changes);
        self.with_session(ctx, "modify", move |mut ldap| async move {
            ldap.modify(&target, mods).await?.success()?;
            Ok(())
        })
        .await?;
        tracing::info!(dn = %dn, changes = changes.len(), "Entry modified");
        Ok(())
    }

    async fn delete(&self, ctx: &ConnectionContext, dn: &str) -> AppResult<()> {
        dn::validate_dn(dn)?;
        let target = dn.to_string();
        self.with_session(ctx, "delete", move |mut ldap| async move {
            ldap.delete(&target).await?.success()?;
            Ok(())
        })
        .await?;
        tracing::info!(dn = %dn, "Entry deleted");
        Ok(())
    }

    async fn rename(
        &self,
        ctx: &ConnectionContext,
        dn: &str,
        request: &RenameRequest,
    ) -> AppResult<()> {
        dn::validate_dn(dn)?;
        dn::validate_dn(&request.new_rdn)?;
        let target = dn.to_string();
        let new_rdn = request.new_rdn.clone();
        let delete_old = request.delete_old_rdn;
        let new_superior = request.new_superior.clone().filter(|s| !s.trim().is_empty());
        self.with_session(ctx, "rename", move |mut ldap| async move {
            ldap.modifydn(&target, &new_rdn, delete_old, new_superior.as_deref())
                .await?
                .success()?;
            Ok(())
        })
        .await?;
        tracing::info!(dn = %dn, new_rdn = %request.new_rdn, "Entry renamed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttributeValue;
    use ldap3::LdapResult;

    fn ldap_result(rc: u32, text: &str) -> LdapError {
        LdapError::LdapResult {
            result: LdapResult {
                rc,
                matched: String::new(),
                text: text.to_string(),
                refs: vec![],
                ctrls: vec![],
            },
        }
    }

    #[test]
    fn test_map_result_codes() {
        assert_eq!(
            map_ldap_error(&ldap_result(32, ""), Phase::Operation).kind(),
            ErrorKind::NoSuchObject
        );
        assert_eq!(
            map_ldap_error(&ldap_result(68, ""), Phase::Operation).kind(),
            ErrorKind::EntryAlreadyExists
        );
        assert_eq!(
            map_ldap_error(&ldap_result(32, ""), Phase::Bind).kind(),
            ErrorKind::BindFailed
        );
        assert_eq!(
            map_ldap_error(&ldap_result(80, "Code: 0x21"), Phase::Operation).kind(),
            ErrorKind::InvalidAttributeSyntax
        );
    }

    #[test]
    fn test_map_io_is_transport() {
        let err = LdapError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(map_ldap_error(&err, Phase::Bind).kind(), ErrorKind::TransportFailed);
    }

    #[test]
    fn test_add_attributes_skip_empty() {
        let mut attrs = Attributes::new();
        attrs.insert("cn".to_string(), "Bob".into());
        attrs.insert("objectClass".to_string(), vec!["top", "person"].into());
        attrs.insert("description".to_string(), AttributeValue::Many(vec![]));
        attrs.insert("dn".to_string(), "cn=Bob,dc=example,dc=com".into());

        let converted = to_add_attributes(&attrs);
        assert_eq!(converted.len(), 2);
        let classes = converted
            .iter()
            .find(|(name, _)| name == "objectClass")
            .map(|(_, v)| v.len());
        assert_eq!(classes, Some(2));
    }

    #[test]
    fn test_mods_preserve_kind() {
        let changes = vec![
            PendingMutation::replace("mail", vec!["bob@example.com".to_string()]),
            PendingMutation {
                kind: ModifyKind::Delete,
                attribute: "description".to_string(),
                values: vec![],
            },
        ];
        let mods = to_mods(&changes);
        assert!(matches!(&mods[0], Mod::Replace(attr, values) if attr == "mail" && values.len() == 1));
        assert!(matches!(&mods[1], Mod::Delete(attr, values) if attr == "description" && values.is_empty()));
    }

    #[test]
    fn test_requested_attributes_default_to_all() {
        let request = SearchRequest::subtree("dc=example,dc=com");
        assert_eq!(requested_attributes(&request), vec!["*"]);
        let request = request.with_attributes(vec!["cn".to_string()]);
        assert_eq!(requested_attributes(&request), vec!["cn"]);
    }

    #[tokio::test]
    async fn test_invalid_endpoint_rejected_before_network() {
        let directory = LdapDirectory::default();
        let ctx = ConnectionContext::new("localhost:389", "cn=admin", "secret");
        let err = directory.connect(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }

    #[test]
    fn test_map_unknown_scheme_is_malformed() {
        let err = LdapError::UnknownScheme("ftp".to_string());
        assert_eq!(map_ldap_error(&err, Phase::Bind).kind(), ErrorKind::Malformed);
    }

    #[tokio::test]
    async fn test_unparseable_port_is_malformed() {
        let directory = LdapDirectory::default();
        let ctx = ConnectionContext::new("ldap://localhost:notaport", "cn=admin", "secret");
        let err = directory.connect(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert!(err.to_string().starts_with("Invalid LDAP URL"));
    }

    #[tokio::test]
    async fn test_empty_modify_rejected() {
        let directory = LdapDirectory::default();
        let ctx = ConnectionContext::new("ldap://localhost:389", "cn=admin", "secret");
        let err = directory
            .modify(&ctx, "cn=Bob,dc=example,dc=com", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
    }
}
