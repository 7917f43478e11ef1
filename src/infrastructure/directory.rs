//! Directory client contract and upstream error mapping
//!
//! Every operation binds with the caller's identity, performs exactly one
//! directory operation and releases the connection on every exit path. The
//! mapping from upstream result codes and messages to [`ErrorKind`] lives
//! here and nowhere else.

use crate::domain::{Attributes, ConnectionContext, DirectoryEntry, PendingMutation, SearchRequest};
use crate::error::{AppError, AppResult, ErrorKind};
use async_trait::async_trait;
use serde::Deserialize;

/// Parameters of a modify-DN operation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub new_rdn: String,
    #[serde(default = "default_delete_old_rdn")]
    pub delete_old_rdn: bool,
    /// Best effort - not every server supports moving entries
    #[serde(default)]
    pub new_superior: Option<String>,
}

fn default_delete_old_rdn() -> bool {
    true
}

impl RenameRequest {
    pub fn new(new_rdn: impl Into<String>) -> Self {
        Self {
            new_rdn: new_rdn.into(),
            delete_old_rdn: true,
            new_superior: None,
        }
    }
}

/// One call per directory operation; implementations open and close their
/// own connection for each call.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Bind and unbind, verifying endpoint and credentials.
    async fn connect(&self, ctx: &ConnectionContext) -> AppResult<()>;

    async fn search(&self, ctx: &ConnectionContext, request: &SearchRequest) -> AppResult<Vec<DirectoryEntry>>;

    async fn add(&self, ctx: &ConnectionContext, dn: &str, attributes: &Attributes) -> AppResult<()>;

    async fn modify(&self, ctx: &ConnectionContext, dn: &str, changes: &[PendingMutation]) -> AppResult<()>;

    async fn delete(&self, ctx: &ConnectionContext, dn: &str) -> AppResult<()>;

    async fn rename(&self, ctx: &ConnectionContext, dn: &str, request: &RenameRequest) -> AppResult<()>;
}

/// LDAP result codes the console distinguishes (RFC 4511 §4.1.9)
pub mod result_code {
    pub const SUCCESS: u32 = 0;
    pub const SIZE_LIMIT_EXCEEDED: u32 = 4;
    pub const NO_SUCH_ATTRIBUTE: u32 = 16;
    pub const INVALID_ATTRIBUTE_SYNTAX: u32 = 21;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_DN_SYNTAX: u32 = 34;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
    pub const UNWILLING_TO_PERFORM: u32 = 53;
    pub const NOT_ALLOWED_ON_NON_LEAF: u32 = 66;
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
}

/// Kind for a numeric result code, if it is one the console distinguishes.
pub fn kind_from_result_code(rc: u32) -> Option<ErrorKind> {
    match rc {
        result_code::NO_SUCH_ATTRIBUTE => Some(ErrorKind::NoSuchAttribute),
        result_code::INVALID_ATTRIBUTE_SYNTAX => Some(ErrorKind::InvalidAttributeSyntax),
        result_code::NO_SUCH_OBJECT => Some(ErrorKind::NoSuchObject),
        result_code::INVALID_DN_SYNTAX => Some(ErrorKind::Malformed),
        result_code::INVALID_CREDENTIALS => Some(ErrorKind::BindFailed),
        result_code::INSUFFICIENT_ACCESS_RIGHTS => Some(ErrorKind::InsufficientAccess),
        result_code::ENTRY_ALREADY_EXISTS => Some(ErrorKind::EntryAlreadyExists),
        _ => None,
    }
}

/// Message markers checked in order; the first match wins.
const MESSAGE_MARKERS: &[(&[&str], ErrorKind)] = &[
    (
        &["0x35", "no global superior knowledge", "no such object"],
        ErrorKind::NoSuchObject,
    ),
    (
        &["0x20", "attribute or value exists", "already exists"],
        ErrorKind::EntryAlreadyExists,
    ),
    (&["0x32", "no such attribute"], ErrorKind::NoSuchAttribute),
    (&["0x21", "invalid attribute syntax"], ErrorKind::InvalidAttributeSyntax),
    (&["0x50", "insufficient access"], ErrorKind::InsufficientAccess),
];

/// Kind for an upstream failure that only surfaces as text.
pub fn kind_from_message(message: &str) -> Option<ErrorKind> {
    let lowered = message.to_ascii_lowercase();
    MESSAGE_MARKERS
        .iter()
        .find(|(markers, _)| markers.iter().any(|m| lowered.contains(m)))
        .map(|(_, kind)| *kind)
}

/// URL schemes accepted as endpoints
const ENDPOINT_SCHEMES: &[&str] = &["ldap://", "ldaps://", "ldapi://"];

/// Reject endpoints that are not LDAP URLs before any network call.
pub fn validate_endpoint(endpoint: &str) -> AppResult<()> {
    let lowered = endpoint.trim().to_ascii_lowercase();
    match ENDPOINT_SCHEMES.iter().find(|s| lowered.starts_with(*s)) {
        Some(scheme) if lowered.len() > scheme.len() => Ok(()),
        _ => Err(AppError::Malformed(format!(
            "Invalid LDAP URL \"{}\": expected ldap://, ldaps:// or ldapi://",
            endpoint
        ))),
    }
}

/// Phase of a session an upstream failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bind,
    Operation,
}

/// Classify a directory result failure.
///
/// During bind every result failure is `BindFailed`; afterwards the numeric
/// code decides, then the message, and anything left is `Other`.
pub fn classify_result(phase: Phase, rc: u32, message: &str) -> AppError {
    let kind = match phase {
        Phase::Bind => ErrorKind::BindFailed,
        Phase::Operation => kind_from_result_code(rc)
            .or_else(|| kind_from_message(message))
            .unwrap_or(ErrorKind::Other),
    };
    AppError::from_kind(kind, message)
}

/// Classify a failure that carries no result code.
pub fn classify_message(message: &str) -> AppError {
    AppError::from_kind(kind_from_message(message).unwrap_or(ErrorKind::Other), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_markers() {
        assert_eq!(
            kind_from_message("Code: 0x35 unwilling"),
            Some(ErrorKind::NoSuchObject)
        );
        assert_eq!(
            kind_from_message("Insufficient Access Rights 0x50"),
            Some(ErrorKind::InsufficientAccess)
        );
        assert_eq!(
            kind_from_message("no global superior knowledge"),
            Some(ErrorKind::NoSuchObject)
        );
        assert_eq!(kind_from_message("Code: 0x32"), Some(ErrorKind::NoSuchAttribute));
        assert_eq!(kind_from_message("Code: 0x21"), Some(ErrorKind::InvalidAttributeSyntax));
        assert_eq!(kind_from_message("Code: 0x20"), Some(ErrorKind::EntryAlreadyExists));
        assert_eq!(kind_from_message("socket hang up"), None);
    }

    #[test]
    fn test_result_codes() {
        assert_eq!(kind_from_result_code(32), Some(ErrorKind::NoSuchObject));
        assert_eq!(kind_from_result_code(68), Some(ErrorKind::EntryAlreadyExists));
        assert_eq!(kind_from_result_code(50), Some(ErrorKind::InsufficientAccess));
        assert_eq!(kind_from_result_code(1), None);
    }

    #[test]
    fn test_classify_result_phases() {
        assert_eq!(
            classify_result(Phase::Bind, 32, "no such object").kind(),
            ErrorKind::BindFailed
        );
        assert_eq!(
            classify_result(Phase::Operation, 32, "").kind(),
            ErrorKind::NoSuchObject
        );
        assert_eq!(
            classify_result(Phase::Operation, 80, "Code: 0x50").kind(),
            ErrorKind::InsufficientAccess
        );
        assert_eq!(
            classify_result(Phase::Operation, 53, "server is read-only").kind(),
            ErrorKind::Other
        );
    }

    #[test]
    fn test_classify_message_keeps_text() {
        let err = classify_message("Code: 0x35");
        assert_eq!(err.kind(), ErrorKind::NoSuchObject);
        assert!(err.to_string().contains("Code: 0x35"));
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("ldap://localhost:389").is_ok());
        assert!(validate_endpoint("LDAPS://dir.example.com").is_ok());
        assert!(validate_endpoint("ldap://").is_err());
        assert!(validate_endpoint("http://localhost").is_err());
        assert!(validate_endpoint("localhost:389").is_err());
    }

    #[test]
    fn test_rename_request_defaults() {
        let req: RenameRequest = serde_json::from_str(r#"{"newRdn":"cn=Robert"}"#).unwrap();
        assert!(req.delete_old_rdn);
        assert!(req.new_superior.is_none());
    }
}
