use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enumerated failure kinds callers branch on.
///
/// Serialized by variant name (`"NoSuchObject"`, `"BindFailed"`, ...) in the
/// `errorKind` field of every failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Malformed,
    BindFailed,
    TransportFailed,
    NoSuchObject,
    EntryAlreadyExists,
    NoSuchAttribute,
    InvalidAttributeSyntax,
    InsufficientAccess,
    ParentCreationFailed,
    PartiallyApplied,
    Config,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Malformed => "Malformed",
            ErrorKind::BindFailed => "BindFailed",
            ErrorKind::TransportFailed => "TransportFailed",
            ErrorKind::NoSuchObject => "NoSuchObject",
            ErrorKind::EntryAlreadyExists => "EntryAlreadyExists",
            ErrorKind::NoSuchAttribute => "NoSuchAttribute",
            ErrorKind::InvalidAttributeSyntax => "InvalidAttributeSyntax",
            ErrorKind::InsufficientAccess => "InsufficientAccess",
            ErrorKind::ParentCreationFailed => "ParentCreationFailed",
            ErrorKind::PartiallyApplied => "PartiallyApplied",
            ErrorKind::Config => "Config",
            ErrorKind::Other => "Other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Malformed(String),

    #[error("Bind failed: {0}")]
    BindFailed(String),

    #[error("Transport failed: {0}")]
    TransportFailed(String),

    #[error("No such object: {0}")]
    NoSuchObject(String),

    #[error("Entry already exists: {0}")]
    EntryAlreadyExists(String),

    #[error("No such attribute: {0}")]
    NoSuchAttribute(String),

    #[error("Invalid attribute syntax: {0}")]
    InvalidAttributeSyntax(String),

    #[error("Insufficient access: {0}")]
    InsufficientAccess(String),

    #[error("Failed to create parent entry {dn}: {message}")]
    ParentCreationFailed { dn: String, message: String },

    #[error("Entry renamed to {dn} but attribute update failed: {message}")]
    PartiallyApplied { dn: String, message: String },

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AppError {
    /// Build an error of the given kind around an upstream message.
    ///
    /// `ParentCreationFailed` and `PartiallyApplied` carry a DN and are
    /// constructed directly by the components that produce them.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::Malformed => AppError::Malformed(message),
            ErrorKind::BindFailed => AppError::BindFailed(message),
            ErrorKind::TransportFailed => AppError::TransportFailed(message),
            ErrorKind::NoSuchObject => AppError::NoSuchObject(message),
            ErrorKind::EntryAlreadyExists => AppError::EntryAlreadyExists(message),
            ErrorKind::NoSuchAttribute => AppError::NoSuchAttribute(message),
            ErrorKind::InvalidAttributeSyntax => AppError::InvalidAttributeSyntax(message),
            ErrorKind::InsufficientAccess => AppError::InsufficientAccess(message),
            ErrorKind::ParentCreationFailed => AppError::ParentCreationFailed {
                dn: String::new(),
                message,
            },
            ErrorKind::PartiallyApplied => AppError::PartiallyApplied {
                dn: String::new(),
                message,
            },
            ErrorKind::Config => AppError::ConfigError(message),
            ErrorKind::Other => AppError::Directory(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Malformed(_) => ErrorKind::Malformed,
            AppError::BindFailed(_) => ErrorKind::BindFailed,
            AppError::TransportFailed(_) => ErrorKind::TransportFailed,
            AppError::NoSuchObject(_) => ErrorKind::NoSuchObject,
            AppError::EntryAlreadyExists(_) => ErrorKind::EntryAlreadyExists,
            AppError::NoSuchAttribute(_) => ErrorKind::NoSuchAttribute,
            AppError::InvalidAttributeSyntax(_) => ErrorKind::InvalidAttributeSyntax,
            AppError::InsufficientAccess(_) => ErrorKind::InsufficientAccess,
            AppError::ParentCreationFailed { .. } => ErrorKind::ParentCreationFailed,
            AppError::PartiallyApplied { .. } => ErrorKind::PartiallyApplied,
            AppError::Directory(_) => ErrorKind::Other,
            AppError::ConfigError(_) => ErrorKind::Config,
            AppError::IoError(_) => ErrorKind::TransportFailed,
            AppError::SerializationError(_) => ErrorKind::Malformed,
        }
    }
}

/// Serializable error body returned to the browser
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub ok: bool,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        ErrorBody {
            ok: false,
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        ErrorBody::from(self).serialize(serializer)
    }
}

impl AppError {
    /// HTTP status a failed request is answered with.
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Malformed => StatusCode::BAD_REQUEST,
            ErrorKind::BindFailed => StatusCode::UNAUTHORIZED,
            ErrorKind::InsufficientAccess => StatusCode::FORBIDDEN,
            ErrorKind::NoSuchObject => StatusCode::NOT_FOUND,
            ErrorKind::EntryAlreadyExists => StatusCode::CONFLICT,
            ErrorKind::TransportFailed => StatusCode::BAD_GATEWAY,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error_kind = %self.kind(), error = %self, "Request failed");
        } else {
            tracing::debug!(error_kind = %self.kind(), error = %self, "Request rejected");
        }
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let err = AppError::NoSuchObject("ou=People,dc=example,dc=com".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["errorKind"], "NoSuchObject");
        assert_eq!(
            json["message"],
            "No such object: ou=People,dc=example,dc=com"
        );
    }

    #[test]
    fn test_from_kind_round_trips_kind() {
        for kind in [
            ErrorKind::Malformed,
            ErrorKind::BindFailed,
            ErrorKind::TransportFailed,
            ErrorKind::NoSuchObject,
            ErrorKind::EntryAlreadyExists,
            ErrorKind::NoSuchAttribute,
            ErrorKind::InvalidAttributeSyntax,
            ErrorKind::InsufficientAccess,
            ErrorKind::Other,
        ] {
            assert_eq!(AppError::from_kind(kind, "x").kind(), kind);
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Malformed("x".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::BindFailed("x".to_string()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::EntryAlreadyExists("x".to_string()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::TransportFailed("x".to_string()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::PartiallyApplied {
                dn: "cn=x".to_string(),
                message: "x".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_malformed_message_is_verbatim() {
        let err = AppError::Malformed("Invalid JSON".to_string());
        assert_eq!(err.to_string(), "Invalid JSON");
    }
}
