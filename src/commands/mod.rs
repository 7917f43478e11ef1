//! JSON request handlers for the browser console
//!
//! Every handler takes the connection fields in its body, runs one core
//! operation and answers with `{ ok: true, data? }` or the error body.

pub mod browse;
pub mod dicom;
pub mod health;
pub mod ldap;
pub mod templates;

pub use browse::*;
pub use dicom::*;
pub use health::*;
pub use ldap::*;
pub use templates::*;

use crate::domain::ConnectionContext;
use crate::error::{AppError, AppResult};
use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successful response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn with_data(data: T) -> Json<Self> {
        Json(Self {
            ok: true,
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    pub fn empty() -> Json<Self> {
        Json(Self { ok: true, data: None })
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// Raw request body as extracted by axum
pub type Payload = Result<Json<Value>, JsonRejection>;

/// Fields every directory request carries
pub const CONNECTION_FIELDS: &[&str] = &["url", "bindDN", "password"];

/// TLS options as sent by the browser
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsOptions {
    #[serde(default = "default_true")]
    pub reject_unauthorized: bool,
}

fn default_true() -> bool {
    true
}

/// Endpoint and credentials of the caller
#[derive(Clone, Deserialize)]
pub struct ConnectionFields {
    pub url: String,
    #[serde(rename = "bindDN")]
    pub bind_dn: String,
    pub password: String,
    #[serde(default)]
    pub tls: Option<TlsOptions>,
}

impl ConnectionFields {
    pub fn context(&self) -> ConnectionContext {
        let insecure = self
            .tls
            .as_ref()
            .map_or(false, |tls| !tls.reject_unauthorized);
        ConnectionContext::new(self.url.trim(), self.bind_dn.trim(), self.password.clone())
            .insecure(insecure)
    }
}

impl std::fmt::Debug for ConnectionFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFields")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("password", &"***")
            .field("tls", &self.tls)
            .finish()
    }
}

/// Whether a required field is absent. `password` only has to be a string
/// (anonymous binds send an empty one); list fields must be non-empty.
fn is_missing(body: &Value, field: &str) -> bool {
    match body.get(field) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => field != "password" && s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => field == "password",
    }
}

/// Decode a request body after checking its required fields.
pub fn parse_body<T: DeserializeOwned>(payload: Payload, required: &[&str]) -> AppResult<T> {
    let Json(body) = payload.map_err(|e| {
        tracing::debug!(error = %e, "Rejected request body");
        AppError::Malformed("Invalid JSON".to_string())
    })?;

    if required.iter().any(|field| is_missing(&body, field)) {
        return Err(AppError::Malformed(format!(
            "Missing required fields: {}",
            required.join(", ")
        )));
    }

    serde_json::from_value(body)
        .map_err(|e| AppError::Malformed(format!("Invalid request body: {}", e)))
}

/// Required fields of a route: the connection fields plus `extra`.
pub fn required_fields(extra: &[&'static str]) -> Vec<&'static str> {
    CONNECTION_FIELDS.iter().copied().chain(extra.iter().copied()).collect()
}
