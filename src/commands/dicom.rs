//! DICOM network-configuration handlers

use super::{parse_body, required_fields, ApiResponse, ApiResult, ConnectionFields, Payload};
use crate::domain::{
    DicomAe, DicomAeEdit, DicomConnection, DicomConnectionEdit, SearchRequest, AE_FILTER,
    AE_TITLE_ATTRIBUTE, CONNECTION_FILTER,
};
use crate::infrastructure::{apply_edit_named_by, apply_entry_edit, load_entry, MutationOutcome};
use crate::state::AppState;
use axum::extract::State;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct DicomListBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "baseDN")]
    pub base_dn: String,
}

/// Ports arrive as strings from form inputs and as numbers from scripts.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveConnectionBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "entryDN")]
    pub entry_dn: String,
    pub cn: String,
    pub hostname: String,
    #[serde(deserialize_with = "string_or_number")]
    pub port: String,
}

impl SaveConnectionBody {
    fn edit(&self) -> DicomConnectionEdit {
        DicomConnectionEdit {
            cn: self.cn.clone(),
            hostname: self.hostname.clone(),
            port: self.port.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveAeBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "entryDN")]
    pub entry_dn: String,
    #[serde(rename = "aeTitle")]
    pub ae_title: String,
}

pub async fn dicom_connections(
    State(state): State<AppState>,
    payload: Payload,
) -> ApiResult<Vec<DicomConnection>> {
    let body: DicomListBody = parse_body(payload, &required_fields(&["baseDN"]))?;
    let request = SearchRequest::subtree(body.base_dn.trim()).with_filter(CONNECTION_FILTER);
    let entries = state
        .directory
        .search(&body.connection.context(), &request)
        .await?;
    Ok(ApiResponse::with_data(
        entries.iter().filter_map(DicomConnection::from_entry).collect(),
    ))
}

pub async fn dicom_save_connection(
    State(state): State<AppState>,
    payload: Payload,
) -> ApiResult<MutationOutcome> {
    let body: SaveConnectionBody =
        parse_body(payload, &required_fields(&["entryDN", "cn", "hostname", "port"]))?;
    let edit = body.edit();
    edit.validate()?;

    let ctx = body.connection.context();
    let dir = state.directory.as_ref();
    let original = load_entry(dir, &ctx, body.entry_dn.trim()).await?;
    let outcome = apply_entry_edit(dir, &ctx, &original, &edit.to_attributes()).await?;
    tracing::info!(dn = %outcome.dn, "DICOM connection saved");
    Ok(ApiResponse::with_data(outcome))
}

pub async fn dicom_aes(
    State(state): State<AppState>,
    payload: Payload,
) -> ApiResult<Vec<DicomAe>> {
    let body: DicomListBody = parse_body(payload, &required_fields(&["baseDN"]))?;
    let request = SearchRequest::subtree(body.base_dn.trim()).with_filter(AE_FILTER);
    let entries = state
        .directory
        .search(&body.connection.context(), &request)
        .await?;
    Ok(ApiResponse::with_data(
        entries.iter().filter_map(DicomAe::from_entry).collect(),
    ))
}

/// AEs are always stored as `dicomAETitle=<title>`
pub async fn dicom_save_ae(
    State(state): State<AppState>,
    payload: Payload,
) -> ApiResult<MutationOutcome> {
    let body: SaveAeBody = parse_body(payload, &required_fields(&["entryDN", "aeTitle"]))?;
    let edit = DicomAeEdit {
        ae_title: body.ae_title.clone(),
    };
    edit.validate()?;

    let ctx = body.connection.context();
    let dir = state.directory.as_ref();
    let original = load_entry(dir, &ctx, body.entry_dn.trim()).await?;
    let outcome =
        apply_edit_named_by(dir, &ctx, &original, AE_TITLE_ATTRIBUTE, &edit.to_attributes()).await?;
    tracing::info!(dn = %outcome.dn, "DICOM AE saved");
    Ok(ApiResponse::with_data(outcome))
}
