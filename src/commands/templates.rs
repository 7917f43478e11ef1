//! Quick-add entry templates

use super::ApiResponse;
use crate::domain::{entry_template, EntryTemplate, TemplateKind};
use axum::extract::{Path, Query};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateQuery {
    #[serde(default)]
    pub base_dn: String,
}

/// Suggested DN and starter attributes for a quick-add kind
pub async fn get_template(
    Path(kind): Path<String>,
    Query(query): Query<TemplateQuery>,
) -> Json<ApiResponse<EntryTemplate>> {
    let kind = TemplateKind::parse_or_default(&kind);
    ApiResponse::with_data(entry_template(kind, query.base_dn.trim()))
}
