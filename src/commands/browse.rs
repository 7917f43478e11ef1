//! Browse-by-database handlers: tree, quick-add, edit and the database list

use super::{parse_body, required_fields, ApiResponse, ApiResult, ConnectionFields, Payload, CONNECTION_FIELDS};
use crate::domain::{
    build_tree, dicom_kind, validate_new_entry, Attributes, DicomKind, DirectoryEntry, DirectoryTree,
    SearchRequest,
};
use crate::infrastructure::{
    apply_entry_edit, create_database, discover_databases, ensure_ancestors, load_entry,
    remove_database, AncestorReport, DatabaseCreation, DatabaseList, MutationOutcome,
};
use crate::state::AppState;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "baseDN")]
    pub base_dn: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub size_limit: Option<u32>,
}

/// Entries of a database with their tree and DICOM classification
#[derive(Debug, Serialize)]
pub struct BrowseData {
    pub entries: Vec<DirectoryEntry>,
    pub tree: DirectoryTree,
    pub dicom: BTreeMap<String, DicomKind>,
}

#[derive(Debug, Deserialize)]
pub struct EntryBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "entryDN")]
    pub entry_dn: String,
}

#[derive(Debug, Deserialize)]
pub struct QuickAddBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "entryDN")]
    pub entry_dn: String,
    pub attributes: Attributes,
    #[serde(rename = "baseDN", default)]
    pub base_dn: String,
}

#[derive(Debug, Serialize)]
pub struct QuickAddData {
    pub dn: String,
    pub ancestors: AncestorReport,
}

#[derive(Debug, Deserialize)]
pub struct EditBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "entryDN")]
    pub entry_dn: String,
    pub attributes: Attributes,
}

#[derive(Debug, Deserialize)]
pub struct DatabasesBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(default)]
    pub known: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDatabaseBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(default)]
    pub dn: String,
    #[serde(default)]
    pub known: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveDatabaseBody {
    pub dn: String,
    #[serde(default)]
    pub known: Vec<String>,
}

/// Load a database subtree and build its browse tree
pub async fn browse_tree(State(state): State<AppState>, payload: Payload) -> ApiResult<BrowseData> {
    let body: TreeBody = parse_body(payload, &required_fields(&["baseDN"]))?;
    let mut request = SearchRequest::subtree(body.base_dn.trim());
    if let Some(filter) = body.filter.as_deref().filter(|f| !f.trim().is_empty()) {
        request = request.with_filter(filter.trim());
    }
    if let Some(limit) = body.size_limit {
        request = request.with_size_limit(limit);
    }

    let entries = state
        .directory
        .search(&body.connection.context(), &request)
        .await?;
    let tree = build_tree(&entries);
    let dicom = entries
        .iter()
        .filter_map(|e| dicom_kind(e).map(|kind| (e.dn.clone(), kind)))
        .collect();

    tracing::debug!(base_dn = %request.base_dn, nodes = tree.len(), "Browse tree built");
    Ok(ApiResponse::with_data(BrowseData { entries, tree, dicom }))
}

/// Create every missing ancestor of a DN
pub async fn browse_ensure_parents(
    State(state): State<AppState>,
    payload: Payload,
) -> ApiResult<AncestorReport> {
    let body: EntryBody = parse_body(payload, &required_fields(&["entryDN"]))?;
    let report = ensure_ancestors(
        state.directory.as_ref(),
        &body.connection.context(),
        body.entry_dn.trim(),
    )
    .await?;
    Ok(ApiResponse::with_data(report))
}

/// Quick-add: validate, verify the bind, create ancestors, add the entry
pub async fn browse_add_entry(
    State(state): State<AppState>,
    payload: Payload,
) -> ApiResult<QuickAddData> {
    let body: QuickAddBody = parse_body(payload, &required_fields(&["entryDN", "attributes"]))?;
    let entry_dn = body.entry_dn.trim();
    validate_new_entry(entry_dn, &body.attributes, &body.base_dn)?;

    let ctx = body.connection.context();
    let dir = state.directory.as_ref();
    dir.connect(&ctx).await?;
    let ancestors = ensure_ancestors(dir, &ctx, entry_dn).await?;
    dir.add(&ctx, entry_dn, &body.attributes).await?;

    tracing::info!(dn = %entry_dn, created_ancestors = ancestors.created.len(), "Quick-add complete");
    Ok(ApiResponse::with_data(QuickAddData {
        dn: entry_dn.to_string(),
        ancestors,
    }))
}

/// Save an edited entry, renaming it when its naming value changed
pub async fn browse_edit_entry(
    State(state): State<AppState>,
    payload: Payload,
) -> ApiResult<MutationOutcome> {
    let body: EditBody = parse_body(payload, &required_fields(&["entryDN", "attributes"]))?;
    let ctx = body.connection.context();
    let dir = state.directory.as_ref();
    let original = load_entry(dir, &ctx, body.entry_dn.trim()).await?;
    let outcome = apply_entry_edit(dir, &ctx, &original, &body.attributes).await?;
    Ok(ApiResponse::with_data(outcome))
}

/// Discover base DNs and merge them with the browser's list
pub async fn browse_databases(
    State(state): State<AppState>,
    payload: Payload,
) -> ApiResult<DatabaseList> {
    let body: DatabasesBody = parse_body(payload, CONNECTION_FIELDS)?;
    let list = discover_databases(
        state.directory.as_ref(),
        &body.connection.context(),
        &state.discovery,
        &body.known,
    )
    .await?;
    Ok(ApiResponse::with_data(list))
}

pub async fn browse_create_database(
    State(state): State<AppState>,
    payload: Payload,
) -> ApiResult<DatabaseCreation> {
    let body: CreateDatabaseBody = parse_body(payload, CONNECTION_FIELDS)?;
    let created = create_database(
        state.directory.as_ref(),
        &body.connection.context(),
        &body.dn,
        &body.known,
    )
    .await?;
    Ok(ApiResponse::with_data(created))
}

/// Drop a DN from the browser's database list; the server is not touched.
pub async fn browse_remove_database(payload: Payload) -> ApiResult<Vec<String>> {
    let body: RemoveDatabaseBody = parse_body(payload, &["dn"])?;
    Ok(ApiResponse::with_data(remove_database(&body.known, &body.dn)))
}
