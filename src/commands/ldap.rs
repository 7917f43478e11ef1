//! One handler per directory operation

use super::{parse_body, required_fields, ApiResponse, ApiResult, ConnectionFields, Payload, CONNECTION_FIELDS};
use crate::domain::{Attributes, DirectoryEntry, PendingMutation, SearchRequest, SearchScope, MATCH_ALL_FILTER};
use crate::infrastructure::RenameRequest;
use crate::state::AppState;
use axum::extract::State;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "baseDN")]
    pub base_dn: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub scope: Option<SearchScope>,
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
    #[serde(default)]
    pub size_limit: Option<u32>,
}

impl SearchBody {
    pub fn request(&self) -> SearchRequest {
        let filter = self
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(MATCH_ALL_FILTER);
        SearchRequest {
            base_dn: self.base_dn.trim().to_string(),
            filter: filter.to_string(),
            scope: self.scope.unwrap_or_default(),
            attributes: self.attributes.clone(),
            size_limit: self.size_limit.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchData {
    pub entries: Vec<DirectoryEntry>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct AddBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "entryDN")]
    pub entry_dn: String,
    pub attributes: Attributes,
}

#[derive(Debug, Deserialize)]
pub struct ModifyBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "entryDN")]
    pub entry_dn: String,
    pub changes: Vec<PendingMutation>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "entryDN")]
    pub entry_dn: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    #[serde(flatten)]
    pub connection: ConnectionFields,
    #[serde(rename = "entryDN")]
    pub entry_dn: String,
    #[serde(flatten)]
    pub rename: RenameRequest,
}

/// Verify endpoint and credentials
pub async fn ldap_connect(State(state): State<AppState>, payload: Payload) -> ApiResult<()> {
    let body: ConnectionFields = parse_body(payload, CONNECTION_FIELDS)?;
    state.directory.connect(&body.context()).await?;
    Ok(ApiResponse::empty())
}

pub async fn ldap_search(State(state): State<AppState>, payload: Payload) -> ApiResult<SearchData> {
    let body: SearchBody = parse_body(payload, &required_fields(&["baseDN"]))?;
    let entries = state
        .directory
        .search(&body.connection.context(), &body.request())
        .await?;
    Ok(ApiResponse::with_data(SearchData {
        count: entries.len(),
        entries,
    }))
}

pub async fn ldap_add(State(state): State<AppState>, payload: Payload) -> ApiResult<()> {
    let body: AddBody = parse_body(payload, &required_fields(&["entryDN", "attributes"]))?;
    state
        .directory
        .add(&body.connection.context(), body.entry_dn.trim(), &body.attributes)
        .await?;
    Ok(ApiResponse::empty())
}

pub async fn ldap_modify(State(state): State<AppState>, payload: Payload) -> ApiResult<()> {
    let body: ModifyBody = parse_body(payload, &required_fields(&["entryDN", "changes"]))?;
    state
        .directory
        .modify(&body.connection.context(), body.entry_dn.trim(), &body.changes)
        .await?;
    Ok(ApiResponse::empty())
}

pub async fn ldap_delete(State(state): State<AppState>, payload: Payload) -> ApiResult<()> {
    let body: DeleteBody = parse_body(payload, &required_fields(&["entryDN"]))?;
    state
        .directory
        .delete(&body.connection.context(), body.entry_dn.trim())
        .await?;
    Ok(ApiResponse::empty())
}

pub async fn ldap_rename(State(state): State<AppState>, payload: Payload) -> ApiResult<()> {
    let body: RenameBody = parse_body(payload, &required_fields(&["entryDN", "newRdn"]))?;
    state
        .directory
        .rename(&body.connection.context(), body.entry_dn.trim(), &body.rename)
        .await?;
    Ok(ApiResponse::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_defaults() {
        let body: SearchBody = serde_json::from_value(json!({
            "url": "ldap://localhost",
            "bindDN": "cn=admin",
            "password": "secret",
            "baseDN": " dc=example,dc=com ",
            "filter": ""
        }))
        .unwrap();
        let request = body.request();
        assert_eq!(request.base_dn, "dc=example,dc=com");
        assert_eq!(request.filter, MATCH_ALL_FILTER);
        assert_eq!(request.scope, SearchScope::Subtree);
        assert_eq!(request.size_limit, 0);
        assert!(request.attributes.is_none());
    }

    #[test]
    fn test_rename_body_fields() {
        let body: RenameBody = serde_json::from_value(json!({
            "url": "ldap://localhost",
            "bindDN": "cn=admin",
            "password": "secret",
            "entryDN": "cn=Bob,dc=example,dc=com",
            "newRdn": "cn=Robert",
            "deleteOldRdn": false
        }))
        .unwrap();
        assert_eq!(body.rename.new_rdn, "cn=Robert");
        assert!(!body.rename.delete_old_rdn);
        assert_eq!(body.connection.bind_dn, "cn=admin");
    }
}
