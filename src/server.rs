//! HTTP router and server lifecycle

use crate::commands;
use crate::config::ConsoleConfig;
use crate::error::AppResult;
use crate::infrastructure::DirectoryService;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the console router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let ldap_routes = Router::new()
        .route("/connect", post(commands::ldap_connect))
        .route("/search", post(commands::ldap_search))
        .route("/add", post(commands::ldap_add))
        .route("/modify", post(commands::ldap_modify))
        .route("/delete", post(commands::ldap_delete))
        .route("/rename", post(commands::ldap_rename));

    let browse_routes = Router::new()
        .route("/tree", post(commands::browse_tree))
        .route("/ensure-parents", post(commands::browse_ensure_parents))
        .route("/entries", post(commands::browse_add_entry))
        .route("/edit", post(commands::browse_edit_entry))
        .route("/databases", post(commands::browse_databases))
        .route("/databases/create", post(commands::browse_create_database))
        .route("/databases/remove", post(commands::browse_remove_database));

    let dicom_routes = Router::new()
        .route("/connections", post(commands::dicom_connections))
        .route("/connections/save", post(commands::dicom_save_connection))
        .route("/ae", post(commands::dicom_aes))
        .route("/ae/save", post(commands::dicom_save_ae));

    let mut router = Router::new()
        .route("/health", get(commands::health_check))
        .route("/api/templates/:kind", get(commands::get_template))
        .nest("/api/ldap", ldap_routes)
        .nest("/api/browse", browse_routes)
        .nest("/api/dicom", dicom_routes)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

/// Console server
pub struct Server {
    config: ConsoleConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: ConsoleConfig, directory: Arc<dyn DirectoryService>, offline: bool) -> Self {
        let state = AppState::new(directory, config.directory.discovery(), offline);
        Self { config, state }
    }

    /// Run the server until Ctrl+C or SIGTERM
    pub async fn run(self) -> AppResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(self.state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "LDAP console listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("LDAP console shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{DiscoveryOptions, InMemoryDirectory};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(dir: &InMemoryDirectory) -> Router {
        let state = AppState::new(Arc::new(dir.clone()), DiscoveryOptions::default(), true);
        create_router(state, false)
    }

    fn with_connection(mut body: Value) -> Value {
        body["url"] = json!("ldap://memory");
        body["bindDN"] = json!("cn=admin,dc=example,dc=com");
        body["password"] = json!("secret");
        body
    }

    async fn post_raw(app: Router, uri: &str, body: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        post_raw(app, uri, body.to_string()).await
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let dir = InMemoryDirectory::demo();
        let (status, body) = post_raw(app(&dir), "/api/ldap/search", "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], json!(false));
        assert_eq!(body["errorKind"], json!("Malformed"));
        assert_eq!(body["message"], json!("Invalid JSON"));
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let dir = InMemoryDirectory::demo();
        let (status, body) = post(
            app(&dir),
            "/api/ldap/rename",
            with_connection(json!({ "entryDN": "cn=Bob,ou=People,dc=example,dc=com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            json!("Missing required fields: url, bindDN, password, entryDN, newRdn")
        );
        assert!(dir.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_search_demo_directory() {
        let dir = InMemoryDirectory::demo();
        let (status, body) = post(
            app(&dir),
            "/api/ldap/search",
            with_connection(json!({ "baseDN": "ou=People,dc=example,dc=com", "filter": "(cn=Bob)" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["data"]["count"], json!(1));
        assert_eq!(
            body["data"]["entries"][0]["dn"],
            json!("cn=Bob,ou=People,dc=example,dc=com")
        );
    }

    #[tokio::test]
    async fn test_missing_base_is_not_found() {
        let dir = InMemoryDirectory::demo();
        let (status, body) = post(
            app(&dir),
            "/api/ldap/search",
            with_connection(json!({ "baseDN": "ou=Nowhere,dc=example,dc=com", "scope": "base" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errorKind"], json!("NoSuchObject"));
    }

    #[tokio::test]
    async fn test_edit_renames_entry() {
        let dir = InMemoryDirectory::demo();
        let (status, body) = post(
            app(&dir),
            "/api/browse/edit",
            with_connection(json!({
                "entryDN": "cn=Bob,ou=People,dc=example,dc=com",
                "attributes": {
                    "objectClass": ["top", "person", "organizationalPerson", "inetOrgPerson"],
                    "cn": "Robert",
                    "sn": "Builder",
                    "mail": "robert@example.com"
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["dn"], json!("cn=Robert,ou=People,dc=example,dc=com"));
        assert!(!dir.contains("cn=Bob,ou=People,dc=example,dc=com").await);

        let robert = dir.entry("cn=Robert,ou=People,dc=example,dc=com").await.unwrap();
        assert_eq!(robert.first("mail"), Some("robert@example.com"));
    }

    #[tokio::test]
    async fn test_quick_add_creates_ancestors() {
        let dir = InMemoryDirectory::demo();
        dir.refuse_add("dc=com").await;
        let (status, body) = post(
            app(&dir),
            "/api/browse/entries",
            with_connection(json!({
                "baseDN": "dc=example,dc=com",
                "entryDN": "cn=Alice,ou=Staff,ou=People,dc=example,dc=com",
                "attributes": {
                    "objectClass": ["top", "person"],
                    "cn": "Alice",
                    "sn": "Smith"
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"]["ancestors"]["created"],
            json!(["ou=Staff,ou=People,dc=example,dc=com"])
        );
        assert_eq!(body["data"]["ancestors"]["warnings"].as_array().map(Vec::len), Some(1));
        assert!(dir.contains("cn=Alice,ou=Staff,ou=People,dc=example,dc=com").await);
    }

    #[tokio::test]
    async fn test_quick_add_requires_database() {
        let dir = InMemoryDirectory::demo();
        let (status, body) = post(
            app(&dir),
            "/api/browse/entries",
            with_connection(json!({
                "entryDN": "ou=New,dc=example,dc=com",
                "attributes": { "objectClass": ["top", "organizationalUnit"], "ou": "New" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            json!("No database selected. Please select a database first.")
        );
        assert!(dir.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_bind_failure_is_unauthorized() {
        let dir = InMemoryDirectory::demo().with_credentials("cn=admin,dc=example,dc=com", "other");
        let (status, body) = post(app(&dir), "/api/ldap/connect", with_connection(json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errorKind"], json!("BindFailed"));
    }

    const DEVICE: &str =
        "dicomDeviceName=dcm4chee-arc,cn=Devices,cn=DICOM Configuration,dc=dcm4che,dc=org";

    #[tokio::test]
    async fn test_dicom_ae_rename() {
        let dir = InMemoryDirectory::demo();
        let (status, body) = post(
            app(&dir),
            "/api/dicom/ae/save",
            with_connection(json!({
                "entryDN": format!("dicomAETitle=DCM4CHEE,{}", DEVICE),
                "aeTitle": "ARCHIVE"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["dn"], json!(format!("dicomAETitle=ARCHIVE,{}", DEVICE)));

        let (_, body) = post(
            app(&dir),
            "/api/dicom/ae",
            with_connection(json!({ "baseDN": "dc=dcm4che,dc=org" })),
        )
        .await;
        assert_eq!(body["data"][0]["aeTitle"], json!("ARCHIVE"));
    }

    #[tokio::test]
    async fn test_dicom_connection_port_rejected() {
        let dir = InMemoryDirectory::demo();
        let (status, body) = post(
            app(&dir),
            "/api/dicom/connections/save",
            with_connection(json!({
                "entryDN": format!("cn=dicom,{}", DEVICE),
                "cn": "dicom",
                "hostname": "pacs",
                "port": 70000
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorKind"], json!("Malformed"));
        assert!(dir.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_template_and_health() {
        let dir = InMemoryDirectory::demo();
        let request = Request::builder()
            .uri("/api/templates/person?baseDn=ou=People,dc=example,dc=com")
            .body(Body::empty())
            .unwrap();
        let response = app(&dir).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["dn"], json!("cn=John Doe,ou=People,dc=example,dc=com"));

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app(&dir).oneshot(request).await.unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["mode"], json!("offline"));
    }
}
