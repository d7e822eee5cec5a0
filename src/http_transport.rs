//! HTTP query and command surface
//!
//! | Path                   | Result                                               |
//! |------------------------|------------------------------------------------------|
//! | `/`                    | service information                                  |
//! | `/status`              | gateway link states                                  |
//! | `/get/latest`          | most recent message, 204 when nothing was seen yet   |
//! | `/get/all`             | latest message of every known address                |
//! | `/get/all/<name>`      | full history of the addresses `<name>` resolves to   |
//! | `/get/raw/<name>`      | latest values decoded through their datapoint types  |
//! | `/get/<name>`          | latest messages of the addresses `<name>` resolves to |
//! | `/set/<name>/<value>`  | write `<value>` to the single address `<name>` names  |

use crate::bridge::KnxBridge;
use crate::error::{KnxError, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<KnxBridge>,
}

impl IntoResponse for KnxError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("Request failed: {self}");
        } else {
            debug!("Request rejected: {self}");
        }
        (status, Json(self.to_api_body())).into_response()
    }
}

/// Build the router
pub fn router(bridge: Arc<KnxBridge>, enable_cors: bool) -> Router {
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/status", get(status_handler))
        .route("/get/*path", get(get_handler))
        .route("/set/*path", get(set_handler).post(set_handler))
        .with_state(AppState { bridge });

    if enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Serve `app` on `port` until `cancel` fires
pub async fn serve(app: Router, port: u16, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| KnxError::config(format!("Failed to bind to port {port}: {e}")))?;

    info!("🌐 HTTP server listening on port {port}");
    info!("📬 Queries: http://localhost:{port}/get/all");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "points": state.bridge.catalog().len(),
        "endpoints": {
            "status": "/status",
            "latest": "/get/latest",
            "all": "/get/all",
            "history": "/get/all/<name>",
            "raw": "/get/raw/<name>",
            "latest_for": "/get/<name>",
            "write": "/set/<name>/<value>",
        },
    }))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.bridge.store();
    Json(json!({
        "gateways": state.bridge.gateway_status().await,
        "known_addresses": store.known_addresses().await.len(),
        "messages": store.history_len().await,
    }))
}

async fn get_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> std::result::Result<Response, KnxError> {
    let bridge = &state.bridge;
    let response = match path.as_str() {
        "latest" => match bridge.latest().await {
            Some(view) => Json(view).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        },
        "all" => Json(bridge.all().await).into_response(),
        _ => {
            if let Some(name) = path.strip_prefix("all/") {
                Json(bridge.history_for(name).await?).into_response()
            } else if let Some(name) = path.strip_prefix("raw/") {
                Json(bridge.decoded_for(name).await?).into_response()
            } else {
                Json(bridge.latest_for(&path).await?).into_response()
            }
        }
    };
    Ok(response)
}

async fn set_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> std::result::Result<Response, KnxError> {
    let (name, value) = path
        .rsplit_once('/')
        .filter(|(name, value)| !name.is_empty() && !value.is_empty())
        .ok_or_else(|| KnxError::parse(format!("expected /set/<name>/<value>, got /set/{path}")))?;

    let receipt = state.bridge.write(name, value).await?;
    Ok(Json(receipt).into_response())
}
