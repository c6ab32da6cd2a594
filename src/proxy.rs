//! Browser-facing proxy in front of the pipeline service.
//!
//! Only routing metadata (path segments and pagination query) is parsed here.
//! Request and response bodies are opaque bytes; the upstream status and body
//! are relayed as-is with the content type forced to JSON.
use axum::body::{Body, Bytes};
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

use crate::model::QueueView;
use crate::upstream::{UpstreamResponse, UpstreamService};

pub const DEFAULT_LIMIT: &str = "50";
pub const DEFAULT_OFFSET: &str = "0";

pub const INVALID_VIEW_DETAIL: &str = "Invalid view";
pub const MISSING_TOKEN_DETAIL: &str = "Missing DB_API_SERVICE_TOKEN in dashboard env";
pub const INVALID_CONTENT_ID_DETAIL: &str = "Invalid content id";

/// Per-process handler context, built once at startup.
#[derive(Clone)]
pub struct ProxyState {
    upstream_token: Option<Arc<str>>,
    upstream: Arc<dyn UpstreamService>,
}

impl fmt::Debug for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyState")
            .field("has_token", &self.upstream_token.is_some())
            .finish_non_exhaustive()
    }
}

impl ProxyState {
    pub fn new(upstream_token: Option<String>, upstream: Arc<dyn UpstreamService>) -> Self {
        Self {
            upstream_token: upstream_token.map(Arc::from),
            upstream,
        }
    }

    fn token(&self) -> Result<&str, ProxyError> {
        self.upstream_token
            .as_deref()
            .ok_or(ProxyError::MissingCredential)
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid view: {0}")]
    InvalidView(String),
    #[error("invalid content id: {0}")]
    InvalidContentId(String),
    #[error("service token is not configured")]
    MissingCredential,
    #[error("upstream request failed: {0:#}")]
    Upstream(#[from] anyhow::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::InvalidView(view) => {
                warn!(view, "rejected unknown view");
                detail(StatusCode::BAD_REQUEST, INVALID_VIEW_DETAIL)
            }
            ProxyError::InvalidContentId(reason) => {
                warn!(reason, "rejected content id");
                detail(StatusCode::BAD_REQUEST, INVALID_CONTENT_ID_DETAIL)
            }
            ProxyError::MissingCredential => {
                error!("refusing to proxy without a service token");
                detail(StatusCode::INTERNAL_SERVER_ERROR, MISSING_TOKEN_DETAIL)
            }
            ProxyError::Upstream(err) => {
                error!(?err, "upstream transport failure");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

/// Raw query pairs. Repeated keys are allowed; the first occurrence wins.
pub type QueryPairs = Query<Vec<(String, String)>>;

fn first_param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/api/view/:view", get(view_list))
        .route("/api/extension-status/:content_id", post(extension_status))
        .with_state(state)
}

/// Extractor rejections are taken as values so that every failure goes
/// through the view check, then the credential check, in that order.
#[instrument(skip_all)]
pub async fn view_list(
    State(state): State<ProxyState>,
    view: Result<Path<String>, PathRejection>,
    query: Result<QueryPairs, QueryRejection>,
) -> Result<Response, ProxyError> {
    let view: QueueView = match view {
        Ok(Path(raw)) => raw.parse::<QueueView>().map_err(|_| ProxyError::InvalidView(raw))?,
        Err(rejection) => return Err(ProxyError::InvalidView(rejection.body_text())),
    };
    let token = state.token()?;
    let pairs = query.map(|Query(pairs)| pairs).unwrap_or_default();
    let limit = first_param(&pairs, "limit").unwrap_or(DEFAULT_LIMIT);
    let offset = first_param(&pairs, "offset").unwrap_or(DEFAULT_OFFSET);

    let upstream = state
        .upstream
        .fetch_view(token, view, limit, offset)
        .await?;
    info!(%view, limit, offset, status = upstream.status, "relayed view");
    relay(upstream)
}

#[instrument(skip_all)]
pub async fn extension_status(
    State(state): State<ProxyState>,
    content_id: Result<Path<String>, PathRejection>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let token = state.token()?;
    let Path(content_id) =
        content_id.map_err(|rejection| ProxyError::InvalidContentId(rejection.body_text()))?;
    let upstream = state
        .upstream
        .post_status(token, &content_id, body.to_vec())
        .await?;
    info!(content_id, status = upstream.status, "relayed status update");
    relay(upstream)
}

fn relay(upstream: UpstreamResponse) -> Result<Response, ProxyError> {
    let status = StatusCode::from_u16(upstream.status)
        .map_err(|err| ProxyError::Upstream(anyhow::Error::new(err)))?;
    Ok((
        status,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from(upstream.body),
    )
        .into_response())
}

/// Serve the proxy on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, state: ProxyState) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamClient;
    use reqwest::Url;

    fn state(token: Option<&str>) -> ProxyState {
        let client = UpstreamClient::new(Url::parse("http://127.0.0.1:9").unwrap()).unwrap();
        ProxyState::new(token.map(str::to_string), Arc::new(client))
    }

    #[test]
    fn debug_never_prints_token() {
        let printed = format!("{:?}", state(Some("s3cret")));
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("has_token: true"));
    }

    #[test]
    fn missing_token_is_reported() {
        assert!(matches!(
            state(None).token(),
            Err(ProxyError::MissingCredential)
        ));
        assert_eq!(state(Some("t")).token().unwrap(), "t");
    }

    #[tokio::test]
    async fn error_statuses() {
        let resp = ProxyError::InvalidView("nope".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = ProxyError::MissingCredential.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let resp = ProxyError::Upstream(anyhow::anyhow!("connection refused")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }
}
