use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use tracing::debug;

use crate::model::QueueView;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Status and raw body exactly as the remote service produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// The remote pipeline service. `Err` means no response was obtained.
#[async_trait]
pub trait UpstreamService: Send + Sync {
    async fn fetch_view(
        &self,
        token: &str,
        view: QueueView,
        limit: &str,
        offset: &str,
    ) -> Result<UpstreamResponse>;

    async fn post_status(
        &self,
        token: &str,
        content_id: &str,
        body: Vec<u8>,
    ) -> Result<UpstreamResponse>;
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// HTTP client shared by the upstream and proxy clients.
pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!("queue-dashboard/", env!("CARGO_PKG_VERSION")))
        .no_proxy()
        .build()
        .context("failed to build HTTP client")
}

/// Append path segments to `base`. Segments are percent-encoded, so an item
/// id can never escape its path position.
pub(crate) fn append_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("base URL cannot carry a path: {base}"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl UpstreamClient {
    pub fn new(base_url: Url) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        append_segments(&self.base_url, segments)
    }

    pub fn view_url(&self, view: QueueView, limit: &str, offset: &str) -> Result<Url> {
        let mut url = self.endpoint(&["v1", "views", view.as_str()])?;
        url.query_pairs_mut()
            .append_pair("limit", limit)
            .append_pair("offset", offset);
        Ok(url)
    }

    pub fn status_url(&self, content_id: &str) -> Result<Url> {
        self.endpoint(&["v1", "extension", "tasks", content_id, "status"])
    }

    async fn relay(&self, request: reqwest::RequestBuilder) -> Result<UpstreamResponse> {
        let res = request.send().await.context("failed to reach upstream")?;
        let status = res.status().as_u16();
        let body = res
            .bytes()
            .await
            .context("failed to read upstream response")?
            .to_vec();
        debug!(status, bytes = body.len(), "upstream responded");
        Ok(UpstreamResponse { status, body })
    }
}

#[async_trait]
impl UpstreamService for UpstreamClient {
    async fn fetch_view(
        &self,
        token: &str,
        view: QueueView,
        limit: &str,
        offset: &str,
    ) -> Result<UpstreamResponse> {
        let url = self.view_url(view, limit, offset)?;
        debug!(url = %url, "GET upstream view");
        self.relay(self.http.get(url).header(API_KEY_HEADER, token))
            .await
    }

    async fn post_status(
        &self,
        token: &str,
        content_id: &str,
        body: Vec<u8>,
    ) -> Result<UpstreamResponse> {
        let url = self.status_url(content_id)?;
        debug!(url = %url, bytes = body.len(), "POST upstream status");
        self.relay(
            self.http
                .post(url)
                .header(API_KEY_HEADER, token)
                .header("Content-Type", "application/json")
                .body(body),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> UpstreamClient {
        UpstreamClient::new(Url::parse(base).unwrap()).unwrap()
    }

    #[test]
    fn view_url_carries_pagination_in_query() {
        let c = client("http://127.0.0.1:8000");
        let url = c.view_url(QueueView::DraftingQueue, "100", "0").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8000/v1/views/drafting_queue?limit=100&offset=0"
        );
    }

    #[test]
    fn view_url_encodes_opaque_pagination() {
        let c = client("http://127.0.0.1:8000/");
        let url = c.view_url(QueueView::Ingested, "10&x=1", "-5").unwrap();
        assert_eq!(url.query(), Some("limit=10%26x%3D1&offset=-5"));
    }

    #[test]
    fn base_path_is_preserved() {
        let c = client("https://api.example.com/db/");
        let url = c.status_url("c42").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/db/v1/extension/tasks/c42/status"
        );
    }

    #[test]
    fn content_id_cannot_escape_its_segment() {
        let c = client("http://127.0.0.1:8000");
        let url = c.status_url("../../admin?x=1").unwrap();
        assert_eq!(url.query(), None);
        assert!(url.path().starts_with("/v1/extension/tasks/"));
        assert!(url.path().ends_with("/status"));
        assert!(!url.path().contains("/admin/"));
    }

    #[test]
    fn debug_hides_http_internals() {
        let printed = format!("{:?}", client("http://127.0.0.1:8000"));
        assert!(printed.contains("UpstreamClient"));
        assert!(printed.contains("127.0.0.1"));
    }
}
