//! Typed HTTP client for the fleet-top daemon REST API.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::config::NodeTarget;
use crate::domain::filter::FilterInput;
use crate::domain::types::{
    DaemonHealth, ErrorBody, FilterResponse, MachineSummary, SelectRequest, SortRequest,
};
use crate::domain::view_model::TableView;
use crate::ingest::IngestMessage;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9200";

pub struct FleetTopClient {
    base_url: String,
    http: Client,
}

impl FleetTopClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Resolve a client from the nodes map.
    /// `None` name → localhost default. `Some(name)` → look up in nodes map.
    pub fn from_node(name: Option<&str>, nodes: &HashMap<String, NodeTarget>) -> Result<Self> {
        match name {
            None => Self::new(DEFAULT_BASE_URL),
            Some(n) => match nodes.get(n) {
                Some(target) => Self::new(&target.url),
                None => bail!(
                    "node '{}' not found in config. Available nodes: {}",
                    n,
                    if nodes.is_empty() {
                        "(none configured)".to_string()
                    } else {
                        nodes.keys().cloned().collect::<Vec<_>>().join(", ")
                    }
                ),
            },
        }
    }

    pub async fn health(&self) -> Result<DaemonHealth> {
        self.send_json(self.request(Method::GET, "/health")).await
    }

    pub async fn view(&self) -> Result<TableView> {
        self.send_json(self.request(Method::GET, "/api/v1/view"))
            .await
    }

    pub async fn machines(&self) -> Result<Vec<MachineSummary>> {
        self.send_json(self.request(Method::GET, "/api/v1/machines"))
            .await
    }

    pub async fn set_filter(&self, input: &FilterInput) -> Result<FilterResponse> {
        self.send_json(self.request(Method::PUT, "/api/v1/filter").json(input))
            .await
    }

    pub async fn set_sort(&self, column: &str, ascending: bool) -> Result<TableView> {
        let body = SortRequest {
            column: column.to_string(),
            ascending,
        };
        self.send_json(self.request(Method::PUT, "/api/v1/sort").json(&body))
            .await
    }

    pub async fn select(&self, node_name: &str) -> Result<()> {
        let body = SelectRequest {
            node_name: node_name.to_string(),
        };
        self.send(self.request(Method::PUT, "/api/v1/selection").json(&body))
            .await
    }

    pub async fn clear_selection(&self) -> Result<()> {
        self.send(self.request(Method::DELETE, "/api/v1/selection"))
            .await
    }

    pub async fn ingest(&self, message: &IngestMessage) -> Result<()> {
        self.send(self.request(Method::POST, "/api/v1/ingest").json(message))
            .await
    }

    // ── Internal helpers ───────────────────────────────────

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.http.request(method, url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<()> {
        self.checked(request).await.map(|_| ())
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = self.checked(request).await?;
        let url = resp.url().to_string();
        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }

    /// Send and turn non-2xx responses into errors, surfacing the daemon's
    /// error message when it sent one.
    async fn checked(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let resp = request.send().await.context("sending request to daemon")?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let url = resp.url().to_string();
        match resp.json::<ErrorBody>().await {
            Ok(body) => bail!("{} returned {}: {}", url, status, body.error),
            Err(_) => bail!("{} returned {}", url, status),
        }
    }
}

