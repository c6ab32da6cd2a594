//! Queue view component: selection, fetch lifecycle and table rendering.
//!
//! Transitions are split into "issue" (`mount`, `refresh`, `select_view`),
//! which hands out a [`FetchTicket`], and [`QueueDashboard::apply`], which
//! lands a fetch result. Only the most recently issued ticket may land; an
//! older fetch that resolves late is dropped.
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::fmt::Write as _;
use tracing::{debug, instrument, warn};

use crate::model::{QueueResponse, QueueView, Record};
use crate::upstream::{append_segments, http_client};

pub const PAGE_SIZE: u64 = 100;
pub const PAGE_OFFSET: u64 = 0;
pub const DETAIL_PLACEHOLDER: &str = "Click a row to inspect full JSON.";
pub const LOADING_TEXT: &str = "Loading queue...";

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded(QueueResponse),
    Errored(String),
}

/// What came back from the view-list proxy, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub status: u16,
    pub body: String,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub view: QueueView,
}

/// Anything that can fetch a page of a queue view. `Err` is a network
/// failure before any response arrived.
#[async_trait]
pub trait QueueSource: Send + Sync {
    async fn fetch_queue(&self, view: QueueView, limit: u64, offset: u64) -> Result<FetchOutcome>;
}

/// Rows rendered against the derived column set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct QueueDashboard {
    selected: QueueView,
    state: LoadState,
    selected_record: Option<Record>,
    columns: Vec<String>,
    last_count: u64,
    generation: u64,
}

impl Default for QueueDashboard {
    fn default() -> Self {
        Self::new(QueueView::default())
    }
}

impl QueueDashboard {
    pub fn new(selected: QueueView) -> Self {
        Self {
            selected,
            state: LoadState::Idle,
            selected_record: None,
            columns: Vec::new(),
            last_count: 0,
            generation: 0,
        }
    }

    pub fn selected_view(&self) -> QueueView {
        self.selected
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn selected_record(&self) -> Option<&Record> {
        self.selected_record.as_ref()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::Loading)
    }

    /// First load for the current view. Clears any selected record.
    pub fn mount(&mut self) -> FetchTicket {
        self.selected_record = None;
        self.issue()
    }

    /// Re-fetch the current view, keeping the selected record.
    pub fn refresh(&mut self) -> FetchTicket {
        self.issue()
    }

    /// Switch queues. Returns `None` when `view` is already selected.
    pub fn select_view(&mut self, view: QueueView) -> Option<FetchTicket> {
        if view == self.selected {
            return None;
        }
        self.selected = view;
        Some(self.mount())
    }

    fn issue(&mut self) -> FetchTicket {
        self.generation += 1;
        self.state = LoadState::Loading;
        FetchTicket {
            generation: self.generation,
            view: self.selected,
        }
    }

    /// Land a fetch result. Returns false (and changes nothing) when a newer
    /// fetch has been issued since `ticket`.
    pub fn apply(&mut self, ticket: FetchTicket, outcome: Result<FetchOutcome>) -> bool {
        if ticket.generation != self.generation {
            debug!(
                stale = ticket.generation,
                current = self.generation,
                view = %ticket.view,
                "discarding stale fetch"
            );
            return false;
        }

        self.state = match outcome {
            Err(err) => LoadState::Errored(format!("{err:#}")),
            Ok(outcome) if !outcome.is_success() => {
                if outcome.body.is_empty() {
                    LoadState::Errored(format!("Failed ({})", outcome.status))
                } else {
                    LoadState::Errored(outcome.body)
                }
            }
            Ok(outcome) => match serde_json::from_str::<QueueResponse>(&outcome.body) {
                Ok(data) => LoadState::Loaded(data),
                Err(err) => LoadState::Errored(format!("invalid queue response: {err}")),
            },
        };
        self.columns = match &self.state {
            LoadState::Loaded(data) => {
                self.last_count = data.count;
                derive_columns(&data.items)
            }
            _ => Vec::new(),
        };
        if let LoadState::Errored(message) = &self.state {
            warn!(view = %ticket.view, error = %message, "queue fetch failed");
        }
        true
    }

    /// Re-fetch the current view from `source` and land the result.
    pub async fn load(&mut self, source: &dyn QueueSource) -> bool {
        let ticket = self.refresh();
        self.fetch(ticket, source).await
    }

    /// Run the fetch described by `ticket` (first page, 100 rows) and land it.
    #[instrument(skip_all, fields(view = %ticket.view, generation = ticket.generation))]
    pub async fn fetch(&mut self, ticket: FetchTicket, source: &dyn QueueSource) -> bool {
        let outcome = source.fetch_queue(ticket.view, PAGE_SIZE, PAGE_OFFSET).await;
        self.apply(ticket, outcome)
    }

    /// Select the `index`th displayed row. Only meaningful while loaded.
    pub fn click_row(&mut self, index: usize) -> bool {
        let LoadState::Loaded(data) = &self.state else {
            return false;
        };
        match data.items.get(index) {
            Some(record) => {
                self.selected_record = Some(record.clone());
                true
            }
            None => false,
        }
    }

    /// Table contents for the current state. Empty unless loaded.
    pub fn table(&self) -> Table {
        let LoadState::Loaded(data) = &self.state else {
            return Table::default();
        };
        let rows = data
            .items
            .iter()
            .map(|record| {
                self.columns
                    .iter()
                    .map(|column| cell_text(record.get(column)))
                    .collect()
            })
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Upstream count from the last successful load; kept while a newer
    /// fetch is loading or has failed.
    pub fn count_label(&self) -> String {
        format!("{} items", self.last_count)
    }

    /// Pretty JSON for the selected record, or the placeholder.
    pub fn detail(&self) -> String {
        match &self.selected_record {
            Some(record) => serde_json::to_string_pretty(record)
                .unwrap_or_else(|_| format!("{:?}", record)),
            None => DETAIL_PLACEHOLDER.to_string(),
        }
    }

    /// Whole view as plain text: selector, queue panel, detail pane.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let selector: Vec<String> = QueueView::ALL
            .iter()
            .map(|view| {
                if *view == self.selected {
                    format!("[{}]", view.label())
                } else {
                    format!(" {} ", view.label())
                }
            })
            .collect();
        let _ = writeln!(out, "{}  (Refresh)", selector.join(" "));
        let _ = writeln!(out);
        let _ = writeln!(out, "== {} ({}) ==", self.selected.label(), self.count_label());

        match &self.state {
            LoadState::Idle => {}
            LoadState::Loading => {
                let _ = writeln!(out, "{LOADING_TEXT}");
            }
            LoadState::Errored(message) => {
                let _ = writeln!(out, "{message}");
            }
            LoadState::Loaded(_) => render_table(&mut out, &self.table()),
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "== Selected Item ==");
        let _ = writeln!(out, "{}", self.detail());
        out
    }
}

/// Union of record keys in order of first appearance.
pub fn derive_columns(items: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in items {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Display text for one cell. Strings are shown raw, absent and null are
/// blank, anything else is compact JSON.
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn render_table(out: &mut String, table: &Table) {
    if table.columns.is_empty() {
        return;
    }
    let _ = writeln!(out, "#  | {}", table.columns.join(" | "));
    for (index, row) in table.rows.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|cell| cell.replace('\n', " ")).collect();
        let _ = writeln!(out, "{index:<2} | {}", cells.join(" | "));
    }
}

/// HTTP client for the local proxy endpoints.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    http: Client,
    base_url: Url,
}

impl ProxyClient {
    pub fn new(base_url: Url) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        append_segments(&self.base_url, segments)
    }

    /// Forward a raw status payload for one item through the status proxy.
    pub async fn post_status(&self, content_id: &str, body: String) -> Result<FetchOutcome> {
        let url = self.endpoint(&["api", "extension-status", content_id])?;
        let res = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .context("failed to reach dashboard proxy")?;
        let status = res.status().as_u16();
        let body = res.text().await.context("failed to read proxy response")?;
        Ok(FetchOutcome { status, body })
    }
}

#[async_trait]
impl QueueSource for ProxyClient {
    async fn fetch_queue(&self, view: QueueView, limit: u64, offset: u64) -> Result<FetchOutcome> {
        let mut url = self.endpoint(&["api", "view", view.as_str()])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to reach dashboard proxy")?;
        let status = res.status().as_u16();
        let body = res.text().await.context("failed to read proxy response")?;
        Ok(FetchOutcome { status, body })
    }
}
