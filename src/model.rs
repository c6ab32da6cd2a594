//! Queue vocabulary shared by the proxy and the queue view.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One stage of the upstream content pipeline.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueueView {
    #[default]
    Ingested,
    OpportunityReview,
    DraftingQueue,
    ApprovalReview,
    ReadyToPublish,
}

impl QueueView {
    /// Every view, in selector order. The proxy validates against this list.
    pub const ALL: [QueueView; 5] = [
        QueueView::Ingested,
        QueueView::OpportunityReview,
        QueueView::DraftingQueue,
        QueueView::ApprovalReview,
        QueueView::ReadyToPublish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueView::Ingested => "ingested",
            QueueView::OpportunityReview => "opportunity_review",
            QueueView::DraftingQueue => "drafting_queue",
            QueueView::ApprovalReview => "approval_review",
            QueueView::ReadyToPublish => "ready_to_publish",
        }
    }

    /// Human label for buttons and panel titles, e.g. `Drafting Queue`.
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .map(|piece| {
                let mut chars = piece.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for QueueView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown queue view: {0}")]
pub struct UnknownQueueView(pub String);

impl FromStr for QueueView {
    type Err = UnknownQueueView;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueView::ALL
            .iter()
            .copied()
            .find(|view| view.as_str() == s)
            .ok_or_else(|| UnknownQueueView(s.to_string()))
    }
}

/// An open record as returned by the upstream service.
pub type Record = Map<String, Value>;

/// One page of a queue view.
///
/// `count` is whatever the upstream reports; it is passed through and never
/// reconciled with `items.len()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueResponse {
    pub items: Vec<Record>,
    pub limit: u64,
    pub offset: u64,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_accepts_exactly_the_known_views() {
        for view in QueueView::ALL {
            assert_eq!(view.as_str().parse::<QueueView>().unwrap(), view);
        }
        for bad in ["", "Ingested", "drafting-queue", "published", "ingested "] {
            let err = bad.parse::<QueueView>().unwrap_err();
            assert_eq!(err, UnknownQueueView(bad.to_string()));
        }
    }

    #[test]
    fn serde_names_match_path_names() {
        for view in QueueView::ALL {
            let encoded = serde_json::to_value(view).unwrap();
            assert_eq!(encoded, json!(view.as_str()));
        }
    }

    #[test]
    fn labels_are_title_cased() {
        assert_eq!(QueueView::Ingested.label(), "Ingested");
        assert_eq!(QueueView::DraftingQueue.label(), "Drafting Queue");
        assert_eq!(QueueView::ReadyToPublish.label(), "Ready To Publish");
    }

    #[test]
    fn queue_response_parses_heterogeneous_items() {
        let body = r#"{"items":[{"id":"x1","status":"new"},{"id":"x2","score":0.5,"tags":["a"]}],"limit":100,"offset":0,"count":42}"#;
        let resp: QueueResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.items.len(), 2);
        assert_eq!(resp.count, 42);
        assert_eq!(resp.items[1].get("score"), Some(&json!(0.5)));
    }
}
