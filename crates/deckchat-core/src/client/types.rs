use serde::{Deserialize, Serialize};

use crate::models::{Slide, SlideKind};

/// Body of both chat endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, conversation_id: Option<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id,
        }
    }
}

/// Body of the export endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRequest<'a> {
    pub title: &'a str,
    pub slides: &'a [Slide],
}

/// Generated presentation file.
#[derive(Debug, Clone)]
pub struct ExportedDeck {
    pub filename: String,
    pub bytes: bytes::Bytes,
}

/// Structure echo returned by the preview endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckPreview {
    pub title: String,
    pub slide_count: usize,
    #[serde(default)]
    pub slides: Vec<SlidePreview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlidePreview {
    pub id: String,
    pub order: u32,
    pub title: String,
    pub content_type: SlideKind,
    #[serde(default)]
    pub has_chart: bool,
}
