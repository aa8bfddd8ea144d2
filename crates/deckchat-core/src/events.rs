//! Stream event types decoded from the chat stream.
//!
//! Each SSE record carries one JSON object tagged by `type`. The set is
//! closed: unknown types fail to decode and are dropped by the codec.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ChartDescriptor, Presentation};

/// Events emitted by the analytics agent during one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// An agent tool started running.
    ToolStart { tool: String },

    /// The running tool finished.
    ToolEnd,

    /// Full deck snapshot for eager preview.
    Presentation { presentation: Presentation },

    /// Incremental patch against a deck.
    PresentationUpdate {
        #[serde(rename = "presentationUpdate")]
        update: PresentationUpdate,
    },

    /// Terminal event carrying the complete assistant turn.
    Final(FinalResponse),

    /// Terminal event carrying an agent-side failure.
    Error { message: String },
}

impl StreamEvent {
    /// Returns true for events that end an exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Final(_) | StreamEvent::Error { .. })
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::ToolStart { .. } => "tool_start",
            StreamEvent::ToolEnd => "tool_end",
            StreamEvent::Presentation { .. } => "presentation",
            StreamEvent::PresentationUpdate { .. } => "presentation_update",
            StreamEvent::Final(_) => "final",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// Actions understood in `presentation_update` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    AddChart,
    #[serde(other)]
    Unknown,
}

/// Patch for one slide of one deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationUpdate {
    pub action: UpdateAction,
    pub presentation_id: String,
    pub slide_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_config: Option<ChartDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_image: Option<String>,
}

/// Complete assistant turn, shared by the `final` event and the
/// non-streaming chat endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "FinalWire")]
pub struct FinalResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub response: String,
    pub charts: Vec<ChartDescriptor>,
    pub presentations: Vec<Presentation>,
    pub suggestions: Vec<String>,
}

/// Lenient wire shape: accepts `presentation` or `presentations`, and drops
/// individual charts or decks that fail to parse instead of the whole event.
#[derive(Deserialize)]
struct FinalWire {
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    charts: Vec<Value>,
    #[serde(default)]
    presentations: Vec<Value>,
    #[serde(default)]
    presentation: Option<Value>,
    #[serde(default)]
    suggestions: Vec<String>,
}

impl From<FinalWire> for FinalResponse {
    fn from(wire: FinalWire) -> Self {
        let charts = wire
            .charts
            .into_iter()
            .filter_map(|value| parse_lenient::<ChartDescriptor>(value, "chart"))
            .collect();
        let presentations = wire
            .presentations
            .into_iter()
            .chain(wire.presentation.filter(|v| !v.is_null()))
            .filter_map(|value| parse_lenient::<Presentation>(value, "presentation"))
            .collect();
        Self {
            conversation_id: wire.conversation_id.filter(|id| !id.is_empty()),
            response: wire.response,
            charts,
            presentations,
            suggestions: wire.suggestions,
        }
    }
}

fn parse_lenient<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::debug!(error = %err, "dropping malformed {what} in final response");
            None
        }
    }
}
