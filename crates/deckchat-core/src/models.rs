//! Conversation, chart and deck data model.
//!
//! Field names follow the wire format used by the analytics server
//! (`camelCase` for chart and deck payloads).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Palette used when a chart carries no colors of its own.
pub const DEFAULT_PALETTE: [&str; 5] = ["#8884d8", "#82ca9d", "#ffc658", "#ff7300", "#0088fe"];

/// One data row of a chart: field name to value.
pub type Record = Map<String, Value>;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One conversation turn. Never mutated after it is appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presentations: Vec<Presentation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl Message {
    /// Creates a message with a fresh id and the current timestamp.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            charts: Vec::new(),
            presentations: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Supported chart kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Pie,
    Area,
    Scatter,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartKind::Line => "line",
            ChartKind::Bar => "bar",
            ChartKind::Pie => "pie",
            ChartKind::Area => "area",
            ChartKind::Scatter => "scatter",
        };
        f.write_str(name)
    }
}

/// Display toggles carried alongside a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChartOptions {
    pub responsive: bool,
    pub maintain_aspect_ratio: bool,
    pub legend: bool,
    pub tooltip: bool,
    pub grid: bool,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            responsive: true,
            maintain_aspect_ratio: true,
            legend: true,
            tooltip: true,
            grid: true,
        }
    }
}

/// Rendering-agnostic chart description.
///
/// Records are expected to carry `x_axis_key` and every entry of
/// `y_axis_keys`; missing values are skipped when drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDescriptor {
    pub chart_type: ChartKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub data: Vec<Record>,
    pub x_axis_key: String,
    #[serde(deserialize_with = "non_empty_keys")]
    pub y_axis_keys: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ChartOptions>,
}

fn non_empty_keys<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let keys = Vec::<String>::deserialize(deserializer)?;
    if keys.is_empty() {
        return Err(serde::de::Error::custom("yAxisKeys must not be empty"));
    }
    Ok(keys)
}

impl ChartDescriptor {
    /// Returns the color for series `index`, cycling through the palette.
    pub fn series_color(&self, index: usize) -> &str {
        if self.colors.is_empty() {
            DEFAULT_PALETTE[index % DEFAULT_PALETTE.len()]
        } else {
            &self.colors[index % self.colors.len()]
        }
    }

    pub fn options(&self) -> ChartOptions {
        self.config.unwrap_or_default()
    }

    /// Numeric value of `key` in `record`. Numeric strings are accepted.
    pub fn value(record: &Record, key: &str) -> Option<f64> {
        match record.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Category label of `record` on the x axis.
    pub fn label(&self, record: &Record) -> String {
        match record.get(&self.x_axis_key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

/// What a slide displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideKind {
    #[default]
    Text,
    Bullets,
    Chart,
    #[serde(other)]
    Mixed,
}

impl fmt::Display for SlideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlideKind::Text => "text",
            SlideKind::Bullets => "bullets",
            SlideKind::Chart => "chart",
            SlideKind::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

/// Slide body. The shape depends on the slide kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlideContent {
    Text(String),
    Bullets(Vec<String>),
    /// Anything else the agent put there (kept verbatim for export).
    Other(Value),
}

impl Default for SlideContent {
    fn default() -> Self {
        SlideContent::Text(String::new())
    }
}

/// One deck page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub id: String,
    pub order: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content_type: SlideKind,
    #[serde(default)]
    pub content: SlideContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_config: Option<ChartDescriptor>,
    /// Base64-encoded PNG, present only after capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_image: Option<String>,
}

impl Slide {
    /// Whether the rasterizer has work to do for this slide.
    pub fn needs_capture(&self) -> bool {
        self.content_type == SlideKind::Chart
            && self.chart_config.is_some()
            && self.chart_image.is_none()
    }
}

/// Informational deck metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub slide_count: usize,
}

/// A slide deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    #[serde(
        rename = "presentationId",
        alias = "id",
        default = "new_presentation_id"
    )]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slides: Vec<Slide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PresentationMetadata>,
    /// Highest slide number handed out during this deck's lifetime.
    #[serde(skip)]
    pub(crate) issued_slides: u32,
}

fn new_presentation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Presentation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_presentation_id(),
            title: title.into(),
            slides: Vec::new(),
            metadata: Some(PresentationMetadata {
                created_at: Some(Utc::now().to_rfc3339()),
                slide_count: 0,
            }),
            issued_slides: 0,
        }
    }

    pub fn slide(&self, slide_id: &str) -> Option<&Slide> {
        self.slides.iter().find(|s| s.id == slide_id)
    }
}
