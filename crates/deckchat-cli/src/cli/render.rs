//! Plain-text rendering of replies, decks and live stream events.

use deckchat_core::client::DeckPreview;
use deckchat_core::events::StreamEvent;
use deckchat_core::models::{Message, Presentation, SlideContent};

/// Progress line for a live event, printed to stderr. `None` for events
/// that only matter once the exchange is over.
pub fn event_line(event: &StreamEvent) -> Option<String> {
    match event {
        StreamEvent::ToolStart { tool } => Some(format!("  ... {tool}")),
        StreamEvent::Presentation { presentation } => Some(format!(
            "  deck received: {} ({} slides)",
            presentation.title,
            presentation.slides.len()
        )),
        StreamEvent::PresentationUpdate { update } => {
            Some(format!("  deck updated: {}", update.slide_id))
        }
        StreamEvent::ToolEnd | StreamEvent::Final(_) | StreamEvent::Error { .. } => None,
    }
}

/// Reply text followed by numbered charts and suggestions.
pub fn reply(message: &Message) -> String {
    let mut out = message.content.trim_end().to_string();

    if !message.charts.is_empty() {
        out.push_str("\n\nCharts:");
        for (i, chart) in message.charts.iter().enumerate() {
            out.push_str(&format!(
                "\n  {}. {} ({}, {} points)",
                i + 1,
                chart.title,
                chart.chart_type,
                chart.data.len()
            ));
        }
    }

    if let Some(deck) = message.presentations.first() {
        out.push_str(&format!(
            "\n\nPresentation: {} ({} slides)",
            deck.title,
            deck.slides.len()
        ));
    }

    if !message.suggestions.is_empty() {
        out.push_str("\n\nSuggestions:");
        for (i, suggestion) in message.suggestions.iter().enumerate() {
            out.push_str(&format!("\n  {}. {suggestion}", i + 1));
        }
    }

    out
}

pub fn deck(deck: &Presentation) -> String {
    let mut out = format!("{} ({} slides)", deck.title, deck.slides.len());
    for slide in &deck.slides {
        let image = if slide.chart_image.is_some() { " [image]" } else { "" };
        out.push_str(&format!(
            "\n  {}. {} [{}] {}{}",
            slide.order, slide.title, slide.id, slide.content_type, image
        ));
        match &slide.content {
            SlideContent::Text(text) if !text.trim().is_empty() => {
                out.push_str(&format!("\n       {}", text.trim()));
            }
            SlideContent::Bullets(items) => {
                for item in items {
                    out.push_str(&format!("\n       - {item}"));
                }
            }
            _ => {}
        }
        if let Some(notes) = &slide.notes {
            out.push_str(&format!("\n       notes: {notes}"));
        }
    }
    out
}

pub fn preview(preview: &DeckPreview) -> String {
    let mut out = format!("{} ({} slides)", preview.title, preview.slide_count);
    for slide in &preview.slides {
        let chart = if slide.has_chart { " +chart" } else { "" };
        out.push_str(&format!(
            "\n  {}. {} [{}] {}{}",
            slide.order, slide.title, slide.id, slide.content_type, chart
        ));
    }
    out
}
