//! Slide deck state machine.
//!
//! Every operation is a pure transformation returning a new `Presentation`.
//! After each one, slide `order` values are exactly `1..=N` in array
//! position, `metadata.slide_count` (when present) equals N, and slide ids
//! are never handed out twice within one deck's lifetime.
//!
//! [`DeckStore`] owns the single current deck and applies these operations
//! in place.

use crate::events::{PresentationUpdate, UpdateAction};
use crate::models::{ChartDescriptor, Presentation, Slide, SlideContent, SlideKind};

const UNTITLED_DECK: &str = "Untitled Presentation";

/// Direction for [`move_slide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Editable slide fields. `None` leaves the field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlidePatch {
    pub title: Option<String>,
    pub content_type: Option<SlideKind>,
    pub content: Option<SlideContent>,
    /// An empty string removes the notes.
    pub notes: Option<String>,
}

impl SlidePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Self::default()
        }
    }
}

/// Builds a one-slide deck holding `chart`.
pub fn create_from_chart(chart: ChartDescriptor, image: Option<String>) -> Presentation {
    let title = if chart.title.trim().is_empty() {
        UNTITLED_DECK.to_string()
    } else {
        chart.title.clone()
    };
    append_chart(&Presentation::new(title), chart, image)
}

/// Appends a chart slide at the end of the deck.
pub fn append_chart(
    deck: &Presentation,
    chart: ChartDescriptor,
    image: Option<String>,
) -> Presentation {
    let mut next = deck.clone();
    let number = next_slide_number(&next);
    next.issued_slides = number;
    next.slides.push(chart_slide(number, chart, image));
    normalize(&mut next);
    next
}

/// Replaces the editable fields of `slide_id`. Unknown ids are a no-op.
pub fn update_slide(deck: &Presentation, slide_id: &str, patch: &SlidePatch) -> Presentation {
    let mut next = deck.clone();
    if let Some(slide) = next.slides.iter_mut().find(|s| s.id == slide_id) {
        if let Some(title) = &patch.title {
            slide.title.clone_from(title);
        }
        if let Some(kind) = patch.content_type {
            slide.content_type = kind;
        }
        if let Some(content) = &patch.content {
            slide.content = content.clone();
        }
        if let Some(notes) = &patch.notes {
            slide.notes = (!notes.trim().is_empty()).then(|| notes.clone());
        }
    }
    next
}

/// Removes `slide_id` and renumbers the rest, keeping their relative order.
pub fn delete_slide(deck: &Presentation, slide_id: &str) -> Presentation {
    let mut next = deck.clone();
    next.issued_slides = next_slide_number(deck) - 1;
    next.slides.retain(|s| s.id != slide_id);
    normalize(&mut next);
    next
}

/// Swaps `slide_id` with its neighbor. No-op at the deck boundary or for
/// unknown ids.
pub fn move_slide(deck: &Presentation, slide_id: &str, direction: Direction) -> Presentation {
    let mut next = deck.clone();
    let Some(index) = next.slides.iter().position(|s| s.id == slide_id) else {
        return next;
    };
    let target = match direction {
        Direction::Up if index > 0 => index - 1,
        Direction::Down if index + 1 < next.slides.len() => index + 1,
        _ => return next,
    };
    next.slides.swap(index, target);
    normalize(&mut next);
    next
}

/// Applies a streamed patch. Patches for another deck, unknown slides or
/// unknown actions are ignored.
pub fn apply_update(deck: &Presentation, update: &PresentationUpdate) -> Presentation {
    let mut next = deck.clone();
    if update.presentation_id != deck.id {
        tracing::debug!(
            deck = %deck.id,
            target = %update.presentation_id,
            "ignoring update for another deck"
        );
        return next;
    }
    let Some(slide) = next.slides.iter_mut().find(|s| s.id == update.slide_id) else {
        tracing::debug!(slide = %update.slide_id, "ignoring update for unknown slide");
        return next;
    };
    match update.action {
        UpdateAction::AddChart => {
            if let Some(chart) = &update.chart_config {
                slide.chart_config = Some(chart.clone());
                slide.content_type = SlideKind::Chart;
                // A new chart invalidates any earlier capture.
                slide.chart_image.clone_from(&update.chart_image);
            } else if update.chart_image.is_some() {
                slide.chart_image.clone_from(&update.chart_image);
            }
        }
        UpdateAction::Unknown => {
            tracing::debug!(slide = %update.slide_id, "ignoring unknown update action");
        }
    }
    next
}

fn chart_slide(number: u32, chart: ChartDescriptor, image: Option<String>) -> Slide {
    Slide {
        id: format!("slide-{number}"),
        order: number,
        title: chart.title.clone(),
        content_type: SlideKind::Chart,
        content: SlideContent::default(),
        notes: None,
        chart_config: Some(chart),
        chart_image: image,
    }
}

/// Next unused slide number: past every number issued or present in the deck.
fn next_slide_number(deck: &Presentation) -> u32 {
    let highest_present = deck
        .slides
        .iter()
        .filter_map(|s| s.id.strip_prefix("slide-")?.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    let count = u32::try_from(deck.slides.len()).unwrap_or(u32::MAX);
    deck.issued_slides.max(highest_present).max(count) + 1
}

fn normalize(deck: &mut Presentation) {
    for (index, slide) in deck.slides.iter_mut().enumerate() {
        slide.order = u32::try_from(index + 1).unwrap_or(u32::MAX);
    }
    if let Some(metadata) = deck.metadata.as_mut() {
        metadata.slide_count = deck.slides.len();
    }
}

/// Owner of the single current deck.
#[derive(Debug, Clone, Default)]
pub struct DeckStore {
    current: Option<Presentation>,
}

impl DeckStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Presentation> {
        self.current.as_ref()
    }

    /// Makes `deck` current, replacing any previous deck.
    pub fn set_current(&mut self, mut deck: Presentation) {
        normalize(&mut deck);
        tracing::debug!(deck = %deck.id, slides = deck.slides.len(), "current deck replaced");
        self.current = Some(deck);
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Adds `chart` as a new slide, creating a deck when there is none.
    pub fn add_chart(&mut self, chart: ChartDescriptor, image: Option<String>) -> &Presentation {
        let next = match self.current.take() {
            Some(deck) => append_chart(&deck, chart, image),
            None => create_from_chart(chart, image),
        };
        self.current.insert(next)
    }

    /// Returns false when there is no deck or no such slide.
    pub fn update_slide(&mut self, slide_id: &str, patch: &SlidePatch) -> bool {
        self.replace_if_has(slide_id, |deck| update_slide(deck, slide_id, patch))
    }

    pub fn delete_slide(&mut self, slide_id: &str) -> bool {
        self.replace_if_has(slide_id, |deck| delete_slide(deck, slide_id))
    }

    pub fn move_slide(&mut self, slide_id: &str, direction: Direction) -> bool {
        self.replace_if_has(slide_id, |deck| move_slide(deck, slide_id, direction))
    }

    pub fn apply_update(&mut self, update: &PresentationUpdate) {
        if let Some(deck) = self.current.as_ref() {
            let next = apply_update(deck, update);
            self.current = Some(next);
        } else {
            tracing::debug!(target_deck = %update.presentation_id, "update without a current deck");
        }
    }

    /// Copies captured images into the current deck.
    ///
    /// Only `chart_image` is written, and only on slides that still exist
    /// and still lack one, so edits made while capture was running survive.
    /// Returns how many slides received an image.
    pub fn attach_images(&mut self, deck_id: &str, captured: &[Slide]) -> usize {
        let Some(deck) = self.current.as_mut().filter(|deck| deck.id == deck_id) else {
            return 0;
        };
        let mut attached = 0;
        for source in captured {
            let Some(image) = &source.chart_image else {
                continue;
            };
            if let Some(slide) = deck
                .slides
                .iter_mut()
                .find(|s| s.id == source.id && s.chart_image.is_none())
            {
                slide.chart_image = Some(image.clone());
                attached += 1;
            }
        }
        attached
    }

    fn replace_if_has(
        &mut self,
        slide_id: &str,
        op: impl FnOnce(&Presentation) -> Presentation,
    ) -> bool {
        let Some(deck) = self.current.as_ref() else {
            return false;
        };
        if deck.slide(slide_id).is_none() {
            return false;
        }
        let next = op(deck);
        self.current = Some(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::models::ChartKind;

    fn chart(title: &str) -> ChartDescriptor {
        ChartDescriptor {
            chart_type: ChartKind::Bar,
            title: title.to_string(),
            data: Vec::new(),
            x_axis_key: "month".to_string(),
            y_axis_keys: vec!["sales".to_string()],
            colors: Vec::new(),
            config: None,
        }
    }

    fn ids(deck: &Presentation) -> Vec<&str> {
        deck.slides.iter().map(|s| s.id.as_str()).collect()
    }

    fn orders(deck: &Presentation) -> Vec<u32> {
        deck.slides.iter().map(|s| s.order).collect()
    }

    fn three_slide_deck() -> Presentation {
        let deck = create_from_chart(chart("Revenue"), None);
        let deck = append_chart(&deck, chart("Costs"), None);
        append_chart(&deck, chart("Margin"), None)
    }

    #[test]
    fn test_create_then_append() {
        let deck = create_from_chart(chart("Revenue"), None);
        let deck = append_chart(&deck, chart("Costs"), Some("aW1n".to_string()));

        assert_eq!(ids(&deck), vec!["slide-1", "slide-2"]);
        assert_eq!(orders(&deck), vec![1, 2]);
        assert_eq!(deck.slides[0].title, "Revenue");
        assert_eq!(deck.slides[1].title, "Costs");
        assert_eq!(deck.slides[1].content_type, SlideKind::Chart);
        assert_eq!(deck.slides[1].chart_image.as_deref(), Some("aW1n"));
        assert_eq!(deck.metadata.as_ref().unwrap().slide_count, 2);
    }

    #[test]
    fn test_delete_middle_slide_renumbers() {
        let deck = three_slide_deck();
        let deck = delete_slide(&deck, "slide-2");

        assert_eq!(ids(&deck), vec!["slide-1", "slide-3"]);
        assert_eq!(orders(&deck), vec![1, 2]);
        assert_eq!(deck.slides[1].title, "Margin");
    }

    #[test]
    fn test_ids_not_reused_after_deleting_last_slide() {
        let deck = three_slide_deck();
        let deck = delete_slide(&deck, "slide-3");
        let deck = append_chart(&deck, chart("Forecast"), None);

        assert_eq!(ids(&deck), vec!["slide-1", "slide-2", "slide-4"]);
        assert_eq!(orders(&deck), vec![1, 2, 3]);
    }

    #[test]
    fn test_move_is_noop_at_boundaries() {
        let deck = three_slide_deck();

        assert_eq!(move_slide(&deck, "slide-1", Direction::Up), deck);
        assert_eq!(move_slide(&deck, "slide-3", Direction::Down), deck);
        assert_eq!(move_slide(&deck, "slide-9", Direction::Down), deck);
    }

    #[test]
    fn test_move_swaps_with_neighbor() {
        let deck = three_slide_deck();
        let moved = move_slide(&deck, "slide-2", Direction::Up);

        assert_eq!(ids(&moved), vec!["slide-2", "slide-1", "slide-3"]);
        assert_eq!(orders(&moved), vec![1, 2, 3]);

        let back = move_slide(&moved, "slide-2", Direction::Down);
        assert_eq!(ids(&back), ids(&deck));
    }

    #[test]
    fn test_update_slide_touches_only_target() {
        let deck = three_slide_deck();
        let patch = SlidePatch {
            title: Some("Revenue by quarter".to_string()),
            content_type: Some(SlideKind::Bullets),
            content: Some(SlideContent::Bullets(vec!["Q1 up".into(), "Q2 flat".into()])),
            notes: Some("Mention the Q2 promo".to_string()),
        };
        let updated = update_slide(&deck, "slide-1", &patch);

        let slide = &updated.slides[0];
        assert_eq!(slide.title, "Revenue by quarter");
        assert_eq!(slide.content_type, SlideKind::Bullets);
        assert_eq!(slide.notes.as_deref(), Some("Mention the Q2 promo"));
        assert_eq!(slide.order, 1);
        assert_eq!(updated.slides[1..], deck.slides[1..]);

        let cleared = update_slide(&updated, "slide-1", &SlidePatch::notes(""));
        assert!(cleared.slides[0].notes.is_none());
    }

    #[test]
    fn test_update_unknown_slide_is_noop() {
        let deck = three_slide_deck();
        assert_eq!(update_slide(&deck, "nope", &SlidePatch::title("x")), deck);
    }

    #[test]
    fn test_apply_update_attaches_chart() {
        let deck = three_slide_deck();
        let update = PresentationUpdate {
            action: UpdateAction::AddChart,
            presentation_id: deck.id.clone(),
            slide_id: "slide-2".to_string(),
            chart_config: Some(chart("Costs by region")),
            chart_image: None,
        };
        let updated = apply_update(&deck, &update);
        assert_eq!(
            updated.slides[1].chart_config.as_ref().unwrap().title,
            "Costs by region"
        );

        let other = PresentationUpdate {
            presentation_id: "other-deck".to_string(),
            ..update
        };
        assert_eq!(apply_update(&deck, &other), deck);
    }

    #[test]
    fn test_store_adds_and_edits() {
        let mut store = DeckStore::new();
        assert!(!store.delete_slide("slide-1"));

        store.add_chart(chart("Revenue"), None);
        store.add_chart(chart("Costs"), None);
        assert!(store.move_slide("slide-2", Direction::Up));
        assert!(store.update_slide("slide-1", &SlidePatch::title("Intro")));
        assert!(!store.update_slide("slide-7", &SlidePatch::title("Nope")));

        let deck = store.current().unwrap();
        assert_eq!(ids(deck), vec!["slide-2", "slide-1"]);
        assert_eq!(deck.slides[1].title, "Intro");
    }

    #[test]
    fn test_attach_images_only_fills_missing_images() {
        let mut store = DeckStore::new();
        store.add_chart(chart("Revenue"), None);
        store.add_chart(chart("Costs"), Some("b2xk".to_string()));
        let deck_id = store.current().unwrap().id.clone();

        let mut captured = store.current().unwrap().slides.clone();
        captured[0].chart_image = Some("bmV3".to_string());
        captured[0].title = "ignored".to_string();
        captured[1].chart_image = Some("bmV3".to_string());

        assert_eq!(store.attach_images("someone-else", &captured), 0);
        assert_eq!(store.attach_images(&deck_id, &captured), 1);

        let deck = store.current().unwrap();
        assert_eq!(deck.slides[0].chart_image.as_deref(), Some("bmV3"));
        assert_eq!(deck.slides[0].title, "Revenue");
        assert_eq!(deck.slides[1].chart_image.as_deref(), Some("b2xk"));
    }

    #[test]
    fn test_set_current_normalizes_server_deck() {
        let json = r#"{
            "presentationId": "p1",
            "title": "Q3 Review",
            "slides": [
                {"id": "slide-1", "order": 4, "title": "Summary", "contentType": "bullets", "content": ["a", "b"]},
                {"id": "slide-2", "order": 9, "title": "Trend", "contentType": "chart", "content": ""}
            ],
            "metadata": {"createdAt": "x", "slideCount": 7}
        }"#;
        let deck: Presentation = serde_json::from_str(json).unwrap();
        let mut store = DeckStore::new();
        store.set_current(deck);

        let deck = store.current().unwrap();
        assert_eq!(orders(deck), vec![1, 2]);
        assert_eq!(deck.metadata.as_ref().unwrap().slide_count, 2);
        assert_eq!(
            deck.slides[0].content,
            SlideContent::Bullets(vec!["a".into(), "b".into()])
        );

        let appended = append_chart(deck, chart("Extra"), None);
        assert_eq!(appended.slides[2].id, "slide-3");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Append,
        Delete(usize),
        Move(usize, bool),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Append),
            (0usize..8).prop_map(Op::Delete),
            (0usize..8, any::<bool>()).prop_map(|(i, up)| Op::Move(i, up)),
        ]
    }

    proptest! {
        #[test]
        fn order_is_contiguous_after_any_ops(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let mut deck = create_from_chart(chart("Start"), None);
            let mut seen_ids = std::collections::HashSet::new();
            seen_ids.insert(deck.slides[0].id.clone());

            for op in ops {
                let appended = matches!(op, Op::Append);
                deck = match op {
                    Op::Append => append_chart(&deck, chart("More"), None),
                    Op::Delete(i) => match deck.slides.get(i).map(|s| s.id.clone()) {
                        Some(id) => delete_slide(&deck, &id),
                        None => deck,
                    },
                    Op::Move(i, up) => match deck.slides.get(i).map(|s| s.id.clone()) {
                        Some(id) => {
                            let dir = if up { Direction::Up } else { Direction::Down };
                            move_slide(&deck, &id, dir)
                        }
                        None => deck,
                    },
                };

                let expected: Vec<u32> = (1..=deck.slides.len() as u32).collect();
                prop_assert_eq!(orders(&deck), expected);
                prop_assert_eq!(deck.metadata.as_ref().unwrap().slide_count, deck.slides.len());

                if appended {
                    let newest = deck.slides.last().unwrap().id.clone();
                    prop_assert!(seen_ids.insert(newest));
                }
            }
        }
    }
}
