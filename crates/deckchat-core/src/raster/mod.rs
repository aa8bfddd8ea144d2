//! Chart rasterization for export.
//!
//! Slides that show a chart but carry no image yet are mounted into an
//! off-screen [`RenderTarget`], given a bounded settle interval, captured as
//! PNG and attached as base64. One failed capture leaves that slide without
//! an image and does not stop the batch. Mounted charts are released on every
//! path, including cancellation.

mod canvas;

use std::future::Future;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

pub use canvas::CanvasTarget;

use crate::client::{ClientError, ClientResult};
use crate::models::{ChartDescriptor, Presentation, Slide};

/// Off-screen surface charts are drawn into before capture.
pub trait RenderTarget: Send + Sync {
    /// Handle to one mounted chart.
    type Mounted: Send + Sync;

    /// Starts rendering `chart` off-screen.
    ///
    /// # Errors
    /// Returns a `Capture` error when the chart cannot be drawn.
    fn mount(&self, chart: &ChartDescriptor) -> ClientResult<Self::Mounted>;

    /// Produces PNG bytes for a mounted chart.
    fn capture(&self, mounted: &Self::Mounted) -> impl Future<Output = ClientResult<Vec<u8>>> + Send;

    /// Releases a mounted chart.
    fn unmount(&self, mounted: Self::Mounted);

    /// Resolves once everything mounted so far has finished layout.
    ///
    /// Targets without a completion signal keep the default, which never
    /// resolves, so the settle interval decides.
    fn ready(&self) -> impl Future<Output = ()> + Send {
        std::future::pending()
    }
}

/// Mounted charts for one batch, keyed by slide index. Unmounts on drop.
struct MountedBatch<'a, T: RenderTarget> {
    target: &'a T,
    entries: Vec<(usize, T::Mounted)>,
}

impl<'a, T: RenderTarget> MountedBatch<'a, T> {
    fn new(target: &'a T) -> Self {
        Self {
            target,
            entries: Vec::new(),
        }
    }
}

impl<T: RenderTarget> Drop for MountedBatch<'_, T> {
    fn drop(&mut self) {
        let count = self.entries.len();
        for (_, mounted) in self.entries.drain(..) {
            self.target.unmount(mounted);
        }
        if count > 0 {
            tracing::debug!(count, "off-screen charts released");
        }
    }
}

/// Returns `deck`'s slides with images attached where capture succeeded.
///
/// Returns without suspending when no slide needs an image.
pub async fn rasterize_deck<T: RenderTarget>(
    deck: &Presentation,
    target: &T,
    settle: Duration,
) -> Vec<Slide> {
    let mut slides = deck.slides.clone();
    let pending: Vec<usize> = slides
        .iter()
        .enumerate()
        .filter(|(_, slide)| slide.needs_capture())
        .map(|(index, _)| index)
        .collect();
    if pending.is_empty() {
        return slides;
    }

    let mut batch = MountedBatch::new(target);
    for index in pending {
        let slide = &slides[index];
        let Some(chart) = slide.chart_config.as_ref() else {
            continue;
        };
        match target.mount(chart) {
            Ok(mounted) => batch.entries.push((index, mounted)),
            Err(err) => {
                tracing::warn!(slide = %slide.id, error = %err, "chart mount failed");
            }
        }
    }

    if batch.entries.is_empty() {
        return slides;
    }

    if tokio::time::timeout(settle, target.ready()).await.is_err() {
        tracing::debug!(settle_ms = settle.as_millis(), "settle interval elapsed");
    }

    let mut captured = 0usize;
    for (index, mounted) in &batch.entries {
        let slide = &mut slides[*index];
        match target.capture(mounted).await {
            Ok(png) => {
                slide.chart_image = Some(STANDARD.encode(png));
                captured += 1;
            }
            Err(err) => {
                tracing::warn!(slide = %slide.id, error = %err, "chart capture failed");
            }
        }
    }
    let attempted = batch.entries.len();
    drop(batch);

    tracing::info!(deck = %deck.id, captured, attempted, "charts rasterized");
    slides
}

/// Rasterizes decks through one target, one batch at a time.
///
/// The target's off-screen set belongs to a single batch; a second request
/// while one is running is rejected with `ExportInFlight`.
pub struct Rasterizer<T> {
    target: T,
    settle: Duration,
    in_flight: tokio::sync::Mutex<()>,
}

impl<T: RenderTarget> Rasterizer<T> {
    pub fn new(target: T, settle: Duration) -> Self {
        Self {
            target,
            settle,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// # Errors
    /// `ExportInFlight` when another batch is still running.
    pub async fn rasterize(&self, deck: &Presentation) -> ClientResult<Vec<Slide>> {
        let _batch = self
            .in_flight
            .try_lock()
            .map_err(|_busy| ClientError::export_in_flight())?;
        Ok(rasterize_deck(deck, &self.target, self.settle).await)
    }
}
