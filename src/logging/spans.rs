//! Span wrapper for one detection call.

use instant::Instant;
use tracing::{span, Level, Span};
use uuid::Uuid;

/// Span covering one detection call, tagged with its correlation ID.
pub struct DetectionSpan {
    span: Span,
    start_time: Instant,
    correlation_id: Uuid,
}

impl DetectionSpan {
    pub fn new(frame_size: (u32, u32), pattern_count: usize, correlation_id: Uuid) -> Self {
        let span = span!(
            Level::INFO,
            "detection",
            correlation_id = %correlation_id,
            frame_width = frame_size.0,
            frame_height = frame_size.1,
            patterns = pattern_count,
            query_keypoints = tracing::field::Empty,
            pattern_idx = tracing::field::Empty,
            found = tracing::field::Empty,
        );

        Self {
            span,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn record_query_keypoints(&self, count: usize) {
        self.span.record("query_keypoints", count);
    }

    /// Per-pattern candidate outcome, logged inside the span.
    pub fn record_candidate(&self, pattern_idx: usize, matches: usize, homography_found: bool) {
        let _enter = self.span.enter();
        tracing::debug!(pattern_idx, matches, homography_found, "pattern candidate");
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() * 1000.0
    }

    /// Record the outcome and return the total elapsed time in milliseconds.
    pub fn finish(self, pattern_idx: Option<usize>, found: bool) -> f64 {
        if let Some(idx) = pattern_idx {
            self.span.record("pattern_idx", idx);
        }
        self.span.record("found", found);

        let elapsed = self.elapsed_ms();
        let _enter = self.span.enter();
        tracing::info!(found, elapsed_ms = elapsed, "detection finished");
        elapsed
    }
}
