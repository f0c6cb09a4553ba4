//! Completion marker detection over streamed agent text.

use super::keep_tail;

/// The literal the agent emits when all work is finished.
pub const COMPLETION_MARKER: &str = "<promise>COMPLETE</promise>";

/// Trailing characters kept between calls, enough to rejoin a split marker.
pub const COMPLETION_BUFFER_MAX: usize = 100;

/// Detects the completion marker, even when it is split across payloads.
///
/// Once the marker has been seen the detector stays complete until
/// [`reset`](Self::reset) is called.
#[derive(Debug, Clone, Default)]
pub struct CompletionDetector {
    buffer: String,
    complete: bool,
}

impl CompletionDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text payload.
    ///
    /// Returns `true` only on the call that first completes the marker.
    /// Later calls are no-ops returning `false`; use
    /// [`is_complete`](Self::is_complete) for the sticky state.
    pub fn process_content(&mut self, text: &str) -> bool {
        if self.complete || text.is_empty() {
            return false;
        }

        self.buffer.push_str(text);
        // Check before trimming: a long payload ending in the marker must not lose it.
        if self.buffer.contains(COMPLETION_MARKER) {
            self.complete = true;
            self.buffer.clear();
            tracing::info!("Completion marker detected");
            return true;
        }
        keep_tail(&mut self.buffer, COMPLETION_BUFFER_MAX);
        false
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.complete = false;
    }
}
