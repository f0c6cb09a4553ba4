//! Per-iteration event processing: decode, classify, detect, report.

use crate::cli::{classify_record, Classified, StreamDecoder, StreamEvent, TokenUsage};
use crate::detect::{CompletionDetector, TaskDetector};
use crate::display::truncate;
use crate::supervisor::{OutputLine, RunObserver};

/// Longest tool title shown in an output line.
const TOOL_TITLE_MAX_LEN: usize = 80;

/// State that spans every iteration of a run.
#[derive(Debug, Default)]
struct RunTally {
    completion: CompletionDetector,
    tokens: TokenUsage,
}

/// Turns raw stdout bytes into observer callbacks.
///
/// Decoder and task state are per iteration; the completion detector and
/// token totals are per run and only reset by [`begin_run`](Self::begin_run).
#[derive(Debug, Default)]
pub struct EventPipeline {
    decoder: StreamDecoder,
    task: TaskDetector,
    tally: RunTally,
    events_seen: u32,
    meaningful_events: u32,
    warnings: u32,
}

impl EventPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset everything, including run-scoped state.
    pub fn begin_run(&mut self) {
        *self = Self::default();
    }

    /// Reset per-iteration state.
    pub fn begin_iteration(&mut self) {
        self.decoder.reset();
        self.task.reset();
        self.events_seen = 0;
        self.meaningful_events = 0;
        self.warnings = 0;
    }

    /// Feed a chunk of stdout.
    pub fn feed(&mut self, chunk: &[u8], observer: &dyn RunObserver) {
        for record in self.decoder.push(chunk) {
            self.handle_record(&record, observer);
        }
    }

    /// Handle any unterminated trailing record once stdout has closed.
    pub fn finish(&mut self, observer: &dyn RunObserver) {
        if let Some(record) = self.decoder.flush() {
            self.handle_record(&record, observer);
        }
    }

    fn handle_record(&mut self, record: &str, observer: &dyn RunObserver) {
        observer.log_raw_line(record);

        match classify_record(record) {
            Classified::Warning(warning) => {
                self.warnings = self.warnings.saturating_add(1);
                tracing::debug!(reason = %warning.reason, "Skipping agent output record");
                observer.on_output(&OutputLine::warning(warning.to_string()));
            }
            Classified::Event(event) => {
                self.events_seen = self.events_seen.saturating_add(1);
                if event.is_meaningful() {
                    self.meaningful_events = self.meaningful_events.saturating_add(1);
                }
                observer.log_event(record, &event);
                self.dispatch(event, observer);
            }
        }
    }

    fn dispatch(&mut self, event: StreamEvent, observer: &dyn RunObserver) {
        match event {
            StreamEvent::Text { text: Some(text) } if !text.is_empty() => {
                observer.on_output(&OutputLine::text(text.as_str()));
                if let Some(task) = self.task.process_content(&text) {
                    tracing::info!(task = %task, "Agent task changed");
                    observer.on_task(&task);
                }
                if self.tally.completion.process_content(&text) {
                    tracing::info!("Completion marker detected");
                    observer.on_output(&OutputLine::info("Completion marker detected"));
                }
            }
            StreamEvent::ToolUse { tool, title, .. } => {
                let tool = tool.unwrap_or_else(|| "tool".to_string());
                let line = match title.filter(|t| !t.trim().is_empty()) {
                    Some(title) => {
                        format!("{tool}: {}", truncate(title.trim(), TOOL_TITLE_MAX_LEN))
                    }
                    None => tool,
                };
                observer.on_output(&OutputLine::tool(line));
            }
            StreamEvent::StepFinish { tokens, cost, .. } => {
                if let Some(tokens) = tokens {
                    self.tally.tokens.accumulate(&tokens);
                    tracing::debug!(
                        input = self.tally.tokens.input,
                        output = self.tally.tokens.output,
                        ?cost,
                        "Token usage updated"
                    );
                    observer.on_tokens(&self.tally.tokens);
                }
            }
            StreamEvent::SessionError { message } => {
                let message = message.unwrap_or_else(|| "Agent session error".to_string());
                tracing::warn!(error = %message, "Agent reported an error");
                observer.on_output(&OutputLine::error(message));
            }
            other => {
                tracing::debug!(kind = other.kind(), "Ignoring agent event");
            }
        }
    }

    /// Whether the completion marker has been seen this run.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tally.completion.is_complete()
    }

    /// Tokens accumulated over the run.
    #[must_use]
    pub fn tokens(&self) -> TokenUsage {
        self.tally.tokens
    }

    #[must_use]
    pub fn events_seen(&self) -> u32 {
        self.events_seen
    }

    #[must_use]
    pub fn meaningful_events(&self) -> u32 {
        self.meaningful_events
    }

    /// Records rejected this iteration.
    #[must_use]
    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    #[must_use]
    pub fn current_task(&self) -> Option<&str> {
        self.task.last_task()
    }
}
