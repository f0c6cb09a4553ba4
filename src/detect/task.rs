//! Task progress detection over streamed agent text.
//!
//! The agent narrates what it is working on. Recognizing that phrasing lets
//! the UI show the current task without the agent having to emit any
//! structured event for it.

use std::sync::LazyLock;

use regex::Regex;

use super::keep_tail;
use crate::display::truncate;

/// Trailing characters of text kept for matching.
pub const TASK_BUFFER_MAX: usize = 500;

/// Maximum characters of a surfaced task label.
pub const TASK_LABEL_MAX_LEN: usize = 100;

const TRIM_CHARS: &[char] = &[
    '.', ',', ':', ';', '!', '?', '-', '–', '—', '"', '\'', '_', '~', '…',
];

static CHECKBOX: LazyLock<Option<Regex>> = LazyLock::new(|| match Regex::new(r"\[[ xX]?\]") {
    Ok(regex) => Some(regex),
    Err(e) => {
        tracing::warn!(error = %e, "Failed to compile checkbox pattern");
        None
    }
});

/// Turns raw matched text into a display label.
pub type Sanitizer = fn(&str) -> String;

/// A recognition pattern and the sanitizer applied to its `task` capture.
#[derive(Debug, Clone)]
pub struct TaskPattern {
    name: &'static str,
    regex: Regex,
    sanitize: Sanitizer,
}

impl TaskPattern {
    /// Create a new pattern. The regex must have a named `task` group.
    ///
    /// # Errors
    ///
    /// Returns `regex::Error` if the pattern is invalid.
    pub fn new(name: &'static str, pattern: &str, sanitize: Sanitizer) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            sanitize,
        })
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Sanitized label from the most recent match in `text`.
    #[must_use]
    pub fn detect(&self, text: &str) -> Option<String> {
        let captures = self.regex.captures_iter(text).last()?;
        let label = (self.sanitize)(captures.name("task")?.as_str());
        (!label.is_empty()).then_some(label)
    }
}

/// Strip markdown, checkboxes and surrounding punctuation, collapse
/// whitespace and bound the length.
#[must_use]
pub fn sanitize_label(raw: &str) -> String {
    let without_boxes = match CHECKBOX.as_ref() {
        Some(checkbox) => checkbox.replace_all(raw, " "),
        None => raw.into(),
    };
    let without_emphasis = without_boxes.replace("**", "").replace("__", "").replace(['*', '`'], "");
    let collapsed = without_emphasis.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c.is_whitespace() || TRIM_CHARS.contains(&c));
    truncate(trimmed, TASK_LABEL_MAX_LEN)
}

/// [`sanitize_label`], then capitalize the first letter.
#[must_use]
pub fn sanitize_sentence(raw: &str) -> String {
    let label = sanitize_label(raw);
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => label,
    }
}

fn default_patterns() -> Vec<Result<TaskPattern, regex::Error>> {
    vec![
        // "Working on: X", "**Current task:** X", "Next task - X"
        TaskPattern::new(
            "explicit",
            r"(?i)(?:^|[^\p{L}\p{N}])(?:currently\s+working\s+on|now\s+working\s+on|working\s+on|current\s+task|next\s+task|starting\s+(?:on|task))[*_]*\s*[:\-–][*_]*\s*(?P<task>[^\n]+)",
            sanitize_label,
        ),
        // "## Task 3: X", "### Step 2 - X", "# Next: X"
        TaskPattern::new(
            "heading",
            r"(?im)^\s*#{1,6}\s+(?:task|step|story|next|now)\b[^:\n\-–]*[:\-–]\s*(?P<task>[^\n]+)",
            sanitize_label,
        ),
        // "I'll now implement X.", "Let me add X"
        TaskPattern::new(
            "natural",
            r"(?i)(?:^|[^\p{L}\p{N}])(?:i'll|i\s+will|i'm\s+going\s+to|i\s+am\s+going\s+to|let\s+me|i'm\s+now|i\s+am\s+now)\s+(?:now\s+)?(?P<task>(?:implement|add|create|fix|update|write|build|refactor)(?:ing)?\b[^.!?\n]*)",
            sanitize_sentence,
        ),
    ]
}

static TASK_PATTERNS: LazyLock<Vec<TaskPattern>> = LazyLock::new(|| {
    default_patterns()
        .into_iter()
        .filter_map(|result| match result {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to compile task pattern");
                None
            }
        })
        .collect()
});

/// The built-in patterns, in priority order.
#[must_use]
pub fn task_patterns() -> &'static [TaskPattern] {
    &TASK_PATTERNS
}

/// Try each pattern in order; the first one producing a label wins.
#[must_use]
pub fn detect_task(text: &str) -> Option<String> {
    task_patterns().iter().find_map(|pattern| pattern.detect(text))
}

/// Surfaces the task the agent says it is working on.
#[derive(Debug, Clone, Default)]
pub struct TaskDetector {
    buffer: String,
    last: Option<String>,
}

impl TaskDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text payload. Returns a label only when it differs from the
    /// last one surfaced.
    pub fn process_content(&mut self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }

        self.buffer.push_str(text);
        // Payloads are glued without a separator, so a phrase that opens a
        // payload can sit flush against the previous word. Fall back to the
        // payload on its own.
        let detected = detect_task(&self.buffer).or_else(|| detect_task(text));
        keep_tail(&mut self.buffer, TASK_BUFFER_MAX);

        let task = detected?;
        if self.last.as_deref() == Some(task.as_str()) {
            self.buffer.clear();
            return None;
        }

        tracing::debug!(task = %task, "Task detected");
        self.last = Some(task.clone());
        self.buffer.clear();
        Some(task)
    }

    #[must_use]
    pub fn last_task(&self) -> Option<&str> {
        self.last.as_deref()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last = None;
    }
}
