//! Event types from the agent's `--format json` output.
//!
//! The producer's schema is not contractually stable, so every payload field
//! is optional and unknown event types are kept rather than rejected. Fields
//! may sit at the top level of a record or be nested under `part` or
//! `properties`; both layouts are accepted. Only the fields an event kind
//! uses are parsed, so an odd value in an unrelated field never costs us the
//! event.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::display::truncate;

/// Maximum characters of a rejected record kept for display.
pub const WARNING_RAW_MAX_LEN: usize = 200;

/// Cached token counts reported by some providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTokens {
    pub read: u64,
    pub write: u64,
}

/// Token accounting for one step, or accumulated over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub reasoning: u64,
    pub cache: CacheTokens,
}

impl TokenUsage {
    /// Add another usage report into this one.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
        self.reasoning = self.reasoning.saturating_add(other.reasoning);
        self.cache.read = self.cache.read.saturating_add(other.cache.read);
        self.cache.write = self.cache.write.saturating_add(other.cache.write);
    }

    /// Input plus output tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input.saturating_add(self.output)
    }
}

/// A classified event from the agent's output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A new agent step began.
    StepStart {
        session_id: Option<String>,
    },
    /// Assistant text.
    Text {
        text: Option<String>,
    },
    /// The agent invoked a tool.
    ToolUse {
        tool: Option<String>,
        title: Option<String>,
        input: Option<serde_json::Value>,
    },
    /// A step finished, with its token accounting.
    StepFinish {
        tokens: Option<TokenUsage>,
        cost: Option<f64>,
        reason: Option<String>,
    },
    /// The agent session reported an error.
    SessionError {
        message: Option<String>,
    },
    /// The agent session went idle.
    SessionIdle {
        session_id: Option<String>,
    },
    /// A well-formed event of a type this crate does not know.
    Unknown {
        kind: String,
    },
}

impl StreamEvent {
    /// Canonical name of the event kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::StepStart { .. } => "step_start",
            Self::Text { .. } => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::StepFinish { .. } => "step_finish",
            Self::SessionError { .. } => "session_error",
            Self::SessionIdle { .. } => "session_idle",
            Self::Unknown { kind } => kind,
        }
    }

    /// Returns the text payload if this is a non-empty `Text` event.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text: Some(text) } if !text.is_empty() => Some(text),
            _ => None,
        }
    }

    /// Returns the tool name if this is a `ToolUse` event.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::ToolUse { tool, .. } => tool.as_deref(),
            _ => None,
        }
    }

    /// Whether the event carries real content: non-blank text or a named tool call.
    #[must_use]
    pub fn is_meaningful(&self) -> bool {
        match self {
            Self::Text { text } => text.as_deref().is_some_and(|t| !t.trim().is_empty()),
            Self::ToolUse { tool, .. } => tool.as_deref().is_some_and(|t| !t.is_empty()),
            _ => false,
        }
    }
}

/// A record that could not be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordWarning {
    /// Human-readable reason.
    pub reason: String,
    /// The offending record, truncated for display.
    pub raw: String,
}

impl std::fmt::Display for RecordWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.raw)
    }
}

/// Result of classifying one decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Event(StreamEvent),
    Warning(RecordWarning),
}

type FieldResult<T> = Result<Option<T>, String>;

/// Lookup over the layers of one record: `part`, then `properties`, then the
/// top level. Only the fields an event kind asks for are ever parsed.
struct Fields<'a> {
    layers: Vec<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    fn new(object: &'a Map<String, Value>) -> Self {
        let layers = ["part", "properties"]
            .iter()
            .filter_map(|key| object.get(*key).and_then(Value::as_object))
            .chain(std::iter::once(object))
            .collect();
        Self { layers }
    }

    /// First non-null value under any of `keys`, nested layers first.
    fn raw<'k>(&self, keys: &[&'k str]) -> Option<(&'k str, &'a Value)> {
        self.layers.iter().copied().find_map(|layer| {
            keys.iter()
                .find_map(|key| layer.get(*key).filter(|v| !v.is_null()).map(|v| (*key, v)))
        })
    }

    fn get<T: DeserializeOwned>(&self, keys: &[&str]) -> FieldResult<T> {
        match self.raw(keys) {
            None => Ok(None),
            Some((key, value)) => T::deserialize(value)
                .map(Some)
                .map_err(|e| format!("field `{key}`: {e}")),
        }
    }

    fn session_id(&self) -> FieldResult<String> {
        self.get(&["session_id", "sessionID", "sessionId"])
    }

    fn state_str(&self, key: &str) -> Option<String> {
        self.raw(&["state"])
            .and_then(|(_, state)| state.get(key))
            .and_then(Value::as_str)
            .map(String::from)
    }

    fn error_message(&self) -> FieldResult<String> {
        if let Some(message) = self.get::<String>(&["message"])? {
            return Ok(Some(message));
        }
        let Some((_, error)) = self.raw(&["error"]) else {
            return Ok(None);
        };
        Ok(match error {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map
                .get("data")
                .and_then(|data| data.get("message"))
                .or_else(|| map.get("message"))
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)
                .map(String::from),
            other => Some(other.to_string()),
        })
    }
}

fn warning(reason: impl Into<String>, line: &str) -> Classified {
    Classified::Warning(RecordWarning {
        reason: reason.into(),
        raw: truncate(line.trim(), WARNING_RAW_MAX_LEN),
    })
}

/// Classify one decoded record.
///
/// Never fails: malformed JSON, non-object values and records without a
/// usable `type` come back as [`Classified::Warning`].
#[must_use]
pub fn classify_record(line: &str) -> Classified {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => return warning(format!("Malformed JSON ({e})"), line),
    };

    let Some(object) = value.as_object() else {
        return warning("Record is not a JSON object", line);
    };

    let kind = match object.get("type") {
        Some(serde_json::Value::String(kind)) if !kind.trim().is_empty() => kind.trim().to_string(),
        Some(serde_json::Value::String(_)) => return warning("Record has an empty type field", line),
        Some(_) => return warning("Record type field is not a string", line),
        None => return warning("Record has no type field", line),
    };

    match build_event(&kind, &Fields::new(object)) {
        Ok(event) => Classified::Event(event),
        Err(e) => warning(format!("Malformed {kind} event ({e})"), line),
    }
}

fn normalize_kind(kind: &str) -> String {
    kind.to_ascii_lowercase().replace(['-', '.'], "_")
}

fn build_event(kind: &str, fields: &Fields<'_>) -> Result<StreamEvent, String> {
    let event = match normalize_kind(kind).as_str() {
        "step_start" => StreamEvent::StepStart {
            session_id: fields.session_id()?,
        },
        "text" => StreamEvent::Text {
            text: fields.get(&["text"])?,
        },
        "tool_use" => {
            let tool = match fields.get::<String>(&["tool"])? {
                Some(tool) => Some(tool),
                None => fields.get(&["name"])?,
            };
            let title = match fields.get::<String>(&["title"])? {
                Some(title) => Some(title),
                None => fields.state_str("title"),
            };
            let input = fields
                .raw(&["input"])
                .map(|(_, input)| input)
                .or_else(|| fields.raw(&["state"]).and_then(|(_, state)| state.get("input")))
                .cloned();
            StreamEvent::ToolUse { tool, title, input }
        }
        "step_finish" => StreamEvent::StepFinish {
            tokens: fields.get(&["tokens"])?,
            cost: fields.get(&["cost"])?,
            reason: fields.get(&["reason"])?,
        },
        "session_error" | "error" => StreamEvent::SessionError {
            message: fields.error_message()?,
        },
        "session_idle" => StreamEvent::SessionIdle {
            session_id: fields.session_id()?,
        },
        _ => StreamEvent::Unknown {
            kind: kind.to_string(),
        },
    };
    Ok(event)
}
