//! Tests for agent event classification.

use ralph_supervisor::cli::{classify_record, diagnose, Classified, FailureCategory, StreamEvent};

fn event(line: &str) -> StreamEvent {
    match classify_record(line) {
        Classified::Event(event) => event,
        Classified::Warning(w) => panic!("Expected event, got warning: {w}"),
    }
}

#[test]
fn classify_nested_text_part() {
    let e = event(r#"{"type":"text","sessionID":"s1","part":{"type":"text","text":"Hello"}}"#);
    assert_eq!(e.text(), Some("Hello"));
    assert!(e.is_meaningful());
}

#[test]
fn classify_step_finish_tokens() {
    let e = event(
        r#"{"type":"step_finish","part":{"reason":"stop","cost":0.01,"tokens":{"input":100,"output":20,"reasoning":0,"cache":{"read":5,"write":0}}}}"#,
    );
    match e {
        StreamEvent::StepFinish { tokens, reason, .. } => {
            let tokens = tokens.expect("tokens present");
            assert_eq!(tokens.input, 100);
            assert_eq!(tokens.cache.read, 5);
            assert_eq!(reason.as_deref(), Some("stop"));
        }
        other => panic!("Expected StepFinish, got {other:?}"),
    }
}

#[test]
fn classify_tool_use_with_state() {
    let e = event(
        r#"{"type":"tool_use","part":{"tool":"edit","state":{"title":"src/lib.rs","input":{"path":"src/lib.rs"}}}}"#,
    );
    assert_eq!(e.tool_name(), Some("edit"));
    assert!(e.is_meaningful());
    match e {
        StreamEvent::ToolUse { title, input, .. } => {
            assert_eq!(title.as_deref(), Some("src/lib.rs"));
            assert_eq!(input.unwrap()["path"], "src/lib.rs");
        }
        other => panic!("Expected ToolUse, got {other:?}"),
    }
}

#[test]
fn classify_unknown_type_is_kept() {
    let e = event(r#"{"type":"reasoning","text":"hmm"}"#);
    assert_eq!(e.kind(), "reasoning");
    assert!(!e.is_meaningful());
}

#[test]
fn classify_rejects_bad_records() {
    for line in ["NOT-JSON", "[1,2]", r#"{"text":"no type"}"#, r#"{"type":""}"#, r#"{"type":7}"#] {
        assert!(
            matches!(classify_record(line), Classified::Warning(_)),
            "expected warning for {line}"
        );
    }
}

#[test]
fn whitespace_text_is_not_meaningful() {
    assert!(!event(r#"{"type":"text","text":"   \n"}"#).is_meaningful());
}

#[test]
fn diagnose_stderr_lines() {
    let d = diagnose("Error: connect ECONNREFUSED 127.0.0.1:443");
    assert_eq!(d.category, Some(FailureCategory::ConnectionRefused));
    assert!(d.message.contains("ECONNREFUSED"));

    let d = diagnose("HTTP 429 Too Many Requests");
    assert_eq!(d.category, Some(FailureCategory::RateLimited));

    let d = diagnose("just some debug output");
    assert_eq!(d.category, None);
    assert_eq!(d.message, "just some debug output");
}
