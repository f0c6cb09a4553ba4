//! Colored CLI display for loop progress.
//!
//! [`ConsoleObserver`] prints iteration banners, agent output, task changes
//! and the final status to the terminal.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::cli::TokenUsage;
use crate::supervisor::{OutputKind, OutputLine, RunObserver, RunState, RunSummary};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length of a single displayed output line.
const OUTPUT_MAX_LEN: usize = 500;

/// Truncate a string to at most `max_len` characters, adding an ellipsis if
/// truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

/// Format token usage for display.
#[must_use]
pub fn format_tokens(usage: &TokenUsage) -> String {
    let mut out = format!("in={} out={}", usage.input, usage.output);
    if usage.reasoning > 0 {
        out.push_str(&format!(" reasoning={}", usage.reasoning));
    }
    if usage.cache.read > 0 || usage.cache.write > 0 {
        out.push_str(&format!(" cache={}/{}", usage.cache.read, usage.cache.write));
    }
    out
}

/// Prints run progress to stdout.
///
/// Warnings and token updates are shown only in verbose mode. Errors are
/// always shown.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleObserver {
    verbose: bool,
}

impl ConsoleObserver {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl RunObserver for ConsoleObserver {
    fn on_iteration(&self, iteration: u32, total: u32) {
        println!(
            "{} {} {}/{}",
            timestamp().dimmed(),
            "[ITERATION]".blue().bold(),
            iteration,
            total
        );
        let _ = io::stdout().flush();
    }

    fn on_tokens(&self, usage: &TokenUsage) {
        if !self.verbose {
            return;
        }
        println!(
            "{} {} {}",
            timestamp().dimmed(),
            "[TOKENS]".magenta().bold(),
            format_tokens(usage).dimmed()
        );
        let _ = io::stdout().flush();
    }

    fn on_task(&self, task: &str) {
        println!(
            "{} {} {}",
            timestamp().dimmed(),
            "[TASK]".cyan().bold(),
            task.bold()
        );
        let _ = io::stdout().flush();
    }

    fn on_output(&self, line: &OutputLine) {
        let text = truncate(line.text.trim_end(), OUTPUT_MAX_LEN);
        match line.kind {
            OutputKind::Text => print!("{}", line.text),
            OutputKind::Tool => println!("{} {}", "[TOOL]".cyan().bold(), text.dimmed()),
            OutputKind::Info => println!("{} {}", "[INFO]".green().bold(), text),
            OutputKind::Warning if self.verbose => {
                println!("{} {}", "[WARN]".yellow().bold(), text.yellow());
            }
            OutputKind::Warning => {}
            OutputKind::Error => print_error(&text),
        }
        let _ = io::stdout().flush();
    }

    fn on_status(&self, state: RunState, message: Option<&str>) {
        let ts = timestamp();
        let label = format!("[{}]", state.to_string().to_uppercase());
        let message = message.unwrap_or_default();
        match state {
            RunState::Complete => println!("{} {} {}", ts.dimmed(), label.green().bold(), message),
            RunState::Failed => println!("{} {} {}", ts.dimmed(), label.red().bold(), message.red()),
            RunState::Cancelled => {
                println!("{} {} {}", ts.dimmed(), label.yellow().bold(), message);
            }
            RunState::Idle | RunState::Running => {
                println!("{} {} {}", ts.dimmed(), label.blue().bold(), message);
            }
        }
        let _ = io::stdout().flush();
    }

    fn on_retry(&self, retry: u32, max: u32) {
        if retry == 0 {
            return;
        }
        println!(
            "{} {} attempt {} of {}",
            timestamp().dimmed(),
            "[RETRY]".yellow().bold(),
            retry,
            max
        );
        let _ = io::stdout().flush();
    }
}

/// Print an error message.
pub fn print_error(message: &str) {
    println!("{} {}", "[ERROR]".red().bold(), message);
    let _ = io::stdout().flush();
}

/// Print the end-of-run summary.
pub fn print_summary(summary: &RunSummary) {
    let state = summary.state.to_string();
    let state = match summary.state {
        RunState::Complete => state.green().bold().to_string(),
        RunState::Cancelled => state.yellow().bold().to_string(),
        _ => state.red().bold().to_string(),
    };
    println!(
        "{} {} state={} iterations={} retries={} tokens={}",
        timestamp().dimmed(),
        "[SUMMARY]".blue().bold(),
        state,
        summary.iterations_run,
        summary.retries,
        summary.tokens.total()
    );
    if let Some(reason) = &summary.reason {
        println!("{} {}", "[REASON]".dimmed(), reason);
    }
    let _ = io::stdout().flush();
}
