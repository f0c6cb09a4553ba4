//! Categorization of the agent's stderr output.
//!
//! Stderr lines are matched against known transient-failure signatures so
//! the user sees something more actionable than a raw stack trace. The
//! result is advisory; it never decides whether an attempt failed.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::display::truncate;

/// Maximum characters of the raw stderr line kept in a diagnostic message.
const DIAGNOSTIC_MAX_LEN: usize = 300;

/// Category of a recognized failure signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    ConnectionRefused,
    DnsFailure,
    Timeout,
    RateLimited,
    AuthFailure,
    ServerError,
}

/// A single signature with its category and remediation hint.
#[derive(Debug, Clone)]
pub struct FailureSignature {
    category: FailureCategory,
    pattern: Regex,
    hint: String,
}

impl FailureSignature {
    /// Create a new signature.
    ///
    /// # Errors
    ///
    /// Returns `regex::Error` if the pattern is invalid.
    pub fn new(
        category: FailureCategory,
        pattern: &str,
        hint: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            category,
            pattern: Regex::new(pattern)?,
            hint: hint.into(),
        })
    }

    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }

    #[must_use]
    pub fn category(&self) -> FailureCategory {
        self.category
    }

    #[must_use]
    pub fn hint(&self) -> &str {
        &self.hint
    }
}

/// A categorized stderr line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Matched category, if any signature matched.
    pub category: Option<FailureCategory>,
    /// Display message: the hint followed by the raw line, or just the raw line.
    pub message: String,
}

/// Ordered table of failure signatures. First match wins.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticTable {
    signatures: Vec<FailureSignature>,
}

impl DiagnosticTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the built-in signatures.
    #[must_use]
    pub fn with_default_signatures() -> Self {
        let signatures = Self::default_signatures()
            .into_iter()
            .filter_map(|result| match result {
                Ok(signature) => Some(signature),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to compile default failure signature");
                    None
                }
            })
            .collect();
        Self { signatures }
    }

    pub fn add_signature(&mut self, signature: FailureSignature) {
        self.signatures.push(signature);
    }

    /// Return the first signature matching the line.
    #[must_use]
    pub fn matching(&self, line: &str) -> Option<&FailureSignature> {
        self.signatures.iter().find(|s| s.matches(line))
    }

    /// Categorize a stderr line.
    #[must_use]
    pub fn diagnose(&self, line: &str) -> Diagnostic {
        let raw = truncate(line.trim(), DIAGNOSTIC_MAX_LEN);
        match self.matching(line) {
            Some(signature) => Diagnostic {
                category: Some(signature.category()),
                message: format!("{} ({raw})", signature.hint()),
            },
            None => Diagnostic {
                category: None,
                message: raw,
            },
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    fn default_signatures() -> Vec<Result<FailureSignature, regex::Error>> {
        vec![
            FailureSignature::new(
                FailureCategory::ConnectionRefused,
                r"(?i)ECONNREFUSED|connection refused",
                "Connection refused: is the model provider reachable?",
            ),
            FailureSignature::new(
                FailureCategory::DnsFailure,
                r"(?i)ENOTFOUND|EAI_AGAIN|getaddrinfo|dns (lookup|resolution) failed|could not resolve host",
                "DNS lookup failed: check network connectivity",
            ),
            FailureSignature::new(
                FailureCategory::Timeout,
                r"(?i)ETIMEDOUT|timed out|timeout",
                "Request timed out: the provider may be slow or unreachable",
            ),
            FailureSignature::new(
                FailureCategory::RateLimited,
                r"(?i)\b429\b|rate.?limit|too many requests|overloaded",
                "Rate limited by the provider: the attempt will be retried",
            ),
            FailureSignature::new(
                FailureCategory::AuthFailure,
                r"(?i)\b40[13]\b|unauthori[sz]ed|forbidden|invalid api.?key|authentication",
                "Authentication failed: check the provider API credentials",
            ),
            FailureSignature::new(
                FailureCategory::ServerError,
                r"(?i)\b5\d\d\b|internal server error|bad gateway|service unavailable",
                "Provider server error: the attempt will be retried",
            ),
        ]
    }
}

static DEFAULT_TABLE: LazyLock<DiagnosticTable> =
    LazyLock::new(DiagnosticTable::with_default_signatures);

/// Categorize a stderr line against the built-in signature table.
#[must_use]
pub fn diagnose(line: &str) -> Diagnostic {
    DEFAULT_TABLE.diagnose(line)
}
