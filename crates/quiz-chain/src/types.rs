//! Core data types for one challenge chain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chain::ChainState;

/// One step of a chain: the page to solve and the credentials to submit with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeTask {
    pub current_url: String,
    pub email: String,
    pub secret: String,
}

impl ChallengeTask {
    /// Create the first task of a chain.
    pub fn new(
        current_url: impl Into<String>,
        email: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            current_url: current_url.into(),
            email: email.into(),
            secret: secret.into(),
        }
    }

    /// The follow-up task for `next_url`, sharing this task's credentials.
    pub fn continuation(&self, next_url: impl Into<String>) -> Self {
        Self {
            current_url: next_url.into(),
            email: self.email.clone(),
            secret: self.secret.clone(),
        }
    }
}

/// Rendered content of a page at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Visible text, as a reader would see it.
    pub text: String,
    /// Full markup of the document.
    pub markup: String,
}

/// How a supplemental reference must be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// A data file fetched as plain text.
    RawFile,
    /// A page that has to be rendered before its text is usable.
    InteractivePage,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::RawFile => write!(f, "raw-file"),
            ReferenceKind::InteractivePage => write!(f, "interactive-page"),
        }
    }
}

/// A harvested locator worth fetching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataReference {
    /// The locator exactly as it appeared on the page (may be relative).
    pub locator: String,
    pub kind: ReferenceKind,
}

/// One fetched block of the supplemental corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusBlock {
    pub source: String,
    pub content: String,
}

/// Labeled text fetched from a page's data references, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplementalCorpus {
    blocks: Vec<CorpusBlock>,
}

impl SupplementalCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fetched block.
    pub fn push(&mut self, source: impl Into<String>, content: impl Into<String>) {
        self.blocks.push(CorpusBlock {
            source: source.into(),
            content: content.into(),
        });
    }

    pub fn blocks(&self) -> &[CorpusBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Concatenate every block between begin/end markers naming its source.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            out.push_str(&format!(
                "\n\n--- Content of {src} ---\n{body}\n--- End of {src} ---",
                src = block.source,
                body = block.content
            ));
        }
        out
    }
}

/// Structured reply of the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    #[serde(default)]
    pub submission_url: String,
    #[serde(default, alias = "python_script")]
    pub script: String,
}

/// Reply of a submission endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub correct: Option<bool>,
    #[serde(default)]
    pub reason: Option<String>,
    /// The full decoded body.
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl SubmissionResponse {
    /// Decode a response body. Any JSON document is accepted; only objects
    /// can carry the known fields.
    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        let raw: serde_json::Value = serde_json::from_str(body)?;
        let field_str = |name: &str| raw.get(name).and_then(|v| v.as_str()).map(str::to_string);

        Ok(Self {
            url: field_str("url"),
            correct: raw.get("correct").and_then(|v| v.as_bool()),
            reason: field_str("reason"),
            raw,
        })
    }

    /// The follow-up locator, if the reply names a non-empty one.
    pub fn next_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Errors that end (or, for data fetches, degrade) a chain step.
#[derive(thiserror::Error, Debug)]
pub enum ChainError {
    #[error("Scrape failed for {url}: {reason}")]
    Scrape { url: String, reason: String },

    #[error("Data fetch failed for {url}: {reason}")]
    DataFetch { url: String, reason: String },

    #[error("Reasoning service error: {0}")]
    ReasoningService(String),

    #[error("Agent protocol error: {0}")]
    AgentProtocol(String),

    #[error("Script execution failed: {0}")]
    ScriptExecution(String),

    #[error("Submission to {url} failed{}: {detail}", http_status_suffix(.status))]
    SubmissionTransport {
        url: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("Submission to {url} returned HTTP {status} with a non-JSON body: {body}")]
    SubmissionParse {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Cannot resolve '{reference}' against {base}: {reason}")]
    InvalidUrl {
        base: String,
        reference: String,
        reason: String,
    },

    #[error("Chain exceeded {limit} hops")]
    HopLimit { limit: usize },

    #[error("Chain revisited {url}")]
    CycleDetected { url: String },
}

impl ChainError {
    /// The controller state in which this error arises.
    pub fn stage(&self) -> ChainState {
        match self {
            ChainError::Scrape { .. } => ChainState::Scraping,
            ChainError::DataFetch { .. } => ChainState::Harvesting,
            ChainError::ReasoningService(_) | ChainError::AgentProtocol(_) => {
                ChainState::Reasoning
            }
            ChainError::ScriptExecution(_) => ChainState::Executing,
            ChainError::SubmissionTransport { .. } | ChainError::SubmissionParse { .. } => {
                ChainState::Submitting
            }
            ChainError::InvalidUrl { .. } => ChainState::Submitting,
            ChainError::HopLimit { .. } | ChainError::CycleDetected { .. } => {
                ChainState::Following
            }
        }
    }

    /// Whether the chain can proceed past this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChainError::DataFetch { .. })
    }
}

fn http_status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with HTTP {s}")).unwrap_or_default()
}

/// Convenience result type.
pub type ChainResult<T> = Result<T, ChainError>;

/// Shorten a payload for log lines.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
