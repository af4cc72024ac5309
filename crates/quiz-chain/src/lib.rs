//! quiz-chain: solve chained web quiz challenges.
//!
//! A page is rendered, its data links harvested and fetched, a reasoning
//! service writes a script under a fixed contract, the script runs in a
//! sandboxed interpreter, and the answer is submitted. A reply naming a next
//! URL continues the chain.

pub mod agent;
pub mod chain;
pub mod fetch;
pub mod harvest;
pub mod http;
pub mod render;
pub mod script;
pub mod submit;
pub mod types;

pub use agent::{ContractClient, GeminiClient, ReasoningService};
pub use chain::{ChainConfig, ChainController, ChainOutcome, ChainReport, ChainState, StepRecord};
pub use fetch::SupplementalFetcher;
pub use harvest::harvest;
pub use http::HttpClient;
pub use render::{HttpRenderer, PageRenderer};
pub use script::{execute, ExecutionResult, ScriptLimits};
pub use submit::{submit_answer, SubmissionPayload};
pub use types::*;
