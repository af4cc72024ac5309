//! Chain controller.
//!
//! One step runs `Scraping → Harvesting → Reasoning → Executing →
//! Submitting → Following`. [`ChainController::run`] loops over steps until
//! a submission reply stops naming a next URL, a step fails, or one of the
//! guards trips: at most `max_hops` steps, and no URL solved twice.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::{ContractClient, ReasoningService};
use crate::fetch::{resolve, SupplementalFetcher};
use crate::harvest::harvest;
use crate::http::{HttpClient, DEFAULT_TIMEOUT};
use crate::render::PageRenderer;
use crate::script::{execute, ExecutionResult, ScriptLimits};
use crate::submit::{submit_answer, SubmissionPayload};
use crate::types::{truncate, ChainError, ChainResult, ChallengeTask};

/// Default bound on the number of steps in one chain.
pub const DEFAULT_MAX_HOPS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    Scraping,
    Harvesting,
    Reasoning,
    Executing,
    Submitting,
    Following,
    Complete,
    Failed,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainState::Scraping => "scraping",
            ChainState::Harvesting => "harvesting",
            ChainState::Reasoning => "reasoning",
            ChainState::Executing => "executing",
            ChainState::Submitting => "submitting",
            ChainState::Following => "following",
            ChainState::Complete => "complete",
            ChainState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Controller settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub max_hops: usize,
    /// Timeout for data fetches and submissions.
    pub http_timeout: Duration,
    pub script_limits: ScriptLimits,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            http_timeout: DEFAULT_TIMEOUT,
            script_limits: ScriptLimits::default(),
        }
    }
}

/// What one solved step did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// The challenge page.
    pub url: String,
    /// Resolved submission endpoint.
    pub submission_url: String,
    pub answer: serde_json::Value,
    pub correct: Option<bool>,
    pub reason: Option<String>,
    /// Resolved follow-up URL, if the reply named one.
    pub next_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainOutcome {
    Complete,
    Failed { stage: ChainState, error: String },
}

/// Every step taken and how the chain ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReport {
    pub steps: Vec<StepRecord>,
    pub outcome: ChainOutcome,
}

impl ChainReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == ChainOutcome::Complete
    }
}

/// Drives challenge chains. Holds no per-chain state, so one controller can
/// run any number of chains concurrently.
pub struct ChainController {
    config: ChainConfig,
    http: HttpClient,
    renderer: Arc<dyn PageRenderer>,
    fetcher: SupplementalFetcher,
    agent: ContractClient,
}

impl ChainController {
    pub fn new(
        config: ChainConfig,
        renderer: Arc<dyn PageRenderer>,
        reasoner: Arc<dyn ReasoningService>,
    ) -> Self {
        let http = HttpClient::new(config.http_timeout);
        let fetcher = SupplementalFetcher::new(http.clone(), renderer.clone());
        Self {
            config,
            http,
            renderer,
            fetcher,
            agent: ContractClient::new(reasoner),
        }
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Run a chain from `task` until it completes or fails.
    pub async fn run(&self, task: ChallengeTask) -> ChainReport {
        tracing::info!(url = %task.current_url, "Starting chain");

        let mut steps: Vec<StepRecord> = Vec::new();
        let mut visited = HashSet::new();
        let mut pending = Some(task);

        while let Some(task) = pending.take() {
            if steps.len() >= self.config.max_hops {
                return Self::failed(
                    steps,
                    ChainError::HopLimit {
                        limit: self.config.max_hops,
                    },
                );
            }
            if !visited.insert(task.current_url.clone()) {
                return Self::failed(
                    steps,
                    ChainError::CycleDetected {
                        url: task.current_url,
                    },
                );
            }

            match self.solve_step(&task).await {
                Ok(step) => {
                    if let Some(next) = &step.next_url {
                        tracing::info!(state = %ChainState::Following, next = %next, "Following to next challenge");
                        pending = Some(task.continuation(next.clone()));
                    }
                    steps.push(step);
                }
                Err(e) => return Self::failed(steps, e),
            }
        }

        tracing::info!(state = %ChainState::Complete, steps = steps.len(), "Chain complete");
        ChainReport {
            steps,
            outcome: ChainOutcome::Complete,
        }
    }

    fn failed(steps: Vec<StepRecord>, error: ChainError) -> ChainReport {
        let stage = error.stage();
        tracing::error!(state = %ChainState::Failed, stage = %stage, steps = steps.len(), "{error}");
        ChainReport {
            steps,
            outcome: ChainOutcome::Failed {
                stage,
                error: error.to_string(),
            },
        }
    }

    /// Solve, execute and submit one challenge.
    pub async fn solve_step(&self, task: &ChallengeTask) -> ChainResult<StepRecord> {
        let url = task.current_url.as_str();

        tracing::info!(state = %ChainState::Scraping, url, "Scraping challenge page");
        let page = self
            .renderer
            .render(url)
            .await
            .map_err(|e| ChainError::Scrape {
                url: url.to_string(),
                reason: format!("{e:#}"),
            })?;

        tracing::info!(state = %ChainState::Harvesting, url, "Harvesting data links");
        let refs = harvest(&page);
        let corpus = self.fetcher.fetch_all(url, &refs).await;
        tracing::debug!(links = refs.len(), fetched = corpus.len(), "Supplemental corpus ready");

        tracing::info!(state = %ChainState::Reasoning, url, "Requesting script");
        let reply = self.agent.request_reply(&page.text, &corpus).await?;

        tracing::info!(state = %ChainState::Executing, url, "Executing script");
        let answer = self.run_script(&reply.script).await?;
        tracing::info!(answer = %truncate(&answer.to_string(), 300), "Script produced an answer");

        tracing::info!(state = %ChainState::Submitting, url, "Submitting");
        let endpoint = resolve(url, &reply.submission_url)?;
        let payload = SubmissionPayload {
            email: task.email.clone(),
            secret: task.secret.clone(),
            url: url.to_string(),
            answer: answer.clone(),
        };
        let response = submit_answer(&self.http, &endpoint, &payload).await?;
        tracing::info!(
            correct = ?response.correct,
            reason = response.reason.as_deref().unwrap_or(""),
            "Submission accepted"
        );

        let next_url = match response.next_url() {
            Some(next) => Some(resolve(&endpoint, next)?),
            None => None,
        };

        Ok(StepRecord {
            url: url.to_string(),
            submission_url: endpoint,
            answer,
            correct: response.correct,
            reason: response.reason,
            next_url,
        })
    }

    /// Interpret the script on the blocking pool; it is CPU-bound and
    /// bounded only by its step budget.
    async fn run_script(&self, script: &str) -> ChainResult<serde_json::Value> {
        let limits = self.config.script_limits;
        let source = script.to_string();
        let result = tokio::task::spawn_blocking(move || execute(&source, &limits))
            .await
            .map_err(|e| ChainError::ScriptExecution(format!("executor task failed: {e}")))?;

        match result {
            ExecutionResult::Answer(answer) => Ok(answer),
            ExecutionResult::Failure { diagnostic } => {
                tracing::warn!(script = %truncate(script, 300), "Script produced no answer");
                Err(ChainError::ScriptExecution(diagnostic))
            }
        }
    }
}
