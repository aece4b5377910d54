//! The sandbox code loop: generate code, execute it, review the result, and
//! retry until the review is positive or the retry budget is spent.
//!
//! Mirrors the subtask tool loop with nodes generate_code → execute_code →
//! generate_review → {generate_code | close}. One sandbox lease spans all
//! retries of one request and the close path releases it exactly once --
//! normal completion, forced-fallback completion, fatal abort, and
//! cancellation alike.
//!
//! A runtime error inside the sandbox is Recoverable-In-Loop: it arrives as
//! structured data on the execution record and feeds the next review cycle.

use std::sync::Arc;
use std::time::Duration;

use planweave_types::llm::{StructuredSpec, Usage};
use planweave_types::message::Message;
use planweave_types::sandbox::{CodeTaskOutcome, CodeThread};
use planweave_types::task::{fallback_answer, Program, MAX_RETRIES};

use crate::graph::{NodeContext, NodeError};
use crate::llm::BoxLlmGateway;
use crate::sandbox::{SandboxLease, SandboxLifecycleManager};

use super::prompts::AgentPrompts;
use super::reflection::ReflectionEvaluator;

/// Schema name for program generation.
pub const PROGRAM_SCHEMA: &str = "program";

/// Default sandbox idle timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(1200);

/// Default per-execution timeout.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(1200);

/// Input for one code-loop task.
#[derive(Debug, Clone)]
pub struct CodeTaskRequest {
    /// Description of the data available to the generated code.
    pub data_info: String,
    /// The task the code must satisfy.
    pub request: String,
}

/// Runs the generate/execute/review loop for one task.
pub struct CodeTaskOrchestrator {
    gateway: Arc<BoxLlmGateway>,
    sandboxes: Arc<SandboxLifecycleManager>,
    reflection: ReflectionEvaluator,
    prompts: AgentPrompts,
    max_retries: u32,
    idle_timeout: Duration,
    execution_timeout: Duration,
}

impl CodeTaskOrchestrator {
    pub fn new(gateway: Arc<BoxLlmGateway>, sandboxes: Arc<SandboxLifecycleManager>) -> Self {
        let reflection = ReflectionEvaluator::new(Arc::clone(&gateway));
        Self {
            gateway,
            sandboxes,
            reflection,
            prompts: AgentPrompts,
            max_retries: MAX_RETRIES,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeouts(mut self, idle: Duration, execution: Duration) -> Self {
        self.idle_timeout = idle;
        self.execution_timeout = execution;
        self
    }

    /// Drive one task to its terminal outcome. The lease acquired here is
    /// released on every exit path before the result propagates.
    pub async fn run(
        &self,
        ctx: &NodeContext,
        request: &CodeTaskRequest,
    ) -> Result<CodeTaskOutcome, NodeError> {
        let mut lease = self.sandboxes.acquire(self.idle_timeout).await?;
        tracing::info!(
            thread_id = ctx.thread_id(),
            branch = ctx.branch_index(),
            sandbox = lease.handle().as_str(),
            "code task started"
        );

        let outcome = self.drive(ctx, &lease, request).await;

        // The close path: exactly one release however the loop exited.
        lease.release().await;
        outcome
    }

    async fn drive(
        &self,
        ctx: &NodeContext,
        lease: &SandboxLease,
        request: &CodeTaskRequest,
    ) -> Result<CodeTaskOutcome, NodeError> {
        let mut threads: Vec<CodeThread> = Vec::new();
        let mut attempts: u32 = 0;
        let mut usage = Usage::default();

        loop {
            ctx.ensure_active()?;

            // generate_code
            let program = self
                .generate_code(request, threads.last(), &mut usage)
                .await?;

            // execute_code -- a runtime error is data for the review, not an
            // `Err`.
            let execution = lease.execute(&program.code, self.execution_timeout).await?;
            let mut thread = CodeThread {
                code: program.code,
                stdout: execution.stdout,
                stderr: execution.stderr,
                error: execution.error,
                observation: None,
                completed: false,
                results: execution.results,
            };

            // generate_review
            let (review, review_usage) = self
                .reflection
                .review(&request.data_info, &request.request, &thread)
                .await?;
            usage.absorb(review_usage);
            attempts += 1;
            thread.observation = Some(review.observation.clone());
            thread.completed = review.completed;
            threads.push(thread);

            if review.completed {
                tracing::info!(
                    thread_id = ctx.thread_id(),
                    attempts,
                    "code task completed"
                );
                return Ok(CodeTaskOutcome {
                    request: request.request.clone(),
                    completed: true,
                    attempts,
                    threads,
                    answer: review.observation,
                    usage,
                });
            }
            if attempts >= self.max_retries {
                tracing::warn!(
                    thread_id = ctx.thread_id(),
                    attempts,
                    "code task exhausted retries"
                );
                return Ok(CodeTaskOutcome {
                    request: request.request.clone(),
                    completed: false,
                    attempts,
                    threads,
                    answer: fallback_answer(&request.request),
                    usage,
                });
            }
        }
    }

    /// Generate a program; on retries the previous round's code, captured
    /// output, and review observation are fed back for self-correction.
    async fn generate_code(
        &self,
        request: &CodeTaskRequest,
        previous: Option<&CodeThread>,
        usage: &mut Usage,
    ) -> Result<Program, NodeError> {
        let mut messages = vec![
            Message::system(self.prompts.code_system(&request.data_info)),
            Message::user(self.prompts.code_task_user(&request.request)),
        ];
        if let Some(previous) = previous {
            messages.push(Message::assistant(previous.code.clone()));
            messages.push(Message::system(format!("stdout: {}", previous.stdout)));
            messages.push(Message::system(format!("stderr: {}", previous.stderr)));
            if let Some(error) = &previous.error {
                messages.push(Message::system(format!("error: {error}")));
            }
            if let Some(observation) = &previous.observation {
                messages.push(Message::user(self.prompts.code_retry_user(observation)));
            }
        }

        let spec = StructuredSpec::of::<Program>(PROGRAM_SCHEMA);
        let outcome = self.gateway.complete_structured(&messages, &spec).await?;
        usage.absorb(outcome.usage);
        let value = outcome
            .value
            .ok_or_else(|| NodeError::Parse("program output was not parseable".to_string()))?;
        serde_json::from_value(value)
            .map_err(|e| NodeError::Parse(format!("program output did not match schema: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
