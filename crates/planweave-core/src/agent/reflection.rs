//! Completion verdicts over execution traces.
//!
//! The evaluator wraps the gateway twice over: `evaluate` judges a subtask's
//! conversation trace and yields a [`ReflectionVerdict`], `review` judges one
//! sandbox code execution and yields a [`CodeReview`]. Both verdicts are
//! Recoverable-In-Loop data -- a negative verdict drives the next retry, it
//! is never an error. A response the service could not shape into the schema
//! is fatal.

use std::sync::Arc;

use planweave_types::llm::{StructuredSpec, Usage};
use planweave_types::message::Message;
use planweave_types::sandbox::CodeThread;
use planweave_types::task::{CodeReview, ReflectionVerdict};

use crate::graph::NodeError;
use crate::llm::BoxLlmGateway;

use super::prompts::AgentPrompts;

/// Schema name for subtask reflection.
pub const REFLECTION_SCHEMA: &str = "reflection";

/// Schema name for code-execution review.
pub const CODE_REVIEW_SCHEMA: &str = "code_review";

/// Produces completion verdicts from execution traces.
pub struct ReflectionEvaluator {
    gateway: Arc<BoxLlmGateway>,
    prompts: AgentPrompts,
}

impl ReflectionEvaluator {
    pub fn new(gateway: Arc<BoxLlmGateway>) -> Self {
        Self {
            gateway,
            prompts: AgentPrompts,
        }
    }

    /// Judge a subtask's full conversation trace.
    pub async fn evaluate(
        &self,
        conversation: &[Message],
    ) -> Result<(ReflectionVerdict, Usage), NodeError> {
        let mut messages = conversation.to_vec();
        messages.push(Message::user(self.prompts.reflection_instruction()));

        let spec = StructuredSpec::of::<ReflectionVerdict>(REFLECTION_SCHEMA);
        let outcome = self.gateway.complete_structured(&messages, &spec).await?;
        let value = outcome
            .value
            .ok_or_else(|| NodeError::Parse("reflection output was not parseable".to_string()))?;
        let verdict: ReflectionVerdict = serde_json::from_value(value).map_err(|e| {
            NodeError::Parse(format!("reflection output did not match schema: {e}"))
        })?;

        tracing::debug!(completed = verdict.completed, "reflection verdict");
        Ok((verdict, outcome.usage))
    }

    /// Judge one code execution against the task request.
    pub async fn review(
        &self,
        data_info: &str,
        request: &str,
        thread: &CodeThread,
    ) -> Result<(CodeReview, Usage), NodeError> {
        let mut messages = vec![Message::assistant(thread.code.clone())];
        messages.push(Message::system(format!("stdout: {}", thread.stdout)));
        messages.push(Message::system(format!("stderr: {}", thread.stderr)));
        if let Some(error) = &thread.error {
            messages.push(Message::system(format!("error: {error}")));
        }
        messages.push(Message::user(self.prompts.code_review_user(data_info, request)));

        let spec = StructuredSpec::of::<CodeReview>(CODE_REVIEW_SCHEMA);
        let outcome = self.gateway.complete_structured(&messages, &spec).await?;
        let value = outcome
            .value
            .ok_or_else(|| NodeError::Parse("review output was not parseable".to_string()))?;
        let review: CodeReview = serde_json::from_value(value)
            .map_err(|e| NodeError::Parse(format!("review output did not match schema: {e}")))?;

        tracing::debug!(completed = review.completed, "code review verdict");
        Ok((review, outcome.usage))
    }
}
