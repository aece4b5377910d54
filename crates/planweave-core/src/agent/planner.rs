//! Structured plan generation.

use std::sync::Arc;

use planweave_types::llm::{StructuredSpec, Usage};
use planweave_types::message::Message;
use planweave_types::task::Plan;

use crate::graph::NodeError;
use crate::llm::BoxLlmGateway;

use super::prompts::AgentPrompts;

/// Schema name for plan generation.
pub const PLAN_SCHEMA: &str = "plan";

/// Turns a free-form question into an ordered subtask list via structured
/// output. A response the service could not shape into the schema is fatal.
pub struct Planner {
    gateway: Arc<BoxLlmGateway>,
    prompts: AgentPrompts,
}

impl Planner {
    pub fn new(gateway: Arc<BoxLlmGateway>) -> Self {
        Self {
            gateway,
            prompts: AgentPrompts,
        }
    }

    pub async fn create_plan(&self, question: &str) -> Result<(Plan, Usage), NodeError> {
        let conversation = vec![
            Message::system(self.prompts.planner_system()),
            Message::user(self.prompts.planner_user(question)),
        ];
        let spec = StructuredSpec::of::<Plan>(PLAN_SCHEMA);

        let outcome = self
            .gateway
            .complete_structured(&conversation, &spec)
            .await?;
        let value = outcome
            .value
            .ok_or_else(|| NodeError::Parse("plan output was not parseable".to_string()))?;
        let plan: Plan = serde_json::from_value(value)
            .map_err(|e| NodeError::Parse(format!("plan output did not match schema: {e}")))?;

        tracing::info!(subtasks = plan.subtasks.len(), "plan generated");
        Ok((plan, outcome.usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedGateway;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_plan_parses_structured_output() {
        let gateway = Arc::new(BoxLlmGateway::new(ScriptedGateway::new().push_structured(
            PLAN_SCHEMA,
            json!({"subtasks": ["find rate limits", "find size limits"]}),
        )));
        let planner = Planner::new(gateway);

        let (plan, usage) = planner.create_plan("What are the limits?").await.unwrap();
        assert_eq!(plan.subtasks.len(), 2);
        assert!(usage.input_tokens > 0);
    }

    #[tokio::test]
    async fn test_plan_not_matching_schema_is_fatal() {
        let gateway = Arc::new(BoxLlmGateway::new(
            ScriptedGateway::new().push_structured(PLAN_SCHEMA, json!({"not_subtasks": []})),
        ));
        let planner = Planner::new(gateway);

        let err = planner.create_plan("q").await.unwrap_err();
        assert!(matches!(err, NodeError::Parse(_)));
    }
}
