//! The per-subtask inner loop: select tools, invoke them, draft an answer,
//! reflect, and retry until the verdict is positive or the retry budget is
//! spent.
//!
//! The loop is an explicit finite state table over [`SubtaskPhase`] -- never
//! recursion -- so stack depth and memory stay bounded regardless of retry
//! count. One pass increments the attempt counter exactly once (in the
//! reflect phase); the loop is terminal when the verdict is positive or the
//! counter reaches the retry budget, in which case the answer is forced to
//! the deterministic fallback.
//!
//! On a retry pass the prior conversation is replayed with all tool traffic
//! stripped (tool-result messages and the assistant messages that requested
//! them), bounding context growth, and the previous reflection's advice is
//! appended as a fresh instruction.

use std::sync::Arc;

use planweave_types::llm::Usage;
use planweave_types::message::Message;
use planweave_types::task::{fallback_answer, ReflectionVerdict, SubtaskOutcome, ToolResult, MAX_RETRIES};
use planweave_types::tool::{ToolCall, ToolError};

use crate::graph::{NodeContext, NodeError};
use crate::llm::BoxLlmGateway;
use crate::tool::ToolRegistry;

use super::prompts::AgentPrompts;
use super::reflection::ReflectionEvaluator;

/// Input for one subtask branch.
#[derive(Debug, Clone)]
pub struct SubtaskRequest {
    /// The overall question the plan answers.
    pub question: String,
    /// The full plan, for context in the first prompt.
    pub plan: Vec<String>,
    /// This branch's subtask goal.
    pub subtask: String,
    /// Position in the plan; carried into the outcome for index-stable
    /// aggregation.
    pub branch_index: usize,
}

/// Phases of the inner state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubtaskPhase {
    SelectTool,
    InvokeTool,
    DraftAnswer,
    Reflect,
}

/// Runs the select/invoke/draft/reflect loop for one subtask.
pub struct SubtaskOrchestrator {
    gateway: Arc<BoxLlmGateway>,
    registry: Arc<ToolRegistry>,
    reflection: ReflectionEvaluator,
    prompts: AgentPrompts,
    max_retries: u32,
}

impl SubtaskOrchestrator {
    pub fn new(gateway: Arc<BoxLlmGateway>, registry: Arc<ToolRegistry>) -> Self {
        let reflection = ReflectionEvaluator::new(Arc::clone(&gateway));
        Self {
            gateway,
            registry,
            reflection,
            prompts: AgentPrompts,
            max_retries: MAX_RETRIES,
        }
    }

    /// Override the retry budget (tests mostly).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Drive one subtask to its terminal outcome.
    ///
    /// Gateway failures and tool failures (including an unresolved tool
    /// name) are fatal for the branch; only a negative reflection verdict
    /// loops.
    pub async fn run(
        &self,
        ctx: &NodeContext,
        request: &SubtaskRequest,
    ) -> Result<SubtaskOutcome, NodeError> {
        let descriptors = self.registry.descriptors();

        let mut conversation: Vec<Message> = Vec::new();
        let mut pending_calls: Vec<ToolCall> = Vec::new();
        let mut tool_results: Vec<Vec<ToolResult>> = Vec::new();
        let mut reflections: Vec<ReflectionVerdict> = Vec::new();
        let mut attempts: u32 = 0;
        let mut completed = false;
        let mut answer = String::new();
        let mut usage = Usage::default();
        let mut phase = SubtaskPhase::SelectTool;

        tracing::info!(
            thread_id = ctx.thread_id(),
            branch = ctx.branch_index(),
            subtask = request.subtask.as_str(),
            "subtask started"
        );

        loop {
            ctx.ensure_active()?;
            match phase {
                SubtaskPhase::SelectTool => {
                    if attempts == 0 {
                        conversation = vec![
                            Message::system(self.prompts.subtask_system()),
                            Message::user(self.prompts.tool_selection_user(
                                &request.question,
                                &request.plan,
                                &request.subtask,
                            )),
                        ];
                    } else {
                        let advice = reflections
                            .last()
                            .map(|verdict| verdict.advice.clone())
                            .unwrap_or_default();
                        conversation.retain(|message| !message.is_tool_traffic());
                        conversation.push(Message::user(self.prompts.retry_instruction(&advice)));
                    }

                    let outcome = self.gateway.complete(&conversation, &descriptors).await?;
                    usage.absorb(outcome.usage);

                    if outcome.tool_calls.is_empty() {
                        if let Some(text) = &outcome.content {
                            conversation.push(Message::assistant(text.clone()));
                        }
                    } else {
                        conversation
                            .push(Message::assistant_tool_calls(outcome.tool_calls.clone()));
                    }
                    pending_calls = outcome.tool_calls;
                    phase = SubtaskPhase::InvokeTool;
                }

                SubtaskPhase::InvokeTool => {
                    let mut round: Vec<ToolResult> = Vec::new();
                    for call in pending_calls.drain(..) {
                        let tool = self.registry.resolve(&call.name)?;
                        let args: serde_json::Value = serde_json::from_str(&call.arguments)
                            .map_err(|e| ToolError::InvalidArguments {
                                tool: call.name.clone(),
                                message: e.to_string(),
                            })?;

                        tracing::debug!(
                            branch = ctx.branch_index(),
                            tool = call.name.as_str(),
                            "invoking tool"
                        );
                        let results = tool.invoke(args).await?;

                        let payload = serde_json::to_string(&results)
                            .map_err(|e| NodeError::Parse(e.to_string()))?;
                        conversation.push(Message::tool_result(&call.id, payload));
                        round.push(ToolResult {
                            tool_name: call.name,
                            arguments: call.arguments,
                            results,
                        });
                    }
                    tool_results.push(round);
                    phase = SubtaskPhase::DraftAnswer;
                }

                SubtaskPhase::DraftAnswer => {
                    let outcome = self.gateway.complete(&conversation, &[]).await?;
                    usage.absorb(outcome.usage);
                    answer = outcome.content.unwrap_or_default();
                    conversation.push(Message::assistant(answer.clone()));
                    phase = SubtaskPhase::Reflect;
                }

                SubtaskPhase::Reflect => {
                    let (verdict, reflect_usage) =
                        self.reflection.evaluate(&conversation).await?;
                    usage.absorb(reflect_usage);

                    let verdict_json = serde_json::to_string(&verdict)
                        .map_err(|e| NodeError::Parse(e.to_string()))?;
                    conversation.push(Message::assistant(verdict_json));

                    attempts += 1;
                    completed = verdict.completed;
                    reflections.push(verdict);

                    if attempts >= self.max_retries && !completed {
                        answer = fallback_answer(&request.subtask);
                    }
                    if completed || attempts >= self.max_retries {
                        break;
                    }
                    phase = SubtaskPhase::SelectTool;
                }
            }
        }

        tracing::info!(
            thread_id = ctx.thread_id(),
            branch = ctx.branch_index(),
            completed,
            attempts,
            "subtask finished"
        );

        Ok(SubtaskOutcome {
            subtask: request.subtask.clone(),
            branch_index: request.branch_index,
            completed,
            attempts,
            tool_results,
            reflections,
            answer,
            usage,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::reflection::REFLECTION_SCHEMA;
    use crate::llm::ScriptedGateway;
    use crate::tool::Tool;
    use planweave_types::llm::ChatOutcome;
    use planweave_types::tool::ToolDescriptor;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    struct StubSearch {
        descriptor: ToolDescriptor,
    }

    impl StubSearch {
        fn new() -> Self {
            Self {
                descriptor: ToolDescriptor {
                    name: "search".to_string(),
                    description: "Search the knowledge base".to_string(),
                    parameters: json!({"type": "object"}),
                },
            }
        }
    }

    impl Tool for StubSearch {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn invoke(&self, _args: Value) -> Result<Vec<Value>, ToolError> {
            Ok(vec![json!({"file_name": "faq.md", "content": "limit is 10"})])
        }
    }

    fn request() -> SubtaskRequest {
        SubtaskRequest {
            question: "What are the limits?".to_string(),
            plan: vec!["find rate limits".to_string()],
            subtask: "find rate limits".to_string(),
            branch_index: 0,
        }
    }

    fn ctx() -> NodeContext {
        NodeContext::new("t", CancellationToken::new())
    }

    fn search_call() -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: "search".to_string(),
            arguments: r#"{"query":"rate limits"}"#.to_string(),
        }
    }

    fn orchestrator(gateway: ScriptedGateway) -> SubtaskOrchestrator {
        SubtaskOrchestrator::new(
            Arc::new(BoxLlmGateway::new(gateway)),
            Arc::new(ToolRegistry::new().register(StubSearch::new())),
        )
    }

    // -----------------------------------------------------------------------
    // Happy path
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_completes_on_first_attempt() {
        let gateway = ScriptedGateway::new()
            .push_tool_selection(ChatOutcome::tools(vec![search_call()]))
            .push_completion(ChatOutcome::text("the limit is 10 per day"))
            .push_structured(REFLECTION_SCHEMA, json!({"advice": "", "completed": true}));

        let outcome = orchestrator(gateway).run(&ctx(), &request()).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.answer, "the limit is 10 per day");
        assert_eq!(outcome.tool_results.len(), 1);
        assert_eq!(outcome.tool_results[0][0].tool_name, "search");
        assert!(outcome.usage.input_tokens > 0);
    }

    #[tokio::test]
    async fn test_zero_tool_calls_still_drafts_an_answer() {
        let gateway = ScriptedGateway::new()
            .push_tool_selection(ChatOutcome::text("no tools needed"))
            .push_completion(ChatOutcome::text("answered from context"))
            .push_structured(REFLECTION_SCHEMA, json!({"advice": "", "completed": true}));

        let outcome = orchestrator(gateway).run(&ctx(), &request()).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.tool_results.len(), 1);
        assert!(outcome.tool_results[0].is_empty());
        assert_eq!(outcome.answer, "answered from context");
    }

    // -----------------------------------------------------------------------
    // Retry and exhaustion
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_exhaustion_forces_fallback_answer() {
        // The sticky last entries make every attempt identical; the verdict
        // never completes, so the loop must stop after MAX_RETRIES passes.
        let gateway = ScriptedGateway::new()
            .push_tool_selection(ChatOutcome::tools(vec![search_call()]))
            .push_completion(ChatOutcome::text("a wrong answer"))
            .push_structured(
                REFLECTION_SCHEMA,
                json!({"advice": "try different arguments", "completed": false}),
            );

        let outcome = orchestrator(gateway).run(&ctx(), &request()).await.unwrap();
        assert!(!outcome.completed);
        assert_eq!(outcome.attempts, MAX_RETRIES);
        assert_eq!(outcome.reflections.len(), MAX_RETRIES as usize);
        assert_eq!(outcome.answer, "find rate limits could not be answered.");
        // One tool round per attempt.
        assert_eq!(outcome.tool_results.len(), MAX_RETRIES as usize);
    }

    #[tokio::test]
    async fn test_recovers_on_second_attempt() {
        let gateway = ScriptedGateway::new()
            .push_tool_selection(ChatOutcome::tools(vec![search_call()]))
            .push_completion(ChatOutcome::text("first draft"))
            .push_completion(ChatOutcome::text("second draft"))
            .push_structured(
                REFLECTION_SCHEMA,
                json!({"advice": "search the manual instead", "completed": false}),
            )
            .push_structured(REFLECTION_SCHEMA, json!({"advice": "", "completed": true}));

        let outcome = orchestrator(gateway).run(&ctx(), &request()).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.answer, "second draft");
        assert_eq!(outcome.reflections[0].advice, "search the manual instead");
    }

    // -----------------------------------------------------------------------
    // Fatal paths
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_unknown_tool_name_is_fatal() {
        let gateway = ScriptedGateway::new().push_tool_selection(ChatOutcome::tools(vec![
            ToolCall {
                id: "call_1".to_string(),
                name: "no_such_tool".to_string(),
                arguments: "{}".to_string(),
            },
        ]));

        let err = orchestrator(gateway).run(&ctx(), &request()).await.unwrap_err();
        match err {
            NodeError::Tool(ToolError::UnknownTool(name)) => assert_eq!(name, "no_such_tool"),
            other => panic!("expected unknown-tool error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_arguments_are_fatal() {
        let gateway = ScriptedGateway::new().push_tool_selection(ChatOutcome::tools(vec![
            ToolCall {
                id: "call_1".to_string(),
                name: "search".to_string(),
                arguments: "not json".to_string(),
            },
        ]));

        let err = orchestrator(gateway).run(&ctx(), &request()).await.unwrap_err();
        assert!(matches!(
            err,
            NodeError::Tool(ToolError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn test_gateway_failure_is_fatal() {
        // No scripted replies at all: the first completion call fails.
        let gateway = ScriptedGateway::new();
        let err = orchestrator(gateway).run(&ctx(), &request()).await.unwrap_err();
        assert!(matches!(err, NodeError::Llm(_)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_loop() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = NodeContext::new("t", token);

        let gateway = ScriptedGateway::new()
            .push_tool_selection(ChatOutcome::tools(vec![search_call()]));
        let err = orchestrator(gateway).run(&ctx, &request()).await.unwrap_err();
        assert!(matches!(err, NodeError::Cancelled));
    }
}
