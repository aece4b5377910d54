//! Deterministic scripted gateway.
//!
//! Replies are routed by request shape, not arrival order, so concurrent
//! branches stay deterministic: tool-offering calls draw from the
//! tool-selection script, plain calls from the completion script, and
//! structured calls from per-schema scripts. Rules keyed on conversation
//! content take precedence, which lets one branch misbehave while its
//! siblings proceed.
//!
//! Each script is a sticky queue: entries pop in order and the last entry
//! repeats forever, so "always incomplete" scenarios need a single entry.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;

use planweave_types::llm::{ChatOutcome, LlmError, StructuredOutcome, StructuredSpec, Usage};
use planweave_types::message::Message;
use planweave_types::tool::ToolDescriptor;

use super::gateway::LlmGateway;

/// Fixed per-call usage reported by the scripted gateway.
const SCRIPTED_USAGE: Usage = Usage {
    input_tokens: 10,
    output_tokens: 5,
};

#[derive(Default)]
struct Scripts {
    /// Replies for calls that offer tools, matched by conversation content.
    tool_selection_rules: Vec<(String, ChatOutcome)>,
    /// Replies for calls that offer tools, in order.
    tool_selections: VecDeque<ChatOutcome>,
    /// Replies for plain completions, in order.
    completions: VecDeque<ChatOutcome>,
    /// Replies per structured schema name, in order.
    structured: HashMap<String, VecDeque<Value>>,
}

/// Scripted, offline [`LlmGateway`] implementation.
pub struct ScriptedGateway {
    scripts: Mutex<Scripts>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(Scripts::default()),
        }
    }

    /// Queue a reply for tool-offering calls.
    pub fn push_tool_selection(self, outcome: ChatOutcome) -> Self {
        self.with(|scripts| scripts.tool_selections.push_back(outcome));
        self
    }

    /// Reply with `outcome` for tool-offering calls whose conversation
    /// mentions `needle`. Checked before the queued replies.
    pub fn tool_selection_rule(self, needle: &str, outcome: ChatOutcome) -> Self {
        self.with(|scripts| {
            scripts
                .tool_selection_rules
                .push((needle.to_string(), outcome))
        });
        self
    }

    /// Queue a reply for plain completions.
    pub fn push_completion(self, outcome: ChatOutcome) -> Self {
        self.with(|scripts| scripts.completions.push_back(outcome));
        self
    }

    /// Queue a structured reply for schema `name`.
    pub fn push_structured(self, name: &str, value: Value) -> Self {
        self.with(|scripts| {
            scripts
                .structured
                .entry(name.to_string())
                .or_default()
                .push_back(value)
        });
        self
    }

    fn with<R>(&self, apply: impl FnOnce(&mut Scripts) -> R) -> R {
        let mut scripts = self
            .scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut scripts)
    }

    /// Pop the next entry, keeping the last one sticky.
    fn pop_sticky<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn mentions(conversation: &[Message], needle: &str) -> bool {
        conversation
            .iter()
            .any(|message| message.content.contains(needle))
    }
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ChatOutcome, LlmError> {
        self.with(|scripts| {
            let mut outcome = if tools.is_empty() {
                Self::pop_sticky(&mut scripts.completions).ok_or_else(|| {
                    LlmError::InvalidRequest("scripted gateway: no completion reply queued".into())
                })?
            } else {
                let rule = scripts
                    .tool_selection_rules
                    .iter()
                    .find(|(needle, _)| Self::mentions(conversation, needle))
                    .map(|(_, outcome)| outcome.clone());
                match rule {
                    Some(outcome) => outcome,
                    None => Self::pop_sticky(&mut scripts.tool_selections).ok_or_else(|| {
                        LlmError::InvalidRequest(
                            "scripted gateway: no tool-selection reply queued".into(),
                        )
                    })?,
                }
            };
            outcome.usage = SCRIPTED_USAGE;
            Ok(outcome)
        })
    }

    async fn complete_structured(
        &self,
        _conversation: &[Message],
        spec: &StructuredSpec,
    ) -> Result<StructuredOutcome, LlmError> {
        self.with(|scripts| {
            let queue = scripts.structured.get_mut(&spec.name).ok_or_else(|| {
                LlmError::InvalidRequest(format!(
                    "scripted gateway: no structured reply for schema '{}'",
                    spec.name
                ))
            })?;
            let value = Self::pop_sticky(queue);
            Ok(StructuredOutcome {
                value,
                usage: SCRIPTED_USAGE,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
