//! Prompt templates for the orchestration loops.
//!
//! Kept together so the wording can be tuned in one place. The structured
//! output field descriptions live on the schema types in `planweave-types`;
//! these templates carry the conversational framing.

/// Prompt set shared by the planner, the subtask loop, and the code loop.
#[derive(Debug, Clone, Default)]
pub struct AgentPrompts;

impl AgentPrompts {
    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    pub fn planner_system(&self) -> String {
        "You are a planner. Decompose the user's question into a short, \
         ordered list of independent subtasks. Each subtask must be \
         answerable on its own and the list together must cover the question. \
         Do not include subtasks that duplicate one another."
            .to_string()
    }

    pub fn planner_user(&self, question: &str) -> String {
        format!("Question: {question}")
    }

    // -----------------------------------------------------------------------
    // Subtask tool loop
    // -----------------------------------------------------------------------

    pub fn subtask_system(&self) -> String {
        "You are a help-desk agent working on one subtask of a larger plan. \
         Use the available tools to gather the evidence the subtask needs, \
         then answer from the tool results only."
            .to_string()
    }

    pub fn tool_selection_user(&self, question: &str, plan: &[String], subtask: &str) -> String {
        format!(
            "Overall question: {question}\n\
             Plan: {plan}\n\
             Your subtask: {subtask}\n\
             Select the tools and arguments that will gather the evidence \
             this subtask needs.",
            plan = serde_json::to_string(plan).unwrap_or_default(),
        )
    }

    /// Appended on retry passes, after the tool traffic has been stripped.
    pub fn retry_instruction(&self, advice: &str) -> String {
        format!(
            "The previous answer did not satisfy the subtask. Following this \
             advice, select tools and try again: {advice}"
        )
    }

    pub fn reflection_instruction(&self) -> String {
        "Evaluate whether the answer above correctly satisfies the subtask, \
         judging only from the tool results in this conversation. If it does \
         not, give advice for the next attempt: a different tool, or \
         different arguments. The advice must not repeat earlier advice and \
         must not overlap with other subtasks in the plan."
            .to_string()
    }

    // -----------------------------------------------------------------------
    // Aggregation
    // -----------------------------------------------------------------------

    pub fn final_answer_system(&self) -> String {
        "Compose one final answer to the user's question from the subtask \
         answers. Use only what the subtask answers state; where a subtask \
         could not be answered, say so rather than guessing."
            .to_string()
    }

    pub fn final_answer_user(&self, question: &str, subtask_results: &str) -> String {
        format!(
            "Question: {question}\n\
             Subtask answers: {subtask_results}"
        )
    }

    // -----------------------------------------------------------------------
    // Code loop
    // -----------------------------------------------------------------------

    pub fn code_system(&self, data_info: &str) -> String {
        format!(
            "You write analysis code that runs in an isolated sandbox. \
             The data available to the code is described below. Print every \
             result the task needs; nothing outside stdout and rendered \
             artifacts survives the run.\n\
             Data description:\n{data_info}"
        )
    }

    pub fn code_task_user(&self, request: &str) -> String {
        format!("Task request: {request}")
    }

    pub fn code_retry_user(&self, observation: &str) -> String {
        format!(
            "Using the review below, regenerate code that satisfies the task \
             request: {observation}"
        )
    }

    pub fn code_review_user(&self, data_info: &str, request: &str) -> String {
        format!(
            "Task request: {request}\n\
             Data description:\n{data_info}\n\
             Review the execution above: state objectively what it produced, \
             then judge whether it minimally satisfies the task request."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_selection_prompt_carries_plan_and_subtask() {
        let prompts = AgentPrompts;
        let text = prompts.tool_selection_user(
            "What are the limits?",
            &["find rate limits".to_string(), "find size limits".to_string()],
            "find rate limits",
        );
        assert!(text.contains("What are the limits?"));
        assert!(text.contains("find size limits"));
        assert!(text.contains("Your subtask: find rate limits"));
    }

    #[test]
    fn test_retry_instruction_embeds_advice() {
        let prompts = AgentPrompts;
        let text = prompts.retry_instruction("try the manual search instead");
        assert!(text.contains("try the manual search instead"));
    }
}
