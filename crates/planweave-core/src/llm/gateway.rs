//! The `LlmGateway` trait and its object-safe boxed form.
//!
//! The gateway submits a conversation to an external completion service.
//! Free-text mode may also carry tool definitions; structured mode carries a
//! named JSON schema and yields a parsed object (or `None` on parse failure,
//! which callers treat as fatal).
//!
//! Uses native async fn in traits (RPITIT). [`BoxLlmGateway`] provides the
//! dyn-compatible wrapper via a blanket-implemented shadow trait, so the
//! orchestrators can share one gateway across branches behind an `Arc`.

use std::future::Future;
use std::pin::Pin;

use planweave_types::llm::{ChatOutcome, LlmError, StructuredOutcome, StructuredSpec};
use planweave_types::message::Message;
use planweave_types::tool::ToolDescriptor;

/// Port to the external completion service.
pub trait LlmGateway: Send + Sync {
    /// Human-readable gateway name (e.g. "openai", "scripted").
    fn name(&self) -> &str;

    /// Submit a conversation, optionally offering tools. The model may
    /// answer with text, tool calls, or both.
    fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> impl Future<Output = Result<ChatOutcome, LlmError>> + Send;

    /// Submit a conversation constrained to a named JSON schema.
    fn complete_structured(
        &self,
        conversation: &[Message],
        spec: &StructuredSpec,
    ) -> impl Future<Output = Result<StructuredOutcome, LlmError>> + Send;
}

/// Object-safe version of [`LlmGateway`] with boxed futures.
pub trait LlmGatewayDyn: Send + Sync {
    fn name(&self) -> &str;

    fn complete_boxed<'a>(
        &'a self,
        conversation: &'a [Message],
        tools: &'a [ToolDescriptor],
    ) -> Pin<Box<dyn Future<Output = Result<ChatOutcome, LlmError>> + Send + 'a>>;

    fn complete_structured_boxed<'a>(
        &'a self,
        conversation: &'a [Message],
        spec: &'a StructuredSpec,
    ) -> Pin<Box<dyn Future<Output = Result<StructuredOutcome, LlmError>> + Send + 'a>>;
}

impl<T: LlmGateway> LlmGatewayDyn for T {
    fn name(&self) -> &str {
        LlmGateway::name(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        conversation: &'a [Message],
        tools: &'a [ToolDescriptor],
    ) -> Pin<Box<dyn Future<Output = Result<ChatOutcome, LlmError>> + Send + 'a>> {
        Box::pin(self.complete(conversation, tools))
    }

    fn complete_structured_boxed<'a>(
        &'a self,
        conversation: &'a [Message],
        spec: &'a StructuredSpec,
    ) -> Pin<Box<dyn Future<Output = Result<StructuredOutcome, LlmError>> + Send + 'a>> {
        Box::pin(self.complete_structured(conversation, spec))
    }
}

/// Type-erased gateway shared by all branches of a run.
pub struct BoxLlmGateway {
    inner: Box<dyn LlmGatewayDyn>,
}

impl BoxLlmGateway {
    pub fn new<T: LlmGateway + 'static>(gateway: T) -> Self {
        Self {
            inner: Box::new(gateway),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn complete(
        &self,
        conversation: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ChatOutcome, LlmError> {
        self.inner.complete_boxed(conversation, tools).await
    }

    pub async fn complete_structured(
        &self,
        conversation: &[Message],
        spec: &StructuredSpec,
    ) -> Result<StructuredOutcome, LlmError> {
        self.inner.complete_structured_boxed(conversation, spec).await
    }
}
