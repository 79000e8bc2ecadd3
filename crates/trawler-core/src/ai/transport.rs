//! Completion transport interface.
//!
//! The engine never talks to a provider directly; it drives this trait.
//! Streaming responses arrive as `StreamPart`s over an unbounded channel,
//! which the engine (or the default `complete` implementation) assembles
//! into a full assistant message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ai::types::{ChatMessage, ChatParameters, FinishReason, Role, ToolCall, ToolSpec, Usage};
use crate::error::{CoreError, Result};

/// One chunk of a streaming model response.
#[derive(Debug, Clone)]
pub enum StreamPart {
    TextDelta { delta: String },
    ReasoningDelta { delta: String },
    /// A fully-accumulated tool call (arguments complete).
    ToolCall(ToolCall),
    Usage(Usage),
    Finish(FinishReason),
    Error { error: String },
}

/// How a server-managed session caches conversation state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionCacheMode {
    Session,
    CommonPrefix,
}

/// Parameters for creating a server-managed conversation session.
///
/// When present on a `State`, the engine creates the session during
/// `init()` and subsequently sends only the messages appended since the
/// last transport call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextParameters {
    pub mode: SessionCacheMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial_messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

/// One request to the completion transport.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    /// Full history in stateless mode; the unsynced tail in session mode.
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    /// Server-managed session handle, when the engine runs in session mode.
    pub context_id: Option<String>,
    pub parameters: Option<ChatParameters>,
}

/// A fully-assembled (non-streaming) model response.
#[derive(Debug, Clone)]
pub struct Completion {
    pub message: ChatMessage,
    pub finish_reason: FinishReason,
    pub usage: Option<Usage>,
}

/// External collaborator that performs the actual model calls.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Stream one model turn. The returned channel must deliver deltas in
    /// arrival order and end with exactly one `Finish` part (or an `Error`
    /// part for a mid-stream failure).
    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>>;

    /// Non-streaming turn. Default implementation drains `complete_stream`.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let rx = self.complete_stream(request).await?;
        assemble_stream(rx, |_| {}).await
    }

    /// Create a server-managed session handle for stateful-session mode.
    async fn create_session(
        &self,
        _model: &str,
        _parameters: &ContextParameters,
    ) -> Result<String> {
        Err(CoreError::Configuration(
            "this transport does not support server-managed sessions".to_string(),
        ))
    }
}

/// Assemble a stream of parts into a completion, invoking `on_part` for
/// every chunk as it arrives (used by the engine to forward deltas without
/// buffering).
pub(crate) async fn assemble_stream(
    mut rx: mpsc::UnboundedReceiver<StreamPart>,
    mut on_part: impl FnMut(&StreamPart) + Send,
) -> Result<Completion> {
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut usage: Option<Usage> = None;
    let mut finish: Option<FinishReason> = None;

    while let Some(part) = rx.recv().await {
        on_part(&part);
        match part {
            StreamPart::TextDelta { delta } => content.push_str(&delta),
            StreamPart::ReasoningDelta { delta } => reasoning.push_str(&delta),
            StreamPart::ToolCall(call) => tool_calls.push(call),
            StreamPart::Usage(u) => usage = Some(u),
            StreamPart::Finish(reason) => finish = Some(reason),
            StreamPart::Error { error } => return Err(CoreError::Transport(error)),
        }
    }

    let finish_reason = finish.ok_or_else(|| {
        CoreError::Transport("stream ended without a finish marker".to_string())
    })?;

    Ok(Completion {
        message: ChatMessage {
            role: Role::Assistant,
            content,
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            tool_calls,
            tool_call_id: None,
            is_error: None,
        },
        finish_reason,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn assemble_accumulates_deltas_and_tool_calls() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(StreamPart::ReasoningDelta {
            delta: "thinking".into(),
        })
        .unwrap();
        tx.send(StreamPart::TextDelta { delta: "hel".into() }).unwrap();
        tx.send(StreamPart::TextDelta { delta: "lo".into() }).unwrap();
        tx.send(StreamPart::ToolCall(ToolCall {
            id: "c1".into(),
            name: "add".into(),
            arguments: "{\"a\":1}".into(),
        }))
        .unwrap();
        tx.send(StreamPart::Finish(FinishReason::ToolCalls)).unwrap();
        drop(tx);

        let completion = assemble_stream(rx, |_| {}).await.unwrap();
        assert_eq!(completion.message.content, "hello");
        assert_eq!(completion.message.reasoning.as_deref(), Some("thinking"));
        assert_eq!(completion.message.tool_calls.len(), 1);
        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
    }

    #[tokio::test]
    async fn missing_finish_marker_is_a_transport_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(StreamPart::TextDelta { delta: "x".into() }).unwrap();
        drop(tx);

        let err = assemble_stream(rx, |_| {}).await.unwrap_err();
        assert!(matches!(err, CoreError::Transport(_)));
    }
}
