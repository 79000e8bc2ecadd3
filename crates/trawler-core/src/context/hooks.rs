//! Hook system for the conversation engine.
//!
//! Three extension points: before every LLM call, before each tool call,
//! and after each tool call. Hooks of the same kind run in registration
//! order, each seeing the state as mutated by its predecessors.
//!
//! ## Built-in hooks
//! - `ApprovalHook` - one-shot human-in-the-loop approval of tool calls
//! - `LoggingHook` - traces every tool execution
//! - `MessageWindowHook` - truncates history before each LLM call

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ai::types::{Role, ToolCall};
use crate::context::state::{InterruptReason, State};

/// Decision returned by every hook.
///
/// `Interrupt` is the only way a hook communicates "stop": the engine
/// halts immediately (no further hooks, no further tool calls in the
/// batch, no LLM call) and surfaces an `Interruption` to the caller.
/// Returning `Continue` always means "keep going".
#[derive(Debug)]
pub enum HookDecision {
    /// Proceed unchanged. Identity pass-through for hooks with nothing to do.
    Continue,
    /// Pre-tool only: skip execution and record an error tool result in its
    /// place. The conversation continues.
    Block { reason: String },
    /// Suspend the engine and hand control (and the state) to the caller.
    Interrupt {
        reason: InterruptReason,
        details: Value,
    },
}

/// Invoked immediately before every request to the completion transport.
#[async_trait]
pub trait PreLlmHook: Send + Sync {
    async fn pre_llm_call(&self, state: &mut State) -> HookDecision;
}

/// Invoked once per detected tool call, before execution.
#[async_trait]
pub trait PreToolHook: Send + Sync {
    async fn pre_tool_call(&self, call: &ToolCall, state: &mut State) -> HookDecision;
}

/// Invoked once per tool call after execution, whether it succeeded or
/// failed. Exactly one of `output`/`error` is `Some`.
#[async_trait]
pub trait PostToolHook: Send + Sync {
    async fn post_tool_call(
        &self,
        call: &ToolCall,
        output: Option<&str>,
        error: Option<&str>,
        state: &mut State,
    ) -> HookDecision;
}

// ============================================================================
// Built-in hooks
// ============================================================================

/// One-shot approval: interrupts with `PendingApproval` before a tool call
/// unless the state carries a resumption token for that same call, in which
/// case the token is consumed and the call proceeds.
#[derive(Debug, Default)]
pub struct ApprovalHook;

impl ApprovalHook {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PreToolHook for ApprovalHook {
    async fn pre_tool_call(&self, call: &ToolCall, state: &mut State) -> HookDecision {
        if state
            .resumption
            .as_ref()
            .is_some_and(|t| t.tool_call_id.as_deref() == Some(call.id.as_str()))
        {
            state.take_resumption();
            return HookDecision::Continue;
        }

        HookDecision::Interrupt {
            reason: InterruptReason::PendingApproval,
            details: json!({
                "tool_call_id": call.id,
                "name": call.name,
                "arguments": call.arguments,
            }),
        }
    }
}

/// Logs every tool execution outcome.
#[derive(Debug, Default)]
pub struct LoggingHook;

impl LoggingHook {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PostToolHook for LoggingHook {
    async fn post_tool_call(
        &self,
        call: &ToolCall,
        output: Option<&str>,
        error: Option<&str>,
        _state: &mut State,
    ) -> HookDecision {
        tracing::info!(
            tool = %call.name,
            is_error = error.is_some(),
            output_len = output.map_or(0, str::len),
            "tool execution completed"
        );
        HookDecision::Continue
    }
}

/// Keeps the leading system message plus the last `keep_last` messages,
/// dropping the middle of the history before each LLM call.
#[derive(Debug)]
pub struct MessageWindowHook {
    keep_last: usize,
}

impl MessageWindowHook {
    pub fn new(keep_last: usize) -> Self {
        Self { keep_last }
    }
}

#[async_trait]
impl PreLlmHook for MessageWindowHook {
    async fn pre_llm_call(&self, state: &mut State) -> HookDecision {
        let has_system = state
            .messages
            .first()
            .is_some_and(|m| m.role == Role::System);
        let head = usize::from(has_system);

        if state.messages.len() > head + self.keep_last {
            let cut = state.messages.len() - self.keep_last;
            let dropped = cut - head;
            state.messages.drain(head..cut);
            tracing::debug!(dropped, "truncated conversation window");
        }
        HookDecision::Continue
    }
}
