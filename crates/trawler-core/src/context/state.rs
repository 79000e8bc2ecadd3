//! Conversation state and the interruption signal.
//!
//! `State` is an owned value: the engine holds it exclusively while
//! running, hands it to the caller inside an `Interruption` when a hook
//! suspends the conversation, and receives it back via
//! [`Context::from_state`](super::Context::from_state) on resume. It is
//! never shared by reference across engines.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::transport::ContextParameters;
use crate::ai::types::{ChatMessage, ChatParameters, Usage};

/// Which engine phase produced an interruption.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifeCycle {
    ToolCall,
    LlmCall,
}

/// Why a hook suspended the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InterruptReason {
    /// Re-entrant continue: the caller should resolve something (approval,
    /// re-assignment) and resume from the carried state.
    PendingApproval,
    /// Terminal: a structured decision was extracted; no resume expected.
    Finished,
    /// The tool call the hook was watching failed.
    ToolFailed,
    Custom(String),
}

/// One-shot re-entry marker consumed by the hook that caused the
/// suspension, so an "ask once, then proceed" hook passes through on the
/// second entry instead of re-triggering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumptionToken {
    pub life_cycle: LifeCycle,
    /// Set when a pre-tool-call hook interrupted on a specific call.
    pub tool_call_id: Option<String>,
}

/// The mutable context of one conversation engine session. The unit of
/// suspend/resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    /// Target model endpoint, immutable per engine instance.
    pub model: String,
    /// Ordered role-tagged history; append-only during a turn.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Server-managed session handle (stateful-session mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_parameters: Option<ContextParameters>,
    /// Count of messages already delivered to a server-tracked session;
    /// the next request sends only `messages[synced..]`.
    #[serde(default)]
    pub synced: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ChatParameters>,
    /// Re-entry token recorded by the engine when a hook suspends; consumed
    /// exactly once by that hook on resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumption: Option<ResumptionToken>,
}

impl State {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            context_id: None,
            context_parameters: None,
            synced: 0,
            parameters: None,
            resumption: None,
        }
    }

    /// Take the resumption token, leaving `None`. Hooks call this to
    /// consume their one-shot re-entry marker.
    pub fn take_resumption(&mut self) -> Option<ResumptionToken> {
        self.resumption.take()
    }

    /// The current conversation tip, if any.
    pub fn latest_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// Signal that the engine paused: why, in which phase, and the state to
/// resume from. A control-flow value, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interruption {
    pub life_cycle: LifeCycle,
    pub reason: InterruptReason,
    pub state: State,
    /// Hook-supplied payload (e.g. the control tool's structured output).
    #[serde(default)]
    pub details: Value,
}

/// Non-streaming outcome of one `create` call.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Natural stop; the final assistant message.
    Completed(ChatMessage),
    /// A hook suspended the engine; resume from `interruption.state`.
    Interrupted(Interruption),
}

/// Elements of the streaming output sequence. A stream ends with exactly
/// one `Done`, `Interrupted`, or `Error` element.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextEvent {
    TextDelta {
        delta: String,
    },
    ReasoningDelta {
        delta: String,
    },
    ToolCallStarted {
        id: String,
        name: String,
        arguments: String,
    },
    ToolCallCompleted {
        id: String,
        name: String,
        output: Option<String>,
        is_error: bool,
    },
    Usage {
        usage: Usage,
    },
    Interrupted {
        interruption: Interruption,
    },
    Done {
        state: State,
    },
    /// Fatal engine failure (transport error, missing finish marker).
    Error {
        error: String,
    },
}
