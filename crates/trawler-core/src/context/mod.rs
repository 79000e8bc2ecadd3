//! The conversation engine ("Context").
//!
//! A `Context` drives one logical multi-turn LLM + tool-call conversation
//! to either a natural stop or an interruption raised by a hook. It owns
//! its `State` exclusively; across a suspend/resume boundary the state
//! travels by value inside the `Interruption`.

pub mod completions;
pub mod hooks;
pub mod state;

use std::sync::Arc;

use crate::ai::transport::{CompletionTransport, ContextParameters};
use crate::ai::types::{ChatMessage, ChatParameters};
use crate::error::{CoreError, Result};
use crate::tools::ToolPool;

pub use hooks::{ApprovalHook, HookDecision, LoggingHook, MessageWindowHook, PostToolHook,
    PreLlmHook, PreToolHook};
pub use state::{
    ContextEvent, Interruption, InterruptReason, LifeCycle, ResumptionToken, State, TurnOutcome,
};

/// Stateful driver of one LLM + tool-call session.
pub struct Context {
    pub(crate) state: State,
    pub(crate) transport: Arc<dyn CompletionTransport>,
    pub(crate) tools: Option<Arc<ToolPool>>,
    pub(crate) pre_llm_hooks: Vec<Arc<dyn PreLlmHook>>,
    pub(crate) pre_tool_hooks: Vec<Arc<dyn PreToolHook>>,
    pub(crate) post_tool_hooks: Vec<Arc<dyn PostToolHook>>,
}

impl Context {
    pub fn new(model: impl Into<String>, transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            state: State::new(model),
            transport,
            tools: None,
            pre_llm_hooks: Vec::new(),
            pre_tool_hooks: Vec::new(),
            post_tool_hooks: Vec::new(),
        }
    }

    /// Resume constructor: a fresh engine over a previously-suspended state.
    pub fn from_state(state: State, transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            state,
            transport,
            tools: None,
            pre_llm_hooks: Vec::new(),
            pre_tool_hooks: Vec::new(),
            post_tool_hooks: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolPool>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_parameters(mut self, parameters: ChatParameters) -> Self {
        self.state.parameters = Some(parameters);
        self
    }

    /// Request stateful-session mode; the server-side handle is created by
    /// [`Context::init`].
    pub fn with_context_parameters(mut self, parameters: ContextParameters) -> Self {
        self.state.context_parameters = Some(parameters);
        self
    }

    pub fn add_pre_llm_hook(&mut self, hook: Arc<dyn PreLlmHook>) {
        self.pre_llm_hooks.push(hook);
    }

    pub fn add_pre_tool_hook(&mut self, hook: Arc<dyn PreToolHook>) {
        self.pre_tool_hooks.push(hook);
    }

    pub fn add_post_tool_hook(&mut self, hook: Arc<dyn PostToolHook>) {
        self.post_tool_hooks.push(hook);
    }

    /// Create the server-side session (stateful mode) and refresh the tool
    /// manifest.
    pub async fn init(&mut self) -> Result<()> {
        if let Some(params) = self.state.context_parameters.clone() {
            if self.state.context_id.is_none() {
                let id = self
                    .transport
                    .create_session(&self.state.model, &params)
                    .await
                    .map_err(|e| {
                        CoreError::Configuration(format!(
                            "failed to create server-managed session: {e}"
                        ))
                    })?;
                tracing::debug!(context_id = %id, "created server-managed session");
                self.state.context_id = Some(id);
            }
        }
        if let Some(pool) = &self.tools {
            pool.refresh_manifest().await;
        }
        Ok(())
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Consume the engine, handing back ownership of the state.
    pub fn into_state(self) -> State {
        self.state
    }

    pub fn latest_message(&self) -> Option<&ChatMessage> {
        self.state.latest_message()
    }
}
