//! Worker agent: executes one plan item with real tools.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::agent::events::ResearchEvent;
use crate::agent::prompts;
use crate::ai::transport::CompletionTransport;
use crate::ai::types::ChatMessage;
use crate::context::hooks::PostToolHook;
use crate::context::state::ContextEvent;
use crate::context::Context;
use crate::error::Result;
use crate::research::state::ResearchState;
use crate::tools::ToolPool;

/// Per-worker configuration; a run builds a fresh engine over it.
pub struct Worker {
    pub name: String,
    pub model: String,
    /// Capability description shown to the supervisor and in the worker's
    /// own system prompt.
    pub instruction: String,
    tools: Arc<ToolPool>,
    post_tool_hooks: Vec<Arc<dyn PostToolHook>>,
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        instruction: impl Into<String>,
        tools: Arc<ToolPool>,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            instruction: instruction.into(),
            tools,
            post_tool_hooks: Vec::new(),
        }
    }

    pub fn with_post_tool_hook(mut self, hook: Arc<dyn PostToolHook>) -> Self {
        self.post_tool_hooks.push(hook);
        self
    }

    /// Run one plan item to completion, forwarding engine events outward.
    /// On a natural stop the final assistant text becomes the item's
    /// `result_summary`.
    pub async fn run(
        &self,
        transport: Arc<dyn CompletionTransport>,
        shared: Arc<RwLock<ResearchState>>,
        task_id: &str,
        tx: &mpsc::UnboundedSender<ResearchEvent>,
    ) -> Result<()> {
        let system_prompt = {
            let state = shared.read().await;
            let Some(planning) = state.planning.as_ref() else {
                let _ = tx.send(ResearchEvent::InvalidParameter {
                    parameter: "task_id".to_string(),
                });
                return Ok(());
            };
            let Some(item) = planning.get_item(task_id) else {
                let _ = tx.send(ResearchEvent::InvalidParameter {
                    parameter: "task_id".to_string(),
                });
                return Ok(());
            };
            prompts::worker_prompt(&self.instruction, planning, item)
        };

        let mut ctx =
            Context::new(&self.model, transport).with_tools(self.tools.clone());
        ctx.init().await?;
        for hook in &self.post_tool_hooks {
            ctx.add_post_tool_hook(hook.clone());
        }

        tracing::info!(worker = %self.name, task_id, "worker starting");

        let mut events = ctx.create_stream(vec![ChatMessage::system(system_prompt)]);
        while let Some(event) = events.recv().await {
            match event {
                ContextEvent::TextDelta { delta } => {
                    let _ = tx.send(ResearchEvent::TextDelta { delta });
                }
                ContextEvent::ReasoningDelta { delta } => {
                    let _ = tx.send(ResearchEvent::ReasoningDelta { delta });
                }
                ContextEvent::ToolCallStarted {
                    id,
                    name,
                    arguments,
                } => {
                    let _ = tx.send(ResearchEvent::ToolCall {
                        id,
                        name,
                        arguments,
                    });
                }
                ContextEvent::ToolCallCompleted {
                    id,
                    name,
                    output,
                    is_error,
                } => {
                    let _ = tx.send(ResearchEvent::ToolCompleted {
                        id,
                        name,
                        output,
                        is_error,
                    });
                }
                ContextEvent::Usage { usage } => {
                    shared.write().await.total_usage.add(usage);
                }
                ContextEvent::Done { state } => {
                    let summary = state
                        .latest_message()
                        .map(|m| format!("\n{}\n", m.content))
                        .unwrap_or_default();
                    let mut shared = shared.write().await;
                    if let Some(planning) = shared.planning.as_mut() {
                        if let Some(item) = planning.item_mut(task_id) {
                            item.result_summary = summary;
                            item.assign_agent = Some(self.name.clone());
                        }
                    }
                    tracing::info!(worker = %self.name, task_id, "worker finished");
                }
                ContextEvent::Interrupted { interruption } => {
                    tracing::warn!(
                        worker = %self.name,
                        reason = ?interruption.reason,
                        "worker engine interrupted"
                    );
                    let _ = tx.send(ResearchEvent::InternalServiceError {
                        message: "worker conversation was interrupted".to_string(),
                    });
                }
                ContextEvent::Error { error } => {
                    let _ = tx.send(ResearchEvent::InternalServiceError { message: error });
                }
            }
        }

        Ok(())
    }
}
