//! Summary agent: streams the final answer from a completed plan.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::agent::events::ResearchEvent;
use crate::agent::prompts;
use crate::ai::transport::CompletionTransport;
use crate::ai::types::ChatMessage;
use crate::context::state::ContextEvent;
use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::research::state::ResearchState;

pub struct Summarizer {
    model: String,
}

impl Summarizer {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    /// Stream a summarizing answer over the executed plan. Tool-free.
    pub async fn run(
        &self,
        transport: Arc<dyn CompletionTransport>,
        shared: Arc<RwLock<ResearchState>>,
        tx: &mpsc::UnboundedSender<ResearchEvent>,
    ) -> Result<()> {
        let prompt = {
            let state = shared.read().await;
            let planning = state.planning.as_ref().ok_or(CoreError::NoPlan)?;
            prompts::summary_prompt(planning)
        };

        let ctx = Context::new(&self.model, transport);
        let mut events = ctx.create_stream(vec![ChatMessage::system(prompt)]);

        while let Some(event) = events.recv().await {
            match event {
                ContextEvent::TextDelta { delta } => {
                    let _ = tx.send(ResearchEvent::TextDelta { delta });
                }
                ContextEvent::ReasoningDelta { delta } => {
                    let _ = tx.send(ResearchEvent::ReasoningDelta { delta });
                }
                ContextEvent::Usage { usage } => {
                    shared.write().await.total_usage.add(usage);
                }
                ContextEvent::Error { error } => return Err(CoreError::Transport(error)),
                _ => {}
            }
        }

        Ok(())
    }
}
