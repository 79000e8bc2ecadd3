//! The core conversation loop.
//!
//! Drives the exchange: pre-LLM hooks, transport call, tool-call batch
//! processing with pre/post hooks, repeating until the model stops asking
//! for tools or a hook suspends the engine. Tool calls within one model
//! turn are processed strictly sequentially; later calls may depend on the
//! state mutations of earlier ones.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::ai::transport::{assemble_stream, CompletionRequest, StreamPart};
use crate::ai::types::{ChatMessage, Role, ToolCall};
use crate::context::hooks::HookDecision;
use crate::context::state::{
    ContextEvent, Interruption, InterruptReason, LifeCycle, ResumptionToken, TurnOutcome,
};
use crate::context::Context;
use crate::error::{CoreError, Result};

/// Internal loop verdict, turned into a `TurnOutcome`/`ContextEvent` once
/// the state snapshot is attached.
enum Drive {
    Done,
    Interrupt {
        life_cycle: LifeCycle,
        reason: InterruptReason,
        details: Value,
    },
}

/// Outcome of processing one pending tool-call batch.
enum BatchOutcome {
    /// Nothing pending, or every call in the batch was handled.
    Clean,
    /// The tip requests tools but no pool is configured; stop and leave the
    /// assistant message as the conversation tip.
    NoPool,
    Interrupt {
        reason: InterruptReason,
        details: Value,
    },
}

impl Context {
    /// Append `messages` and drive the conversation to a natural stop or an
    /// interruption. Non-streaming.
    pub async fn create(&mut self, messages: Vec<ChatMessage>) -> Result<TurnOutcome> {
        self.state.messages.extend(messages);
        match self.drive(None).await? {
            Drive::Done => {
                let tip = self.state.latest_message().cloned().ok_or_else(|| {
                    CoreError::Configuration("conversation finished with no messages".to_string())
                })?;
                Ok(TurnOutcome::Completed(tip))
            }
            Drive::Interrupt {
                life_cycle,
                reason,
                details,
            } => Ok(TurnOutcome::Interrupted(Interruption {
                life_cycle,
                reason,
                state: self.state.clone(),
                details,
            })),
        }
    }

    /// Append `messages` and drive the conversation on a spawned task,
    /// yielding a lazy, single-pass sequence of [`ContextEvent`]s. The
    /// sequence ends with exactly one `Done`, `Interrupted`, or `Error`
    /// element.
    pub fn create_stream(
        mut self,
        messages: Vec<ChatMessage>,
    ) -> mpsc::UnboundedReceiver<ContextEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            self.state.messages.extend(messages);
            match self.drive(Some(&tx)).await {
                Ok(Drive::Done) => {
                    let _ = tx.send(ContextEvent::Done { state: self.state });
                }
                Ok(Drive::Interrupt {
                    life_cycle,
                    reason,
                    details,
                }) => {
                    let _ = tx.send(ContextEvent::Interrupted {
                        interruption: Interruption {
                            life_cycle,
                            reason,
                            state: self.state,
                            details,
                        },
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "conversation engine failed");
                    let _ = tx.send(ContextEvent::Error {
                        error: e.to_string(),
                    });
                }
            }
        });

        rx
    }

    async fn drive(
        &mut self,
        emit: Option<&mpsc::UnboundedSender<ContextEvent>>,
    ) -> Result<Drive> {
        loop {
            // Tool batch first: covers both a fresh tool_calls turn and
            // re-entry after a suspension (the tip is then still the
            // assistant message whose batch was pending).
            match self.process_pending_tools(emit).await? {
                BatchOutcome::Clean => {}
                BatchOutcome::NoPool => return Ok(Drive::Done),
                BatchOutcome::Interrupt { reason, details } => {
                    return Ok(Drive::Interrupt {
                        life_cycle: LifeCycle::ToolCall,
                        reason,
                        details,
                    })
                }
            }

            for hook in &self.pre_llm_hooks {
                match hook.pre_llm_call(&mut self.state).await {
                    HookDecision::Continue => {}
                    HookDecision::Block { reason } => {
                        tracing::warn!(reason = %reason, "Block from a pre-LLM hook; ignoring");
                    }
                    HookDecision::Interrupt { reason, details } => {
                        self.state.resumption = Some(ResumptionToken {
                            life_cycle: LifeCycle::LlmCall,
                            tool_call_id: None,
                        });
                        return Ok(Drive::Interrupt {
                            life_cycle: LifeCycle::LlmCall,
                            reason,
                            details,
                        });
                    }
                }
            }

            let request = self.build_request().await;
            let completion = match emit {
                Some(tx) => {
                    let parts = self.transport.complete_stream(request).await?;
                    assemble_stream(parts, |part| match part {
                        StreamPart::TextDelta { delta } => {
                            let _ = tx.send(ContextEvent::TextDelta {
                                delta: delta.clone(),
                            });
                        }
                        StreamPart::ReasoningDelta { delta } => {
                            let _ = tx.send(ContextEvent::ReasoningDelta {
                                delta: delta.clone(),
                            });
                        }
                        StreamPart::Usage(usage) => {
                            let _ = tx.send(ContextEvent::Usage { usage: *usage });
                        }
                        _ => {}
                    })
                    .await?
                }
                None => self.transport.complete(request).await?,
            };

            self.state.messages.push(completion.message);
            // The server knows its own reply; only later tool results are
            // unsynced.
            self.state.synced = self.state.messages.len();

            let tip_has_tools = self
                .state
                .latest_message()
                .is_some_and(|m| !m.tool_calls.is_empty());
            if !tip_has_tools {
                return Ok(Drive::Done);
            }
        }
    }

    async fn build_request(&self) -> CompletionRequest {
        let messages = if self.state.context_id.is_some() {
            self.state.messages[self.state.synced.min(self.state.messages.len())..].to_vec()
        } else {
            self.state.messages.clone()
        };
        let tools = match &self.tools {
            Some(pool) => pool.specs().await,
            None => Vec::new(),
        };
        CompletionRequest {
            model: self.state.model.clone(),
            messages,
            tools,
            context_id: self.state.context_id.clone(),
            parameters: self.state.parameters.clone(),
        }
    }

    async fn process_pending_tools(
        &mut self,
        emit: Option<&mpsc::UnboundedSender<ContextEvent>>,
    ) -> Result<BatchOutcome> {
        let pending: Vec<ToolCall> = match self.state.latest_message() {
            Some(m) if m.role == Role::Assistant && !m.tool_calls.is_empty() => {
                m.tool_calls.clone()
            }
            _ => return Ok(BatchOutcome::Clean),
        };
        let Some(pool) = self.tools.clone() else {
            return Ok(BatchOutcome::NoPool);
        };

        for call in pending {
            if let Some(tx) = emit {
                let _ = tx.send(ContextEvent::ToolCallStarted {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
            }

            let mut blocked: Option<String> = None;
            for hook in &self.pre_tool_hooks {
                match hook.pre_tool_call(&call, &mut self.state).await {
                    HookDecision::Continue => {}
                    HookDecision::Block { reason } => {
                        blocked = Some(reason);
                        break;
                    }
                    HookDecision::Interrupt { reason, details } => {
                        // Recorded before suspension so the interrupting
                        // hook recognizes re-entry and passes through.
                        self.state.resumption = Some(ResumptionToken {
                            life_cycle: LifeCycle::ToolCall,
                            tool_call_id: Some(call.id.clone()),
                        });
                        return Ok(BatchOutcome::Interrupt { reason, details });
                    }
                }
            }

            // Execute, capturing the outcome as data. Tool failures are
            // never fatal to the engine.
            let executed;
            let (output, error) = if let Some(reason) = blocked {
                tracing::info!(tool = %call.name, reason = %reason, "tool call blocked by hook");
                executed = false;
                (None, Some(format!("tool call blocked: {reason}")))
            } else if !pool.contains(&call.name).await {
                executed = false;
                (None, Some(format!("unknown tool: {}", call.name)))
            } else {
                executed = true;
                match serde_json::from_str::<Value>(&call.arguments) {
                    Ok(args) => match pool.execute(&call.name, args).await {
                        Some(result) if result.is_error => (None, Some(result.output)),
                        Some(result) => (Some(result.output), None),
                        None => (None, Some(format!("unknown tool: {}", call.name))),
                    },
                    Err(e) => (None, Some(format!("invalid tool arguments: {e}"))),
                }
            };

            // Appended unconditionally: the model always sees some outcome
            // for every call on its next turn.
            let content = output.clone().or_else(|| error.clone()).unwrap_or_default();
            self.state
                .messages
                .push(ChatMessage::tool(&call.id, content, error.is_some()));

            if let Some(tx) = emit {
                let _ = tx.send(ContextEvent::ToolCallCompleted {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    output: output.clone(),
                    is_error: error.is_some(),
                });
            }

            if !executed {
                continue;
            }

            for hook in &self.post_tool_hooks {
                match hook
                    .post_tool_call(&call, output.as_deref(), error.as_deref(), &mut self.state)
                    .await
                {
                    HookDecision::Continue => {}
                    HookDecision::Block { reason } => {
                        tracing::warn!(reason = %reason, "Block from a post-tool hook; ignoring");
                    }
                    HookDecision::Interrupt { reason, details } => {
                        // Remaining calls in this batch are skipped; the
                        // tip is now this call's tool-result message.
                        return Ok(BatchOutcome::Interrupt { reason, details });
                    }
                }
            }
        }

        Ok(BatchOutcome::Clean)
    }
}
