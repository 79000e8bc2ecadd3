//! Supervisor agent: drives the assign / execute / accept loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};

use crate::agent::events::{PlanningAction, ResearchEvent};
use crate::agent::hooks::ControlHook;
use crate::agent::prompts;
use crate::agent::worker::Worker;
use crate::ai::transport::CompletionTransport;
use crate::ai::types::ChatMessage;
use crate::context::state::{ContextEvent, InterruptReason};
use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::research::state::{ResearchState, StateStore};
use crate::tools::{FunctionTool, ToolPool, ToolResult};

/// Hard cap on assign/accept rounds per run.
const MAX_ROUNDS: usize = 50;

/// Models sometimes emit numeric task ids; normalize to strings.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a task id, got {other}"
        ))),
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct AssignDecision {
    pub agent_name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub task_id: String,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct AcceptDecision {
    pub accept: bool,
    #[serde(default)]
    pub append_description: String,
}

/// Leads the worker roster through the plan: one item per round, each
/// structural decision forced out of a single-tool engine by a
/// [`ControlHook`].
pub struct Supervisor {
    model: String,
    workers: BTreeMap<String, Arc<Worker>>,
    /// When false the supervisor accepts every worker result without an
    /// accept round.
    reasoning_accept: bool,
    store: Option<Arc<dyn StateStore>>,
}

impl Supervisor {
    pub fn new(model: impl Into<String>, workers: BTreeMap<String, Arc<Worker>>) -> Self {
        Self {
            model: model.into(),
            workers,
            reasoning_accept: true,
            store: None,
        }
    }

    pub fn with_reasoning_accept(mut self, reasoning_accept: bool) -> Self {
        self.reasoning_accept = reasoning_accept;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn roster(&self) -> Vec<(String, String)> {
        self.workers
            .values()
            .map(|w| (w.name.clone(), w.instruction.clone()))
            .collect()
    }

    /// Run rounds until no todos remain.
    pub async fn run(
        &self,
        transport: Arc<dyn CompletionTransport>,
        shared: Arc<RwLock<ResearchState>>,
        tx: &mpsc::UnboundedSender<ResearchEvent>,
    ) -> Result<()> {
        let mut rounds = 0;
        loop {
            {
                let state = shared.read().await;
                let planning = state.planning.as_ref().ok_or(CoreError::NoPlan)?;
                if planning.get_todos().is_empty() {
                    break;
                }
            }

            rounds += 1;
            if rounds > MAX_ROUNDS {
                let _ = tx.send(ResearchEvent::InternalServiceError {
                    message: format!(
                        "supervisor stopped after {MAX_ROUNDS} rounds with work remaining"
                    ),
                });
                return Ok(());
            }

            let Some(decision) = self.assign_next_todo(transport.clone(), &shared, tx).await?
            else {
                tracing::warn!("assignment round produced no decision, retrying");
                continue;
            };

            let Some(worker) = self.workers.get(&decision.agent_name) else {
                let _ = tx.send(ResearchEvent::InvalidParameter {
                    parameter: "agent_name".to_string(),
                });
                return Ok(());
            };

            let item = {
                let mut state = shared.write().await;
                let planning = state.planning.as_mut().ok_or(CoreError::NoPlan)?;
                match planning.item_mut(&decision.task_id) {
                    Some(item) => {
                        item.assign_agent = Some(decision.agent_name.clone());
                        item.clone()
                    }
                    None => {
                        let _ = tx.send(ResearchEvent::InvalidParameter {
                            parameter: "task_id".to_string(),
                        });
                        return Ok(());
                    }
                }
            };

            tracing::info!(
                agent = %decision.agent_name,
                task_id = %decision.task_id,
                "assigned next todo"
            );
            let _ = tx.send(ResearchEvent::AssignTodo {
                agent_name: decision.agent_name.clone(),
                item,
            });

            worker
                .run(transport.clone(), shared.clone(), &decision.task_id, tx)
                .await?;

            if self.reasoning_accept {
                self.receive_step(transport.clone(), &shared, &decision.task_id, tx)
                    .await?;
            } else {
                let mut state = shared.write().await;
                let planning = state.planning.as_mut().ok_or(CoreError::NoPlan)?;
                planning.accept_item(&decision.task_id)?;
            }

            if let Some(store) = &self.store {
                let state = shared.read().await;
                store.dump(&state).await?;
            }

            let planning = {
                let state = shared.read().await;
                state.planning.clone().ok_or(CoreError::NoPlan)?
            };
            let _ = tx.send(ResearchEvent::Planning {
                action: PlanningAction::Update,
                planning,
            });
        }

        Ok(())
    }

    /// One assignment round: a single-tool engine picks a worker and a
    /// task; the control hook turns that tool call into the round's result.
    async fn assign_next_todo(
        &self,
        transport: Arc<dyn CompletionTransport>,
        shared: &Arc<RwLock<ResearchState>>,
        tx: &mpsc::UnboundedSender<ResearchEvent>,
    ) -> Result<Option<AssignDecision>> {
        let prompt = {
            let state = shared.read().await;
            let planning = state.planning.as_ref().ok_or(CoreError::NoPlan)?;
            prompts::assign_prompt(planning, &self.roster())
        };

        let pool = ToolPool::new();
        pool.register(Arc::new(FunctionTool::new(
            "assign_next_todo",
            "Assign one pending task to one team member",
            json!({
                "type": "object",
                "properties": {
                    "agent_name": {"type": "string", "description": "worker name from the roster"},
                    "task_id": {"type": "string", "description": "id of a pending task"}
                },
                "required": ["agent_name", "task_id"]
            }),
            |params: Value| async move {
                match (params.get("agent_name"), params.get("task_id")) {
                    (Some(agent_name), Some(task_id)) => ToolResult::success(
                        json!({"agent_name": agent_name, "task_id": task_id}).to_string(),
                    ),
                    _ => ToolResult::error("agent_name and task_id are required"),
                }
            },
        )))
        .await;

        let mut ctx = Context::new(&self.model, transport).with_tools(Arc::new(pool));
        ctx.init().await?;
        ctx.add_post_tool_hook(Arc::new(ControlHook::new(["assign_next_todo"])));

        let mut events = ctx.create_stream(vec![ChatMessage::system(prompt)]);
        while let Some(event) = events.recv().await {
            match event {
                ContextEvent::TextDelta { delta } => {
                    let _ = tx.send(ResearchEvent::TextDelta { delta });
                }
                ContextEvent::ReasoningDelta { delta } => {
                    let _ = tx.send(ResearchEvent::ReasoningDelta { delta });
                }
                ContextEvent::Interrupted { interruption } => {
                    match interruption.reason {
                        InterruptReason::Finished => {
                            match serde_json::from_value::<AssignDecision>(interruption.details) {
                                Ok(decision) => return Ok(Some(decision)),
                                Err(e) => {
                                    tracing::warn!(error = %e, "unparseable assignment decision");
                                    return Ok(None);
                                }
                            }
                        }
                        reason => {
                            tracing::warn!(?reason, "assignment round failed");
                            return Ok(None);
                        }
                    }
                }
                ContextEvent::Error { error } => return Err(CoreError::Transport(error)),
                _ => {}
            }
        }

        Ok(None)
    }

    /// One accept round over a finished item.
    async fn receive_step(
        &self,
        transport: Arc<dyn CompletionTransport>,
        shared: &Arc<RwLock<ResearchState>>,
        task_id: &str,
        tx: &mpsc::UnboundedSender<ResearchEvent>,
    ) -> Result<()> {
        let prompt = {
            let state = shared.read().await;
            let planning = state.planning.as_ref().ok_or(CoreError::NoPlan)?;
            let item = planning
                .get_item(task_id)
                .ok_or_else(|| CoreError::UnknownItem {
                    id: task_id.to_string(),
                })?;
            prompts::accept_prompt(planning, item)
        };

        let pool = ToolPool::new();
        pool.register(Arc::new(FunctionTool::new(
            "accept_agent_response",
            "Record whether the task result is sufficient",
            json!({
                "type": "object",
                "properties": {
                    "accept": {"type": "boolean"},
                    "append_description": {
                        "type": "string",
                        "description": "what is still missing, when rejecting"
                    }
                },
                "required": ["accept"]
            }),
            |params: Value| async move {
                let Some(accept) = params.get("accept").and_then(Value::as_bool) else {
                    return ToolResult::error("accept is required");
                };
                let append = params
                    .get("append_description")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                ToolResult::success(
                    json!({"accept": accept, "append_description": append}).to_string(),
                )
            },
        )))
        .await;

        let mut ctx = Context::new(&self.model, transport).with_tools(Arc::new(pool));
        ctx.init().await?;
        ctx.add_post_tool_hook(Arc::new(ControlHook::new(["accept_agent_response"])));

        let mut events = ctx.create_stream(vec![ChatMessage::system(prompt)]);
        while let Some(event) = events.recv().await {
            match event {
                ContextEvent::TextDelta { delta } => {
                    let _ = tx.send(ResearchEvent::TextDelta { delta });
                }
                ContextEvent::ReasoningDelta { delta } => {
                    let _ = tx.send(ResearchEvent::ReasoningDelta { delta });
                }
                ContextEvent::Interrupted { interruption } => {
                    if interruption.reason != InterruptReason::Finished {
                        tracing::warn!(reason = ?interruption.reason, "accept round failed");
                        return Ok(());
                    }
                    let decision =
                        match serde_json::from_value::<AcceptDecision>(interruption.details) {
                            Ok(decision) => decision,
                            Err(e) => {
                                tracing::warn!(error = %e, "unparseable accept decision");
                                return Ok(());
                            }
                        };
                    let mut state = shared.write().await;
                    let planning = state.planning.as_mut().ok_or(CoreError::NoPlan)?;
                    if decision.accept {
                        planning.accept_item(task_id)?;
                        tracing::info!(task_id, "item accepted");
                    } else {
                        planning.reject_item(task_id, &decision.append_description)?;
                        tracing::info!(task_id, "item sent back for another attempt");
                    }
                    return Ok(());
                }
                ContextEvent::Error { error } => return Err(CoreError::Transport(error)),
                _ => {}
            }
        }

        tracing::warn!(task_id, "accept round ended without a decision");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Planning;
    use crate::testing::{adder_tool, pool_with, ScriptedTransport};

    fn shared_state(tasks: Vec<&str>) -> Arc<RwLock<ResearchState>> {
        let mut state = ResearchState::new("compare sums");
        state.planning = Some(Planning::from_task_list(
            "compare sums",
            tasks.into_iter().map(str::to_string).collect(),
        ));
        Arc::new(RwLock::new(state))
    }

    async fn adder_roster() -> BTreeMap<String, Arc<Worker>> {
        let pool = pool_with(vec![adder_tool("add")]).await;
        let mut workers = BTreeMap::new();
        workers.insert(
            "adder".to_string(),
            Arc::new(Worker::new("adder", "test-model", "adds integers", pool)),
        );
        workers
    }

    #[test]
    fn numeric_task_ids_normalize_to_strings() {
        let decision: AssignDecision =
            serde_json::from_value(json!({"agent_name": "adder", "task_id": 3})).unwrap();
        assert_eq!(decision.task_id, "3");

        let decision: AssignDecision =
            serde_json::from_value(json!({"agent_name": "adder", "task_id": "3"})).unwrap();
        assert_eq!(decision.task_id, "3");
    }

    #[tokio::test]
    async fn reject_then_accept_reattempts_the_item() {
        let transport = Arc::new(ScriptedTransport::new());
        // round 1: assign (numeric id), worker answers, supervisor rejects
        transport.push_tool_turn("assign_next_todo", json!({"agent_name": "adder", "task_id": 1}));
        transport.push_text_turn("21");
        transport.push_tool_turn(
            "accept_agent_response",
            json!({"accept": false, "append_description": "show your working"}),
        );
        // round 2: assign again, worker answers, supervisor accepts
        transport.push_tool_turn(
            "assign_next_todo",
            json!({"agent_name": "adder", "task_id": "1"}),
        );
        transport.push_text_turn("1+20 equals 21");
        transport.push_tool_turn("accept_agent_response", json!({"accept": true}));

        let shared = shared_state(vec!["compute 1+20"]);
        let supervisor = Supervisor::new("test-model", adder_roster().await);

        let (tx, mut rx) = mpsc::unbounded_channel();
        supervisor
            .run(transport, shared.clone(), &tx)
            .await
            .unwrap();
        drop(tx);

        let state = shared.read().await;
        let planning = state.planning.as_ref().unwrap();
        assert!(planning.get_todos().is_empty());

        let item = planning.get_item("1").unwrap();
        assert!(item.done);
        assert_eq!(item.process_records.len(), 1);
        assert!(item.process_records[0].contains("21"));
        assert!(item.description.contains("show your working"));
        assert_eq!(item.result_summary, "\n1+20 equals 21\n");

        let mut assigns = 0;
        let mut updates = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                ResearchEvent::AssignTodo { ref agent_name, .. } => {
                    assert_eq!(agent_name, "adder");
                    assigns += 1;
                }
                ResearchEvent::Planning {
                    action: PlanningAction::Update,
                    ..
                } => updates += 1,
                _ => {}
            }
        }
        assert_eq!(assigns, 2);
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn direct_accept_skips_the_accept_round() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_tool_turn(
            "assign_next_todo",
            json!({"agent_name": "adder", "task_id": "1"}),
        );
        transport.push_text_turn("21");

        let shared = shared_state(vec!["compute 1+20"]);
        let supervisor =
            Supervisor::new("test-model", adder_roster().await).with_reasoning_accept(false);

        let (tx, _rx) = mpsc::unbounded_channel();
        supervisor
            .run(transport.clone(), shared.clone(), &tx)
            .await
            .unwrap();

        let state = shared.read().await;
        assert!(state.planning.as_ref().unwrap().get_todos().is_empty());
        assert_eq!(transport.remaining_turns(), 0);
    }

    #[tokio::test]
    async fn unknown_worker_aborts_with_invalid_parameter() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_tool_turn(
            "assign_next_todo",
            json!({"agent_name": "ghost", "task_id": "1"}),
        );

        let shared = shared_state(vec!["compute 1+20"]);
        let supervisor = Supervisor::new("test-model", adder_roster().await);

        let (tx, mut rx) = mpsc::unbounded_channel();
        supervisor
            .run(transport, shared.clone(), &tx)
            .await
            .unwrap();
        drop(tx);

        let mut saw_invalid = false;
        while let Some(event) = rx.recv().await {
            if let ResearchEvent::InvalidParameter { ref parameter } = event {
                assert_eq!(parameter, "agent_name");
                saw_invalid = true;
            }
        }
        assert!(saw_invalid);
        // the item was never worked on
        let state = shared.read().await;
        assert_eq!(state.planning.as_ref().unwrap().get_todos().len(), 1);
    }

    #[tokio::test]
    async fn unknown_task_id_aborts_with_invalid_parameter() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_tool_turn(
            "assign_next_todo",
            json!({"agent_name": "adder", "task_id": "42"}),
        );

        let shared = shared_state(vec!["compute 1+20"]);
        let supervisor = Supervisor::new("test-model", adder_roster().await);

        let (tx, mut rx) = mpsc::unbounded_channel();
        supervisor.run(transport, shared, &tx).await.unwrap();
        drop(tx);

        let mut saw_invalid = false;
        while let Some(event) = rx.recv().await {
            if let ResearchEvent::InvalidParameter { ref parameter } = event {
                assert_eq!(parameter, "task_id");
                saw_invalid = true;
            }
        }
        assert!(saw_invalid);
    }
}
