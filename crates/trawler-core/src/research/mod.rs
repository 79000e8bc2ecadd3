//! Research run orchestration.
//!
//! [`DeepResearch`] wires the planner, supervisor, and summarizer over a
//! shared [`ResearchState`]: restore or make a plan, work the todos, then
//! stream a final answer. Consumers read a single event stream; any
//! otherwise-uncaught failure arrives as `InternalServiceError`, never a
//! panic, and every run ends with `Finished`.

pub mod state;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::agent::events::{PlanningAction, ResearchEvent};
use crate::agent::planner::Planner;
use crate::agent::summary::Summarizer;
use crate::agent::supervisor::Supervisor;
use crate::agent::worker::Worker;
use crate::ai::transport::CompletionTransport;
use crate::error::Result;

pub use state::{JsonFileStore, ResearchState, StateStore};

pub const DEFAULT_MAX_PLANNING_ITEMS: usize = 10;

pub struct DeepResearch {
    default_model: String,
    transport: Arc<dyn CompletionTransport>,
    workers: BTreeMap<String, Arc<Worker>>,
    reasoning_accept: bool,
    max_planning_items: usize,
    store: Option<Arc<dyn StateStore>>,
}

impl DeepResearch {
    pub fn new(default_model: impl Into<String>, transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            default_model: default_model.into(),
            transport,
            workers: BTreeMap::new(),
            reasoning_accept: true,
            max_planning_items: DEFAULT_MAX_PLANNING_ITEMS,
            store: None,
        }
    }

    pub fn with_worker(mut self, worker: Worker) -> Self {
        self.workers.insert(worker.name.clone(), Arc::new(worker));
        self
    }

    pub fn with_reasoning_accept(mut self, reasoning_accept: bool) -> Self {
        self.reasoning_accept = reasoning_accept;
        self
    }

    pub fn with_max_planning_items(mut self, max_planning_items: usize) -> Self {
        self.max_planning_items = max_planning_items;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run the research session on a spawned task. The returned stream ends
    /// with exactly one `Finished`.
    pub fn run(self, state: ResearchState) -> mpsc::UnboundedReceiver<ResearchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            if let Err(e) = self.drive(state, &tx).await {
                tracing::error!(error = %e, "research run failed");
                let _ = tx.send(ResearchEvent::InternalServiceError {
                    message: e.to_string(),
                });
            }
            let _ = tx.send(ResearchEvent::Finished);
        });
        rx
    }

    async fn drive(
        &self,
        state: ResearchState,
        tx: &mpsc::UnboundedSender<ResearchEvent>,
    ) -> Result<()> {
        let shared = Arc::new(RwLock::new(state));

        let existing = { shared.read().await.planning.clone() };
        match existing {
            None => {
                let root_task = { shared.read().await.root_task.clone() };
                let planner = Planner::new(&self.default_model, self.max_planning_items);
                let planning = planner.run(self.transport.clone(), &root_task, tx).await?;
                {
                    shared.write().await.planning = Some(planning.clone());
                }
                let _ = tx.send(ResearchEvent::Planning {
                    action: PlanningAction::Made,
                    planning,
                });
                if let Some(store) = &self.store {
                    let state = shared.read().await;
                    store.dump(&state).await?;
                }
            }
            Some(planning) => {
                tracing::info!(items = planning.list_items().len(), "restored plan");
                let _ = tx.send(ResearchEvent::Planning {
                    action: PlanningAction::Load,
                    planning,
                });
            }
        }

        let todos_remain = {
            let state = shared.read().await;
            state
                .planning
                .as_ref()
                .is_some_and(|p| !p.get_todos().is_empty())
        };
        if todos_remain {
            let mut supervisor = Supervisor::new(&self.default_model, self.workers.clone())
                .with_reasoning_accept(self.reasoning_accept);
            if let Some(store) = &self.store {
                supervisor = supervisor.with_store(store.clone());
            }
            supervisor
                .run(self.transport.clone(), shared.clone(), tx)
                .await?;
        }

        Summarizer::new(&self.default_model)
            .run(self.transport.clone(), shared, tx)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Planning;
    use crate::testing::{adder_tool, comparer_tool, pool_with, ScriptedTransport};
    use serde_json::json;
    use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};

    async fn research(transport: Arc<ScriptedTransport>) -> DeepResearch {
        let adder = Worker::new(
            "adder",
            "test-model",
            "adds two integers",
            pool_with(vec![adder_tool("add")]).await,
        );
        let comparer = Worker::new(
            "comparer",
            "test-model",
            "compares two integers",
            pool_with(vec![comparer_tool("compare")]).await,
        );
        DeepResearch::new("test-model", transport)
            .with_worker(adder)
            .with_worker(comparer)
    }

    fn script_sum_comparison(transport: &ScriptedTransport) {
        // planner
        transport.push_tool_turn(
            "save_planning",
            json!({"task_list": ["compute 1+23", "compute 7+19", "compare the two sums"]}),
        );
        transport.push_text_turn("done");
        // item 1: adder
        transport.push_tool_turn(
            "assign_next_todo",
            json!({"agent_name": "adder", "task_id": "1"}),
        );
        transport.push_tool_turn("add", json!({"a": 1, "b": 23}));
        transport.push_text_turn("1+23 is 24");
        transport.push_tool_turn("accept_agent_response", json!({"accept": true}));
        // item 2: adder
        transport.push_tool_turn(
            "assign_next_todo",
            json!({"agent_name": "adder", "task_id": "2"}),
        );
        transport.push_tool_turn("add", json!({"a": 7, "b": 19}));
        transport.push_text_turn("7+19 is 26");
        transport.push_tool_turn("accept_agent_response", json!({"accept": true}));
        // item 3: comparer
        transport.push_tool_turn(
            "assign_next_todo",
            json!({"agent_name": "comparer", "task_id": "3"}),
        );
        transport.push_tool_turn("compare", json!({"a": 24, "b": 26}));
        transport.push_text_turn("26 is the larger sum");
        transport.push_tool_turn("accept_agent_response", json!({"accept": true}));
        // summary
        transport.push_text_turn("7+19 = 26 is larger than 1+23 = 24");
    }

    #[tokio::test]
    async fn full_run_plans_works_and_summarizes() -> anyhow::Result<()> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("trawler_core=debug")
            .with_test_writer()
            .try_init();

        let transport = Arc::new(ScriptedTransport::new());
        script_sum_comparison(&transport);

        let dir = tempfile::tempdir()?;
        let store = Arc::new(JsonFileStore::new(dir.path().join("session.json")));
        let service = research(transport.clone()).await.with_store(store.clone());

        let rx = service.run(ResearchState::new("compare (1+23) and (7+19)"));
        let events: Vec<ResearchEvent> = UnboundedReceiverStream::new(rx).collect().await;

        // terminal marker is last and unique
        assert_eq!(events.last(), Some(&ResearchEvent::Finished));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ResearchEvent::Finished))
                .count(),
            1
        );
        assert!(!events
            .iter()
            .any(|e| matches!(e, ResearchEvent::InternalServiceError { .. })));

        let made = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    ResearchEvent::Planning {
                        action: PlanningAction::Made,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(made, 1);

        let assignees: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                ResearchEvent::AssignTodo { agent_name, item } => {
                    Some(format!("{agent_name}:{}", item.id))
                }
                _ => None,
            })
            .collect();
        assert_eq!(assignees, ["adder:1", "adder:2", "comparer:3"]);

        let updates: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                ResearchEvent::Planning {
                    action: PlanningAction::Update,
                    planning,
                } => Some(planning.get_todos().len()),
                _ => None,
            })
            .collect();
        // todos shrink monotonically, one accept per round
        assert_eq!(updates, [2, 1, 0]);

        // the checkpoint reflects the finished plan
        let checkpoint = store.load().await?.expect("checkpoint written");
        let planning = checkpoint.planning.expect("plan persisted");
        assert!(planning.get_todos().is_empty());
        assert_eq!(planning.get_item("1").unwrap().result_summary, "\n1+23 is 24\n");

        // the summary text arrived after the last plan update
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                ResearchEvent::TextDelta { delta } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert!(text.ends_with("7+19 = 26 is larger than 1+23 = 24"));
        assert_eq!(transport.remaining_turns(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn restored_plan_skips_the_planner() {
        let transport = Arc::new(ScriptedTransport::new());
        // only the summary turn: the restored plan has no todos
        transport.push_text_turn("already finished");

        let mut state = ResearchState::new("compare sums");
        let mut planning = Planning::from_task_list("compare sums", vec!["compute".to_string()]);
        planning.item_mut("1").unwrap().result_summary = "24".to_string();
        planning.accept_item("1").unwrap();
        state.planning = Some(planning);

        let mut rx = research(transport).await.run(state);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(
            events[0],
            ResearchEvent::Planning {
                action: PlanningAction::Load,
                ..
            }
        ));
        assert_eq!(events.last(), Some(&ResearchEvent::Finished));
    }

    #[tokio::test]
    async fn planner_failure_surfaces_as_service_error_then_finished() {
        let transport = Arc::new(ScriptedTransport::new());
        // empty script: the first transport call fails

        let mut rx = research(transport).await.run(ResearchState::new("task"));
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(
            events[events.len() - 2],
            ResearchEvent::InternalServiceError { .. }
        ));
        assert_eq!(events.last(), Some(&ResearchEvent::Finished));
    }
}
