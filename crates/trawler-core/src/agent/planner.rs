//! Planner agent: one-shot task decomposition.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::agent::events::ResearchEvent;
use crate::agent::prompts;
use crate::ai::transport::CompletionTransport;
use crate::ai::types::ChatMessage;
use crate::context::state::ContextEvent;
use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::plan::Planning;
use crate::tools::{FunctionTool, ToolPool, ToolResult};

/// Decomposes a root task into a plan via a single non-interruptible
/// engine run. The decomposition arrives as a side effect of the model
/// calling `save_planning`; a run where the model never calls it fails
/// with [`CoreError::NoPlan`].
pub struct Planner {
    model: String,
    max_items: usize,
}

impl Planner {
    pub fn new(model: impl Into<String>, max_items: usize) -> Self {
        Self {
            model: model.into(),
            max_items,
        }
    }

    pub async fn run(
        &self,
        transport: Arc<dyn CompletionTransport>,
        root_task: &str,
        tx: &mpsc::UnboundedSender<ResearchEvent>,
    ) -> Result<Planning> {
        let slot: Arc<Mutex<Option<Vec<String>>>> = Arc::new(Mutex::new(None));
        let captured = slot.clone();

        let pool = ToolPool::new();
        pool.register(Arc::new(FunctionTool::new(
            "save_planning",
            "Save the finished task decomposition",
            json!({
                "type": "object",
                "properties": {
                    "task_list": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "one plain-text description per task"
                    }
                },
                "required": ["task_list"]
            }),
            move |params: Value| {
                let captured = captured.clone();
                async move {
                    let Some(tasks) = params.get("task_list").and_then(|v| {
                        v.as_array().map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect::<Vec<_>>()
                        })
                    }) else {
                        return ToolResult::error("task_list must be an array of strings");
                    };
                    *captured.lock().unwrap_or_else(|p| p.into_inner()) = Some(tasks);
                    ToolResult::success("planning saved.")
                }
            },
        )))
        .await;

        let mut ctx = Context::new(&self.model, transport).with_tools(Arc::new(pool));
        ctx.init().await?;

        let prompt = prompts::planner_prompt(root_task, self.max_items);
        let mut events = ctx.create_stream(vec![ChatMessage::system(prompt)]);

        while let Some(event) = events.recv().await {
            match event {
                ContextEvent::TextDelta { delta } => {
                    let _ = tx.send(ResearchEvent::TextDelta { delta });
                }
                ContextEvent::ReasoningDelta { delta } => {
                    let _ = tx.send(ResearchEvent::ReasoningDelta { delta });
                }
                ContextEvent::Done { .. } => break,
                ContextEvent::Error { error } => return Err(CoreError::Transport(error)),
                ContextEvent::Interrupted { .. } => {
                    return Err(CoreError::Configuration(
                        "planner conversation was interrupted".to_string(),
                    ));
                }
                _ => {}
            }
        }

        let mut tasks = slot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .ok_or(CoreError::NoPlan)?;
        if tasks.len() > self.max_items {
            tracing::warn!(
                produced = tasks.len(),
                max = self.max_items,
                "planner exceeded the item cap; truncating"
            );
            tasks.truncate(self.max_items);
        }

        let planning = Planning::from_task_list(root_task, tasks);
        tracing::info!(items = planning.list_items().len(), "plan created");
        Ok(planning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    #[tokio::test]
    async fn planner_builds_numbered_plan_from_tool_call() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_tool_turn(
            "save_planning",
            json!({"task_list": ["compute 1+20", "compute 22+23", "compare the results"]}),
        );
        transport.push_text_turn("done");

        let planner = Planner::new("test-model", 10);
        let (tx, _rx) = mpsc::unbounded_channel();
        let planning = planner
            .run(transport, "compare (1+20) and (22+23)", &tx)
            .await
            .unwrap();

        let ids: Vec<&str> = planning
            .list_items()
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert_eq!(planning.root_task, "compare (1+20) and (22+23)");
        assert_eq!(planning.get_todos().len(), 3);
    }

    #[tokio::test]
    async fn missing_save_call_is_no_plan() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_text_turn("I would rather chat than plan");

        let planner = Planner::new("test-model", 10);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = planner.run(transport, "anything", &tx).await.unwrap_err();
        assert!(matches!(err, CoreError::NoPlan));
    }

    #[tokio::test]
    async fn overlong_task_list_is_truncated() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_tool_turn(
            "save_planning",
            json!({"task_list": ["a", "b", "c", "d"]}),
        );
        transport.push_text_turn("done");

        let planner = Planner::new("test-model", 2);
        let (tx, _rx) = mpsc::unbounded_channel();
        let planning = planner.run(transport, "task", &tx).await.unwrap();
        assert_eq!(planning.list_items().len(), 2);
    }
}
