//! Shared test doubles: a scripted transport and a few trivial tools.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::ai::transport::{CompletionRequest, CompletionTransport, StreamPart};
use crate::ai::types::{FinishReason, ToolCall};
use crate::error::{CoreError, Result};
use crate::tools::{FunctionTool, Tool, ToolPool, ToolResult};

/// Transport replaying a fixed script of model turns. Each call to
/// `complete_stream` consumes one turn; an exhausted script fails the call.
pub(crate) struct ScriptedTransport {
    turns: Mutex<VecDeque<Vec<StreamPart>>>,
    next_call_id: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            next_call_id: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push_turn(&self, parts: Vec<StreamPart>) {
        self.turns.lock().unwrap().push_back(parts);
    }

    /// A plain text reply ending with a `Stop` finish.
    pub(crate) fn push_text_turn(&self, text: &str) {
        self.push_turn(vec![
            StreamPart::TextDelta { delta: text.into() },
            StreamPart::Finish(FinishReason::Stop),
        ]);
    }

    /// A single tool-call turn.
    pub(crate) fn push_tool_turn(&self, name: &str, arguments: Value) {
        self.push_turn_with_calls(vec![(name, arguments)]);
    }

    /// One model turn requesting several tool calls at once.
    pub(crate) fn push_turn_with_calls(&self, calls: Vec<(&str, Value)>) {
        let mut parts: Vec<StreamPart> = calls
            .into_iter()
            .map(|(name, arguments)| {
                let id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
                StreamPart::ToolCall(ToolCall {
                    id: format!("call-{id}"),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                })
            })
            .collect();
        parts.push(StreamPart::Finish(FinishReason::ToolCalls));
        self.push_turn(parts);
    }

    pub(crate) fn remaining_turns(&self) -> usize {
        self.turns.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn complete_stream(
        &self,
        _request: CompletionRequest,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>> {
        let parts = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoreError::Transport("script exhausted".to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        for part in parts {
            let _ = tx.send(part);
        }
        Ok(rx)
    }
}

/// Integer addition over `{"a": .., "b": ..}` params.
pub(crate) fn adder_tool(name: &str) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        name,
        "Add two integers",
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "integer"}
            },
            "required": ["a", "b"]
        }),
        |params: Value| async move {
            let a = params.get("a").and_then(Value::as_i64);
            let b = params.get("b").and_then(Value::as_i64);
            match (a, b) {
                (Some(a), Some(b)) => ToolResult::success((a + b).to_string()),
                _ => ToolResult::error("expected integer parameters a and b"),
            }
        },
    ))
}

/// Compares `{"a": .., "b": ..}` and names the larger one.
pub(crate) fn comparer_tool(name: &str) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        name,
        "Report which of two integers is larger",
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "integer"}
            },
            "required": ["a", "b"]
        }),
        |params: Value| async move {
            let a = params.get("a").and_then(Value::as_i64);
            let b = params.get("b").and_then(Value::as_i64);
            match (a, b) {
                (Some(a), Some(b)) if a > b => ToolResult::success(format!("{a} > {b}")),
                (Some(a), Some(b)) if a < b => ToolResult::success(format!("{a} < {b}")),
                (Some(a), Some(b)) => ToolResult::success(format!("{a} == {b}")),
                _ => ToolResult::error("expected integer parameters a and b"),
            }
        },
    ))
}

/// A no-op tool counting its executions.
pub(crate) fn counting_tool(name: &str) -> (Arc<dyn Tool>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let captured = count.clone();
    let tool = Arc::new(FunctionTool::new(
        name,
        "Count invocations",
        json!({"type": "object"}),
        move |_params| {
            let captured = captured.clone();
            async move {
                captured.fetch_add(1, Ordering::SeqCst);
                ToolResult::success("ok")
            }
        },
    ));
    (tool, count)
}

pub(crate) async fn pool_with(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolPool> {
    let pool = ToolPool::new();
    for tool in tools {
        pool.register(tool).await;
    }
    Arc::new(pool)
}
