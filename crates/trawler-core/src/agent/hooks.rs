//! Domain hooks layered onto the conversation engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::ai::types::ToolCall;
use crate::context::hooks::{HookDecision, PostToolHook};
use crate::context::state::{InterruptReason, State};
use crate::research::state::ResearchState;

/// Forces a structural decision out of a single-tool engine: every call to
/// a watched tool ends the conversation, success or not. The supervisor
/// reads the decision out of the interruption details instead of letting
/// the model keep talking.
pub struct ControlHook {
    tools: Vec<String>,
}

impl ControlHook {
    pub fn new<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PostToolHook for ControlHook {
    async fn post_tool_call(
        &self,
        call: &ToolCall,
        output: Option<&str>,
        error: Option<&str>,
        _state: &mut State,
    ) -> HookDecision {
        if !self.tools.iter().any(|t| t == &call.name) {
            return HookDecision::Continue;
        }
        if let Some(error) = error {
            return HookDecision::Interrupt {
                reason: InterruptReason::ToolFailed,
                details: serde_json::json!({ "error": error }),
            };
        }
        let details = output
            .map(|raw| {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
            })
            .unwrap_or(Value::Null);
        HookDecision::Interrupt {
            reason: InterruptReason::Finished,
            details,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    references: Vec<Value>,
}

/// Rewrites raw web-search tool output into the `[summary]…[references]…`
/// block the model consumes, and mirrors the references into the shared
/// research state.
pub struct WebSearchFormatHook {
    state: Arc<RwLock<ResearchState>>,
    tool_name: String,
}

impl WebSearchFormatHook {
    pub fn new(state: Arc<RwLock<ResearchState>>) -> Self {
        Self {
            state,
            tool_name: "web_search".to_string(),
        }
    }

    pub fn for_tool(state: Arc<RwLock<ResearchState>>, tool_name: impl Into<String>) -> Self {
        Self {
            state,
            tool_name: tool_name.into(),
        }
    }

    fn render(envelope: &SearchEnvelope) -> String {
        let references = envelope
            .references
            .iter()
            .map(|r| {
                r.get("url")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| r.to_string())
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "[summary]\n{}\n[references]\n{}",
            envelope.summary, references
        )
    }
}

#[async_trait]
impl PostToolHook for WebSearchFormatHook {
    async fn post_tool_call(
        &self,
        call: &ToolCall,
        output: Option<&str>,
        _error: Option<&str>,
        state: &mut State,
    ) -> HookDecision {
        if call.name != self.tool_name {
            return HookDecision::Continue;
        }
        let Some(raw) = output else {
            return HookDecision::Continue;
        };
        let content = match serde_json::from_str::<SearchEnvelope>(raw) {
            Ok(envelope) => {
                if !envelope.references.is_empty() {
                    let mut shared = self.state.write().await;
                    shared.references.extend(envelope.references.iter().cloned());
                }
                Self::render(&envelope)
            }
            Err(e) => {
                tracing::error!(error = %e, tool = %call.name, "failed to process search result");
                format!("failed to process web search result: {e}")
            }
        };
        if let Some(last) = state.messages.last_mut() {
            last.content = content;
        }
        HookDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::ChatMessage;
    use serde_json::json;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "call-1".to_string(),
            name: name.to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn control_hook_passes_unwatched_tools() {
        let hook = ControlHook::new(["assign_next_todo"]);
        let mut state = State::new("m");
        let decision = hook
            .post_tool_call(&call("other_tool"), Some("ok"), None, &mut state)
            .await;
        assert!(matches!(decision, HookDecision::Continue));
    }

    #[tokio::test]
    async fn control_hook_finishes_with_structured_details() {
        let hook = ControlHook::new(["assign_next_todo"]);
        let mut state = State::new("m");
        let payload = json!({"agent_name": "adder", "task_id": "1"}).to_string();
        let decision = hook
            .post_tool_call(&call("assign_next_todo"), Some(&payload), None, &mut state)
            .await;
        match decision {
            HookDecision::Interrupt { reason, details } => {
                assert_eq!(reason, InterruptReason::Finished);
                assert_eq!(details["agent_name"], "adder");
            }
            other => panic!("expected Interrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn control_hook_surfaces_tool_failure() {
        let hook = ControlHook::new(["accept_agent_response"]);
        let mut state = State::new("m");
        let decision = hook
            .post_tool_call(
                &call("accept_agent_response"),
                None,
                Some("boom"),
                &mut state,
            )
            .await;
        match decision {
            HookDecision::Interrupt { reason, details } => {
                assert_eq!(reason, InterruptReason::ToolFailed);
                assert_eq!(details["error"], "boom");
            }
            other => panic!("expected Interrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn web_search_hook_rewrites_message_and_mirrors_references() {
        let shared = Arc::new(RwLock::new(ResearchState::new("task")));
        let hook = WebSearchFormatHook::new(shared.clone());

        let raw = json!({
            "summary": "rust is a systems language",
            "references": [{"url": "https://rust-lang.org"}]
        })
        .to_string();

        let mut state = State::new("m");
        state
            .messages
            .push(ChatMessage::tool("call-1", raw.clone(), false));

        let decision = hook
            .post_tool_call(&call("web_search"), Some(&raw), None, &mut state)
            .await;
        assert!(matches!(decision, HookDecision::Continue));

        assert_eq!(
            state.messages.last().unwrap().content,
            "[summary]\nrust is a systems language\n[references]\nhttps://rust-lang.org"
        );
        assert_eq!(shared.read().await.references.len(), 1);
    }

    #[tokio::test]
    async fn web_search_hook_ignores_other_tools() {
        let shared = Arc::new(RwLock::new(ResearchState::new("task")));
        let hook = WebSearchFormatHook::new(shared.clone());

        let mut state = State::new("m");
        state
            .messages
            .push(ChatMessage::tool("call-1", "untouched", false));

        hook.post_tool_call(&call("add"), Some("untouched"), None, &mut state)
            .await;
        assert_eq!(state.messages.last().unwrap().content, "untouched");
        assert!(shared.read().await.references.is_empty());
    }
}
