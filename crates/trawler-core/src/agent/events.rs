//! Outward-facing event protocol for a research run.
//!
//! Everything a consumer (CLI, SSE bridge, test harness) sees from
//! [`crate::research::DeepResearch::run`] arrives as one of these.

use serde::{Deserialize, Serialize};

use crate::plan::{Planning, PlanningItem};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanningAction {
    /// Freshly decomposed by the planner.
    Made,
    /// Restored from a checkpoint.
    Load,
    /// Mutated by the supervisor loop.
    Update,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    TextDelta {
        delta: String,
    },
    ReasoningDelta {
        delta: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    ToolCompleted {
        id: String,
        name: String,
        output: Option<String>,
        is_error: bool,
    },
    AssignTodo {
        agent_name: String,
        item: PlanningItem,
    },
    Planning {
        action: PlanningAction,
        planning: Planning,
    },
    InvalidParameter {
        parameter: String,
    },
    InternalServiceError {
        message: String,
    },
    /// Terminal marker; exactly one per run.
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_tag_by_type() {
        let ev = ResearchEvent::AssignTodo {
            agent_name: "adder".to_string(),
            item: PlanningItem::new("1", "compute 1+20"),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "assign_todo");
        assert_eq!(json["agent_name"], "adder");

        let json = serde_json::to_value(ResearchEvent::Finished).unwrap();
        assert_eq!(json["type"], "finished");
    }

    #[test]
    fn planning_action_round_trips() {
        let ev = ResearchEvent::Planning {
            action: PlanningAction::Update,
            planning: Planning::new("root"),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: ResearchEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }
}
