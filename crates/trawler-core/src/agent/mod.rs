//! The research agents: planner, supervisor, workers, summarizer, and the
//! domain hooks that bind them to the conversation engine.

pub mod events;
pub mod hooks;
pub mod planner;
pub mod prompts;
pub mod summary;
pub mod supervisor;
pub mod worker;

pub use events::{PlanningAction, ResearchEvent};
pub use hooks::{ControlHook, WebSearchFormatHook};
pub use planner::Planner;
pub use summary::Summarizer;
pub use supervisor::{AcceptDecision, AssignDecision, Supervisor};
pub use worker::Worker;
