//! Multi-agent deep-research orchestration.
//!
//! The crate is layered bottom-up:
//!
//! - [`ai`]: provider-facing message types and the [`ai::CompletionTransport`]
//!   trait, the single seam to an actual LLM backend.
//! - [`tools`]: the [`tools::Tool`] trait and the [`tools::ToolPool`]
//!   registry with per-call timeouts.
//! - [`context`]: the interruptible conversation engine. A
//!   [`context::Context`] drives one LLM + tool-call loop to a natural stop
//!   or a hook-raised [`context::Interruption`], and can be rebuilt from the
//!   interruption's state to resume exactly where it stopped.
//! - [`plan`]: the research plan model with deterministic markdown
//!   rendering for prompts.
//! - [`agent`]: planner, supervisor, workers, and summarizer built on the
//!   engine, talking to consumers through [`agent::ResearchEvent`]s.
//! - [`research`]: the [`research::DeepResearch`] orchestrator and JSON
//!   checkpointing.
//!
//! ```no_run
//! use std::sync::Arc;
//! use trawler_core::research::{DeepResearch, ResearchState};
//! use trawler_core::agent::{ResearchEvent, Worker};
//! use trawler_core::tools::ToolPool;
//! # async fn example(transport: Arc<dyn trawler_core::ai::CompletionTransport>) {
//! let worker = Worker::new("adder", "my-model", "adds integers", Arc::new(ToolPool::new()));
//! let service = DeepResearch::new("my-model", transport).with_worker(worker);
//! let mut events = service.run(ResearchState::new("compare (1+23) and (7+19)"));
//! while let Some(event) = events.recv().await {
//!     if let ResearchEvent::TextDelta { delta } = event {
//!         print!("{delta}");
//!     }
//! }
//! # }
//! ```

pub mod agent;
pub mod ai;
pub mod context;
pub mod error;
pub mod plan;
pub mod research;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{CoreError, Result};
