//! Shared research-run state and checkpointing.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ai::types::Usage;
use crate::error::{CoreError, Result};
use crate::plan::Planning;

/// Everything a research run accumulates. Lives behind a
/// `tokio::sync::RwLock`; the supervisor, workers, and domain hooks all
/// mutate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchState {
    pub session_id: Uuid,
    pub root_task: String,
    pub planning: Option<Planning>,
    /// References gathered by web-search hooks, in discovery order.
    #[serde(default)]
    pub references: Vec<Value>,
    #[serde(default)]
    pub total_usage: Usage,
}

impl ResearchState {
    pub fn new(root_task: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            root_task: root_task.into(),
            planning: None,
            references: Vec::new(),
            total_usage: Usage::default(),
        }
    }
}

/// Checkpoint persistence. A run dumps after every supervisor round so a
/// crashed session resumes from the last accepted item.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<Option<ResearchState>>;
    async fn dump(&self, state: &ResearchState) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    updated_at: DateTime<Utc>,
    state: ResearchState,
}

/// Single-file JSON checkpoint store.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<Option<ResearchState>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoreError::Store(format!("read checkpoint: {e}"))),
        };
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            path = %self.path.display(),
            updated_at = %checkpoint.updated_at,
            "loaded checkpoint"
        );
        Ok(Some(checkpoint.state))
    }

    async fn dump(&self, state: &ResearchState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Store(format!("create checkpoint dir: {e}")))?;
        }
        let checkpoint = Checkpoint {
            updated_at: Utc::now(),
            state: state.clone(),
        };
        let json = serde_json::to_vec_pretty(&checkpoint)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| CoreError::Store(format!("write checkpoint: {e}")))?;
        Ok(())
    }
}
