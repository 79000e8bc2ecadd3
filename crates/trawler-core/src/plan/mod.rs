//! Research plan model.
//!
//! A [`Planning`] is an ordered list of [`PlanningItem`]s decomposing one
//! root task. Items keep an append-only attempt log; `done` flips to true
//! only through [`Planning::accept_item`]. The markdown renderings feed
//! supervisor and worker prompts and must stay deterministic: the same
//! plan always renders to the same string.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// One unit of work inside a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanningItem {
    /// Unique within the owning plan, stable once assigned.
    pub id: String,
    /// Mutable; the supervisor appends to it when rejecting an attempt.
    pub description: String,
    /// Append-only attempt log.
    #[serde(default)]
    pub process_records: Vec<String>,
    /// Overwritten per attempt; archived into `process_records` on reject.
    #[serde(default)]
    pub result_summary: String,
    #[serde(default)]
    pub done: bool,
    /// Worker most recently assigned to this item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_agent: Option<String>,
}

impl PlanningItem {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    /// Render this item as a markdown section headed at `level`.
    pub fn to_markdown(&self, level: usize, include_progress: bool) -> String {
        let mut md = vec![format!(
            "{} [{}] {}",
            "#".repeat(level),
            self.id,
            self.description
        )];
        if include_progress {
            md.push(format!("{} Attempt records", "#".repeat(level + 1)));
            md.extend(
                self.process_records
                    .iter()
                    .map(|record| format!("  - {record}")),
            );
        }
        md.push(format!("{} Result", "#".repeat(level + 1)));
        md.push(self.result_summary.clone());
        md.join("\n")
    }
}

/// The plan for one root task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Planning {
    /// Immutable after creation.
    pub root_task: String,
    items: Vec<PlanningItem>,
}

impl Planning {
    pub fn new(root_task: impl Into<String>) -> Self {
        Self {
            root_task: root_task.into(),
            items: Vec::new(),
        }
    }

    /// Build a plan from a planner's task list, numbering items from 1.
    pub fn from_task_list(root_task: impl Into<String>, tasks: Vec<String>) -> Self {
        let items = tasks
            .into_iter()
            .enumerate()
            .map(|(i, description)| PlanningItem::new((i + 1).to_string(), description))
            .collect();
        Self {
            root_task: root_task.into(),
            items,
        }
    }

    pub fn add_item(&mut self, item: PlanningItem) -> Result<()> {
        if self.items.iter().any(|i| i.id == item.id) {
            return Err(CoreError::InvalidParameter {
                parameter: format!("duplicate planning item id '{}'", item.id),
            });
        }
        self.items.push(item);
        Ok(())
    }

    pub fn get_item(&self, id: &str) -> Option<&PlanningItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut PlanningItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn list_items(&self) -> &[PlanningItem] {
        &self.items
    }

    /// Items not yet accepted, in plan order.
    pub fn get_todos(&self) -> Vec<&PlanningItem> {
        self.items.iter().filter(|i| !i.done).collect()
    }

    /// Replace an existing item wholesale.
    pub fn update_item(&mut self, id: &str, item: PlanningItem) -> Result<()> {
        match self.item_mut(id) {
            Some(slot) => {
                *slot = item;
                Ok(())
            }
            None => Err(CoreError::UnknownItem { id: id.to_string() }),
        }
    }

    /// Mark an item complete. The only path to `done == true`.
    pub fn accept_item(&mut self, id: &str) -> Result<()> {
        let item = self
            .item_mut(id)
            .ok_or_else(|| CoreError::UnknownItem { id: id.to_string() })?;
        item.done = true;
        Ok(())
    }

    /// Send an item back for another attempt: archive the current result
    /// summary as an attempt record and extend the description with the
    /// supervisor's guidance. `done` stays false.
    pub fn reject_item(&mut self, id: &str, append_description: &str) -> Result<()> {
        let item = self
            .item_mut(id)
            .ok_or_else(|| CoreError::UnknownItem { id: id.to_string() })?;
        item.process_records
            .push(format!("intermediate result: {}", item.result_summary));
        if !append_description.is_empty() {
            item.description.push('\n');
            item.description.push_str(append_description);
        }
        Ok(())
    }

    /// Render the whole plan for prompt embedding.
    pub fn to_markdown(&self, level: usize, with_wrapper: bool, include_progress: bool) -> String {
        let mut md = Vec::new();
        if with_wrapper {
            md.push("```markdown".to_string());
        }
        md.push(format!("{} Task plan", "#".repeat(level)));

        for item in &self.items {
            let status = if item.done { "done" } else { "todo" };
            md.push(format!(
                "\n{} [task id: {}][status: {}] {}\n",
                "#".repeat(level + 1),
                item.id,
                status,
                item.description
            ));
            if include_progress {
                if item.process_records.is_empty() {
                    md.push(format!("{} Attempt records\n\nnone yet", "#".repeat(level + 2)));
                } else {
                    md.push(format!("{} Attempt records", "#".repeat(level + 2)));
                    md.extend(
                        item.process_records
                            .iter()
                            .map(|record| format!("  - {record}")),
                    );
                }
            }
            let result = if item.result_summary.is_empty() {
                "none yet"
            } else {
                &item.result_summary
            };
            md.push(format!("{} Result\n\n{result}", "#".repeat(level + 2)));
        }

        if with_wrapper {
            md.push("```".to_string());
        }
        md.join("\n")
    }
}
