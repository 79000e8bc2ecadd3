//! Tool pool: the registry resolving tool names to executable
//! implementations.
//!
//! Tool failures are captured as `ToolResult`s with `is_error = true`;
//! they are never fatal to the conversation engine.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::ai::types::ToolSpec;

/// Default tool execution timeout (2 minutes).
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Tool execution result.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: true,
        }
    }
}

/// Trait for tool implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id).
    fn name(&self) -> &str;

    /// Tool description for the model.
    fn description(&self) -> &str;

    /// JSON schema for parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with parsed arguments.
    async fn execute(&self, params: Value) -> ToolResult;
}

type ToolFuture = BoxFuture<'static, ToolResult>;

/// Adapter turning an async closure into a [`Tool`].
pub struct FunctionTool {
    name: String,
    description: String,
    schema: Value,
    f: Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            f: Arc::new(move |params| Box::pin(f(params))),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, params: Value) -> ToolResult {
        (self.f)(params).await
    }
}

/// Registry resolving tool names to implementations.
pub struct ToolPool {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    default_timeout: Duration,
}

impl Default for ToolPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolPool {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().await;
        tools.insert(name, tool);
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Reload/validate the tool manifest. In-process tools have nothing to
    /// refresh; remote-backed pools override this by re-registering.
    pub async fn refresh_manifest(&self) {
        let tools = self.tools.read().await;
        tracing::debug!(tool_count = tools.len(), "tool manifest refreshed");
    }

    /// All tool definitions, sorted by name for a stable manifest.
    pub async fn specs(&self) -> Vec<ToolSpec> {
        let tools = self.tools.read().await;
        let mut specs: Vec<ToolSpec> = tools
            .values()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Execute a tool by name with the pool timeout.
    ///
    /// Returns `None` for an unknown tool name; the caller decides how to
    /// surface that to the model.
    pub async fn execute(&self, name: &str, params: Value) -> Option<ToolResult> {
        let tool = self.tools.read().await.get(name).cloned()?;
        let start = Instant::now();

        let result = match tokio::time::timeout(self.default_timeout, tool.execute(params)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    tool = name,
                    timeout_secs = self.default_timeout.as_secs(),
                    "tool execution timed out"
                );
                ToolResult::error(format!(
                    "tool '{}' timed out after {}s",
                    name,
                    self.default_timeout.as_secs()
                ))
            }
        };

        tracing::debug!(
            tool = name,
            duration_ms = start.elapsed().as_millis() as u64,
            is_error = result.is_error,
            "tool execution completed"
        );
        Some(result)
    }
}
