//! Tool registry: lookup by name and never-failing dispatch.

use std::sync::Arc;

use crate::tools::{Tool, ToolContext, ToolDescriptor};

/// Registered tools plus descriptor snapshots taken at registration time.
///
/// The registry is immutable once built; swapping the agent persona rebuilds
/// it wholesale.
pub struct ToolRegistry {
    tools: Vec<(Arc<dyn Tool>, ToolDescriptor)>,
    ctx: ToolContext,
}

impl ToolRegistry {
    pub fn new(ctx: ToolContext) -> Self {
        Self {
            tools: Vec::new(),
            ctx,
        }
    }

    /// Register a tool, snapshotting its descriptor.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let descriptor = tool.descriptor();
        tracing::debug!(tool = %descriptor.name, "Registered tool");
        self.tools.push((tool, descriptor));
    }

    /// Descriptor snapshots, in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|(_, d)| d.clone()).collect()
    }

    /// JSON parameter schemas in the shape function calling expects, keyed
    /// by tool name.
    pub fn schemas(&self) -> Vec<(String, serde_json::Value)> {
        self.tools
            .iter()
            .map(|(_, d)| (d.name.clone(), d.parameters_schema()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|(_, d)| d.name == name)
            .map(|(t, _)| Arc::clone(t))
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Invoke a tool by name. Always returns a string: the tool's result, or
    /// a descriptive failure the conversation loop can feed back to the model.
    pub async fn call(&self, name: &str, args: serde_json::Value) -> String {
        match self.get(name) {
            Some(tool) => dispatch(tool.as_ref(), name, args, &self.ctx).await,
            None => format!("Tool {name} doesn't exist."),
        }
    }
}

/// Run one tool invocation, converting every failure into a descriptive
/// string. Shared by the registry and the pending-action queue so gated and
/// inline calls report identically.
pub async fn dispatch(
    tool: &dyn Tool,
    name: &str,
    args: serde_json::Value,
    ctx: &ToolContext,
) -> String {
    match try_dispatch(tool, name, args, ctx).await {
        Ok(result) => result,
        Err(failure) => failure,
    }
}

/// Like [`dispatch`], but keeps success and failure apart for callers that
/// track outcome (the pending-action queue). Both sides are ready-made
/// user-visible strings.
pub async fn try_dispatch(
    tool: &dyn Tool,
    name: &str,
    args: serde_json::Value,
    ctx: &ToolContext,
) -> Result<String, String> {
    match tool.execute(args, ctx).await {
        Ok(output) if output.result.is_empty() => {
            tracing::warn!(tool = name, "Tool returned an empty result");
            Err(format!(
                "Tool {name} returned no output; this violates the tool contract."
            ))
        }
        Ok(output) => Ok(output.result),
        Err(e) => {
            tracing::warn!(tool = name, error = %e, "Tool call failed");
            Err(format!("Tool call failed with error: {e}."))
        }
    }
}
