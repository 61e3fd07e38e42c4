//! Tool trait and descriptor types.
//!
//! Descriptors are a declarative parameter table built alongside each tool,
//! rather than derived from signatures at runtime. The registry snapshots them
//! once at registration; the schema offered to the model is contractually tied
//! to what the tool actually accepts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::agent::AgentEvent;
use crate::error::ToolError;

/// Primitive kinds a tool parameter can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Int,
    Float,
    Bool,
    Object,
    Array,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Int => "integer",
            ParamKind::Float => "number",
            ParamKind::Bool => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }
}

/// One declared parameter. Required iff the tool has no default for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Name, description and parameter shape of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// JSON Schema for the parameter mapping, in the strict shape function
    /// calling expects.
    pub fn parameters_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            properties.insert(
                param.name.clone(),
                serde_json::json!({ "type": param.kind.json_type() }),
            );
            if param.required {
                required.push(serde_json::Value::String(param.name.clone()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Category a tool belongs to. Communication and sync tools are side-effecting
/// towards the remote peer, so they pass through the pending-action gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToolCategory {
    Communication,
    Sync,
    Context,
    Other,
}

impl ToolCategory {
    /// Whether invocations must be approved by the operator (or auto-accept).
    pub fn requires_gate(self) -> bool {
        matches!(self, ToolCategory::Communication | ToolCategory::Sync)
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolCategory::Communication => "COMMUNICATION",
            ToolCategory::Sync => "SYNC",
            ToolCategory::Context => "CONTEXT",
            ToolCategory::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// Non-empty string result of a successful tool call.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub result: String,
}

impl ToolOutput {
    pub fn text(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
        }
    }
}

/// Handle tools use to reach the rest of the system.
///
/// Tools never touch the wire or the message log directly; they emit
/// [`AgentEvent`]s consumed by the supervisor's event loop.
#[derive(Clone)]
pub struct ToolContext {
    events: mpsc::UnboundedSender<AgentEvent>,
}

impl ToolContext {
    pub fn new(events: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { events }
    }

    pub fn emit(&self, event: AgentEvent) -> Result<(), ToolError> {
        self.events
            .send(event)
            .map_err(|_| ToolError::ExecutionFailed("agent event loop is gone".to_string()))
    }
}

/// Trait for tools the agent may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declared name, description and parameter table.
    fn descriptor(&self) -> ToolDescriptor;

    fn category(&self) -> ToolCategory {
        ToolCategory::Other
    }

    /// Run the tool. `params` is the argument mapping from the model (or an
    /// argument array for positional invocations).
    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError>;
}

/// Read a string parameter either by name or by position, so both named and
/// positional argument shapes reach the same tool code.
pub fn str_param(params: &serde_json::Value, name: &str, index: usize) -> Result<String, ToolError> {
    let value = match params {
        serde_json::Value::Object(map) => map.get(name),
        serde_json::Value::Array(seq) => seq.get(index),
        _ => None,
    };

    match value {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        // Numbers and booleans are usable as text.
        Some(other) if !other.is_null() => Ok(other.to_string()),
        _ => Err(ToolError::InvalidParameters(format!(
            "missing '{name}' parameter"
        ))),
    }
}
