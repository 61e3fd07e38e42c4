//! Pending-action queue: the human-in-the-loop gate.
//!
//! Every communication/sync tool call the agent makes is buffered here as an
//! inspectable, editable, approvable unit. State machine:
//! `PENDING --execute--> EXECUTED`, `PENDING --deny--> DENIED`,
//! `PENDING --edit--> PENDING`. Executed and denied are terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::error::ActionError;
use crate::tools::{try_dispatch, Tool, ToolCategory, ToolContext};

/// Lifecycle state of a pending action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Pending,
    Executed,
    Denied,
}

impl ActionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActionState::Pending)
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionState::Pending => "PENDING",
            ActionState::Executed => "EXECUTED",
            ActionState::Denied => "DENIED",
        };
        f.write_str(s)
    }
}

/// Display priority derived from the action's category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPriority {
    High,
    Elevated,
    Normal,
    Low,
}

impl From<ToolCategory> for ActionPriority {
    fn from(category: ToolCategory) -> Self {
        match category {
            ToolCategory::Communication => ActionPriority::High,
            ToolCategory::Sync => ActionPriority::Elevated,
            ToolCategory::Context => ActionPriority::Normal,
            ToolCategory::Other => ActionPriority::Low,
        }
    }
}

/// Arguments stored on an action: either a named mapping or an ordered
/// sequence, chosen once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionArgs {
    Named(serde_json::Map<String, serde_json::Value>),
    Positional(Vec<serde_json::Value>),
}

impl ActionArgs {
    /// Classify a raw argument value from the model: mappings become named
    /// arguments, everything else an ordered sequence.
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => ActionArgs::Named(map),
            serde_json::Value::Array(seq) => ActionArgs::Positional(seq),
            serde_json::Value::Null => ActionArgs::Named(serde_json::Map::new()),
            other => ActionArgs::Positional(vec![other]),
        }
    }

    /// Parameter value handed to the tool on execution.
    pub fn to_params(&self) -> serde_json::Value {
        match self {
            ActionArgs::Named(map) => serde_json::Value::Object(map.clone()),
            ActionArgs::Positional(seq) => serde_json::Value::Array(seq.clone()),
        }
    }

    fn describe(&self) -> String {
        let rendered = match self {
            ActionArgs::Named(map) => map
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", "),
            ActionArgs::Positional(seq) => seq
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        };
        if rendered.is_empty() {
            "NO_ARGS".to_string()
        } else {
            rendered
        }
    }
}

/// One gated tool invocation awaiting operator review.
pub struct PendingAction {
    pub id: Uuid,
    pub category: ToolCategory,
    pub tool_name: String,
    pub args: ActionArgs,
    pub state: ActionState,
    pub created_at: DateTime<Utc>,
    target: Arc<dyn Tool>,
}

impl PendingAction {
    pub fn new(target: Arc<dyn Tool>, args: ActionArgs) -> Self {
        let descriptor = target.descriptor();
        Self {
            id: Uuid::new_v4(),
            category: target.category(),
            tool_name: descriptor.name,
            args,
            state: ActionState::Pending,
            created_at: Utc::now(),
            target,
        }
    }

    /// Human-readable label for the operator's action list.
    pub fn description(&self) -> String {
        format!(
            "[{}] Agent wants to execute {} with args: {}",
            self.category,
            self.tool_name,
            self.args.describe()
        )
    }

    pub fn priority(&self) -> ActionPriority {
        self.category.into()
    }
}

/// Read-only snapshot of an action for the dashboard collaborator.
#[derive(Debug, Clone)]
pub struct ActionView {
    pub id: Uuid,
    pub description: String,
    pub state: ActionState,
    pub category: ToolCategory,
    pub priority: ActionPriority,
}

/// Result the conversation loop feeds back to the model for a gated call.
const QUEUED_RESULT: &str = "Action queued for operator review.";

/// Operator-facing queue of gated actions, most-recent-first.
///
/// Mutation is serialized behind one async mutex so execute/deny/edit are
/// atomic with respect to audit-log reads.
pub struct PendingActionQueue {
    actions: Mutex<Vec<PendingAction>>,
    auto_accept: AtomicBool,
    audit: Arc<AuditLog>,
    ctx: ToolContext,
}

impl PendingActionQueue {
    pub fn new(audit: Arc<AuditLog>, ctx: ToolContext) -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            auto_accept: AtomicBool::new(false),
            audit,
            ctx,
        }
    }

    /// Global auto-accept policy: newly enqueued actions execute immediately
    /// instead of waiting for operator input.
    pub fn set_auto_accept(&self, enabled: bool) {
        self.auto_accept.store(enabled, Ordering::SeqCst);
    }

    pub fn auto_accept(&self) -> bool {
        self.auto_accept.load(Ordering::SeqCst)
    }

    /// Buffer a gated invocation. Returns the string the conversation loop
    /// reports to the model: the real tool output under auto-accept, a
    /// "queued" placeholder otherwise.
    pub async fn enqueue(&self, action: PendingAction) -> String {
        let id = action.id;
        let description = action.description();
        tracing::info!(%id, %description, "Enqueued pending action");
        self.audit
            .record("action", "agent", &description, "PENDING");

        {
            let mut actions = self.actions.lock().await;
            actions.insert(0, action);
        }

        if self.auto_accept() {
            match self.execute_as(id, "auto-accept").await {
                Ok(result) => result,
                // Enqueued a moment ago; cannot be terminal or missing.
                Err(e) => format!("Tool call failed with error: {e}."),
            }
        } else {
            QUEUED_RESULT.to_string()
        }
    }

    /// Execute a pending action on the operator's behalf.
    pub async fn execute(&self, id: Uuid) -> Result<String, ActionError> {
        self.execute_as(id, "operator").await
    }

    async fn execute_as(&self, id: Uuid, author: &str) -> Result<String, ActionError> {
        let mut actions = self.actions.lock().await;
        let action = find(&mut actions, id)?;
        ensure_pending(action)?;

        let outcome = try_dispatch(
            action.target.as_ref(),
            &action.tool_name,
            action.args.to_params(),
            &self.ctx,
        )
        .await;

        let description = action.description();
        let result = match outcome {
            Ok(result) => {
                action.state = ActionState::Executed;
                result
            }
            // The action stays pending; the operator may edit and retry.
            Err(failure) => failure,
        };

        self.audit
            .record("action", author, &description, &action.state.to_string());
        Ok(result)
    }

    /// Deny a pending action. The target is never invoked.
    pub async fn deny(&self, id: Uuid) -> Result<(), ActionError> {
        let mut actions = self.actions.lock().await;
        let action = find(&mut actions, id)?;
        ensure_pending(action)?;

        action.state = ActionState::Denied;
        let description = action.description();
        tracing::info!(%id, "Denied pending action");
        self.audit
            .record("action", "operator", &description, "DENIED");
        Ok(())
    }

    /// Replace a pending action's arguments. Each value is parsed as a
    /// boolean or number literal when possible, else kept as a raw string.
    pub async fn edit(&self, id: Uuid, new_args: Vec<(String, String)>) -> Result<(), ActionError> {
        let mut actions = self.actions.lock().await;
        let action = find(&mut actions, id)?;
        ensure_pending(action)?;

        action.args = match &action.args {
            ActionArgs::Named(_) => ActionArgs::Named(
                new_args
                    .into_iter()
                    .map(|(k, v)| (k, parse_literal(&v)))
                    .collect(),
            ),
            ActionArgs::Positional(_) => ActionArgs::Positional(
                new_args
                    .into_iter()
                    .map(|(_, v)| parse_literal(&v))
                    .collect(),
            ),
        };

        let description = action.description();
        self.audit
            .record("action", "operator", &description, "PENDING");
        Ok(())
    }

    /// Purge terminal actions from the visible list. The audit log keeps its
    /// record of them.
    pub async fn clear(&self) {
        let mut actions = self.actions.lock().await;
        actions.retain(|a| !a.state.is_terminal());
    }

    /// Snapshot for display, most recent first.
    pub async fn snapshot(&self) -> Vec<ActionView> {
        let actions = self.actions.lock().await;
        actions
            .iter()
            .map(|a| ActionView {
                id: a.id,
                description: a.description(),
                state: a.state,
                category: a.category,
                priority: a.priority(),
            })
            .collect()
    }

    #[cfg(test)]
    async fn state_of(&self, id: Uuid) -> Option<ActionState> {
        self.actions
            .lock()
            .await
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.state)
    }

    #[cfg(test)]
    async fn args_of(&self, id: Uuid) -> Option<ActionArgs> {
        self.actions
            .lock()
            .await
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.args.clone())
    }
}

fn find(actions: &mut [PendingAction], id: Uuid) -> Result<&mut PendingAction, ActionError> {
    actions
        .iter_mut()
        .find(|a| a.id == id)
        .ok_or(ActionError::NotFound(id))
}

fn ensure_pending(action: &PendingAction) -> Result<(), ActionError> {
    if action.state.is_terminal() {
        return Err(ActionError::Terminal {
            id: action.id,
            state: action.state.to_string(),
        });
    }
    Ok(())
}

/// Parse an operator-entered value: boolean or number when it reads as one,
/// raw string otherwise.
fn parse_literal(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(v @ (serde_json::Value::Bool(_) | serde_json::Value::Number(_))) => v,
        _ => serde_json::Value::String(raw.to_string()),
    }
}
