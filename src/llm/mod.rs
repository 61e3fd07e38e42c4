//! Model collaborator boundary.
//!
//! The orchestrator talks to the language model exclusively through
//! [`LlmClient`], so provider backends are swappable. Conversation history is
//! owned by the orchestrator and sent whole on every call.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::tools::ToolDescriptor;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Provider-assigned call id; tool outputs are keyed by it.
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One turn of conversation history.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Base64-encoded images attached to a user turn.
    pub images: Vec<String>,
    /// Set on tool-output turns: the call this output answers.
    pub tool_call_id: Option<String>,
    /// Set on tool-output turns: the tool's name.
    pub name: Option<String>,
    /// Set on assistant turns that requested tools.
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn user_with_images(content: impl Into<String>, images: Vec<String>) -> Self {
        let mut msg = Self::plain(Role::User, content);
        msg.images = images;
        msg
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::plain(Role::Assistant, content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// A tool-output turn, answering `call_id`.
    pub fn tool_output(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        let mut msg = Self::plain(Role::Tool, result);
        msg.tool_call_id = Some(call_id.into());
        msg.name = Some(name.into());
        msg
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
            tool_call_id: None,
            name: None,
            tool_calls: Vec::new(),
        }
    }
}

/// A full completion request: system prompt + history + tool schemas.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDescriptor>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// The model's reply: free text plus zero or more tool invocations.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Provider-agnostic model client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the accumulated conversation and receive one assistant turn.
    async fn send(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Provider/model identifier, for logs.
    fn model_name(&self) -> &str;
}
