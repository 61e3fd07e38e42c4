//! Error types for the supervisor.
//!
//! Errors inside tool dispatch and action execution are always converted to
//! user-visible strings or log entries; they never unwind the conversation
//! loop or crash a connection handler.

use crate::wire::ChannelKind;

/// Errors raised by the control-channel frame codec.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header token exceeds the fixed 8-byte width.
    #[error("Header '{token}' is longer than {max} bytes")]
    HeaderTooLong { token: String, max: usize },

    /// Frame is too short to carry a full header.
    #[error("Frame truncated: {len} bytes, need at least {min}")]
    TruncatedFrame { len: usize, min: usize },

    /// Header bytes are not valid UTF-8.
    #[error("Header is not valid UTF-8")]
    InvalidHeader,

    /// Image-stream frame with no payload behind the marker byte.
    #[error("Image frame is empty")]
    EmptyImageFrame,

    /// Payload failed to parse as the expected JSON shape.
    #[error("Invalid payload for '{token}': {reason}")]
    InvalidPayload { token: String, reason: String },
}

/// Errors on the connection layer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Send attempted with no live peer on the channel.
    #[error("No active {0} connection")]
    NoActiveConnection(ChannelKind),

    /// The peer's outbound queue is gone; the connection is dead.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Listener could not bind or accept.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket handshake with the peer failed.
    #[error("WebSocket handshake failed: {reason}")]
    Handshake { reason: String },

    /// The outgoing frame could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors during tool execution. The registry converts all of these into
/// descriptive strings before they reach the conversation loop.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// A tool returned nothing; callers rely on a non-empty result.
    #[error("Tool '{name}' returned an empty result")]
    EmptyResult { name: String },
}

/// Errors on the pending-action state machine.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ActionError {
    /// Execute/deny/edit attempted on an action already in a terminal state.
    #[error("Action {id} is already {state}")]
    Terminal { id: uuid::Uuid, state: String },

    #[error("No pending action with id {0}")]
    NotFound(uuid::Uuid),
}

/// Errors from the model collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Model request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Invalid model response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Authentication with the model provider failed")]
    AuthFailed,
}

/// Errors surfaced by the conversation orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A prompt arrived while the previous one was still in flight.
    #[error("Agent is busy processing the previous prompt")]
    Busy,

    /// The tool-calling loop hit its iteration cap.
    #[error("Tool-calling loop exceeded {limit} rounds")]
    ToolRoundLimit { limit: usize },

    #[error(transparent)]
    Llm(#[from] LlmError),
}
