//! Agent core: personas, the conversation orchestrator, and the events tools
//! use to reach the rest of the system.

mod orchestrator;
mod persona;

pub use orchestrator::{ConversationOrchestrator, OrchestratorConfig, TurnOutcome};
pub use persona::Persona;

/// Events emitted by tools and the orchestrator, consumed by the supervisor's
/// event loop. Tools never touch the wire directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The agent wants to say something to the user.
    Talk { message: String },
    /// The placebo persona offered two candidate replies.
    PlaceboPair { first: String, second: String },
    /// The stop tool executed: the turn is over, a new prompt may be accepted.
    Stop,
    /// A prompt was accepted for processing.
    Busy,
}
