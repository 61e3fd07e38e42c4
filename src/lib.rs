//! Human-in-the-loop mediator between an LLM game-design agent and a live
//! game process.
//!
//! The game connects over two WebSocket channels (framed control traffic
//! and a raw screenshot stream). Player messages prompt a tool-calling
//! agent; agent actions that would reach the game are parked in a
//! pending-action queue until a human operator approves, edits, or denies
//! them. Everything operator-visible is audited to per-session CSV files.

pub mod actions;
pub mod agent;
pub mod audit;
pub mod engine;
pub mod error;
pub mod llm;
pub mod messages;
pub mod protocol;
pub mod settings;
pub mod tools;
pub mod wire;

pub use engine::{Supervisor, SupervisorConfig};
pub use settings::Settings;
