//! Tool system.
//!
//! Tools are the agent's only way to cause side effects. Communication and
//! sync tools are additionally gated by the pending-action queue so the
//! operator can review them before they reach the game.

pub mod builtin;

mod registry;
mod tool;

pub use registry::{dispatch, try_dispatch, ToolRegistry};
pub use tool::{
    str_param, ParamKind, ParamSpec, Tool, ToolCategory, ToolContext, ToolDescriptor, ToolOutput,
};
