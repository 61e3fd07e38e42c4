//! Duplex WebSocket link to the game process.
//!
//! Two listeners run side by side: a control channel that carries framed
//! text traffic and an image channel that streams screenshots. The
//! [`ConnectionRegistry`] tracks open sockets per channel, and the
//! [`MessageRouter`] turns inbound frames into log updates and agent
//! prompts.

mod image;
mod registry;
mod router;
mod server;

use std::fmt;

pub use image::{ImageSink, LatestFrameStore};
pub use registry::{Connection, ConnectionRegistry};
pub use router::MessageRouter;
pub use server::serve;

/// Which of the two listeners a socket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Framed control traffic: chat messages, sync, ready/busy signals.
    Control,
    /// Marker-prefixed JPEG frames from the game camera.
    ImageStream,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Control => write!(f, "control"),
            ChannelKind::ImageStream => write!(f, "image-stream"),
        }
    }
}
