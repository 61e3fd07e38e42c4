//! Runtime configuration, read from CLI flags and environment variables.

use std::io::Write;
use std::net::UdpSocket;
use std::path::PathBuf;

use clap::Parser;

use crate::agent::Persona;

/// Mediator between a live game process and a tool-calling design agent.
#[derive(Debug, Clone, Parser)]
#[command(name = "warden", version, about)]
pub struct Settings {
    /// Address both listeners bind to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the framed control channel.
    #[arg(long, default_value_t = 5001)]
    pub control_port: u16,

    /// Port for the screenshot stream.
    #[arg(long, default_value_t = 5000)]
    pub image_port: u16,

    /// Persona the agent starts with.
    #[arg(long, value_enum, default_value_t = Persona::Reactive)]
    pub persona: Persona,

    /// Chat-completions model name.
    #[arg(long, env = "WARDEN_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// API key for the model endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    pub api_key: String,

    /// Base URL of the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    pub base_url: String,

    /// Execute queued agent actions without operator approval.
    #[arg(long)]
    pub auto_accept: bool,

    /// Directory audit session files are written to.
    #[arg(long, default_value = "WardenLogs")]
    pub log_dir: PathBuf,

    /// Where to write the connection file the game client reads.
    #[arg(long, default_value = "peer.cfg")]
    pub peer_config: PathBuf,

    /// Upper bound on tool-calling rounds within one turn.
    #[arg(long, default_value_t = 16)]
    pub max_tool_rounds: usize,

    /// Completion token cap per model call.
    #[arg(long, default_value_t = 600)]
    pub max_tokens: u32,
}

impl Settings {
    /// Write the plaintext connection file the game client reads on startup.
    pub fn write_peer_config(&self) -> std::io::Result<PathBuf> {
        let address = advertised_address();
        let mut file = std::fs::File::create(&self.peer_config)?;
        writeln!(file, "# Place this file in the game's persistent data folder.")?;
        writeln!(file, "WS_ADDRESS = ws://{address}")?;
        writeln!(file, "CONTROL_PORT = {}", self.control_port)?;
        writeln!(file, "IMAGE_PORT = {}", self.image_port)?;
        Ok(self.peer_config.clone())
    }
}

/// Best-effort LAN address of this host, for the peer config. Connecting a
/// UDP socket never sends a packet; it only resolves the local endpoint.
fn advertised_address() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|sock| {
            sock.connect("10.254.254.254:1")?;
            sock.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}
