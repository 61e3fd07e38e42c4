//! Top-level wiring: owns every shared component and drives the agent
//! event loop that turns tool emissions into wire and log side effects.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

use crate::actions::{ActionView, PendingActionQueue};
use crate::agent::{AgentEvent, ConversationOrchestrator, OrchestratorConfig, Persona};
use crate::audit::AuditLog;
use crate::error::{ActionError, AgentError, WireError};
use crate::llm::{LlmClient, OpenAiClient};
use crate::messages::{MessageLog, MessageLogEntry, MessagePayload, PlaceboBoard, PlaceboOption};
use crate::protocol::token;
use crate::settings::Settings;
use crate::tools::{Tool, ToolContext};
use crate::wire::{self, ConnectionRegistry, ImageSink, LatestFrameStore, MessageRouter};

/// Knobs the supervisor needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub persona: Persona,
    pub auto_accept: bool,
    pub log_dir: PathBuf,
    pub max_tool_rounds: usize,
    pub max_tokens: u32,
}

impl From<&Settings> for SupervisorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            persona: settings.persona,
            auto_accept: settings.auto_accept,
            log_dir: settings.log_dir.clone(),
            max_tool_rounds: settings.max_tool_rounds,
            max_tokens: settings.max_tokens,
        }
    }
}

/// Owns the agent, the pending-action queue, the message log, and the
/// wire router, and mediates between all of them.
///
/// Tools never touch the wire directly; they emit [`AgentEvent`]s that
/// the event loop here turns into frames, log entries, and audit lines.
pub struct Supervisor {
    registry: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
    queue: Arc<PendingActionQueue>,
    orchestrator: Arc<ConversationOrchestrator>,
    log: Arc<Mutex<MessageLog>>,
    placebo: Mutex<PlaceboBoard>,
    audit: Arc<AuditLog>,
    frames: Arc<LatestFrameStore>,
    events: Mutex<Option<mpsc::UnboundedReceiver<AgentEvent>>>,
}

impl Supervisor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        extra_tools: Vec<Arc<dyn Tool>>,
        config: SupervisorConfig,
    ) -> Arc<Self> {
        let audit = Arc::new(AuditLog::new(config.log_dir));
        let (tx, rx) = mpsc::unbounded_channel();

        let queue = Arc::new(PendingActionQueue::new(
            Arc::clone(&audit),
            ToolContext::new(tx.clone()),
        ));
        queue.set_auto_accept(config.auto_accept);

        let orchestrator = Arc::new(ConversationOrchestrator::new(
            llm,
            Arc::clone(&queue),
            tx,
            extra_tools,
            OrchestratorConfig {
                persona: config.persona,
                max_tool_rounds: config.max_tool_rounds,
                max_tokens: config.max_tokens,
            },
        ));

        let registry = ConnectionRegistry::new();
        let log = Arc::new(Mutex::new(MessageLog::new()));
        let frames = Arc::new(LatestFrameStore::new());
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&orchestrator),
            Arc::clone(&log),
            Arc::clone(&audit),
            Arc::clone(&frames) as Arc<dyn ImageSink>,
        ));

        Arc::new(Self {
            registry,
            router,
            queue,
            orchestrator,
            log,
            placebo: Mutex::new(PlaceboBoard::new()),
            audit,
            frames,
            events: Mutex::new(Some(rx)),
        })
    }

    /// Bind both listeners and run until one of them fails.
    pub async fn serve(
        self: &Arc<Self>,
        bind: &str,
        control_port: u16,
        image_port: u16,
    ) -> Result<(), WireError> {
        let control = TcpListener::bind((bind, control_port)).await?;
        let image = TcpListener::bind((bind, image_port)).await?;

        let serve = wire::serve(
            control,
            image,
            Arc::clone(&self.registry),
            Arc::clone(&self.router),
        );

        tokio::select! {
            result = serve => result,
            _ = self.run_event_loop() => Ok(()),
        }
    }

    /// Drain agent events until every sender is gone. Called once;
    /// subsequent calls return immediately.
    pub async fn run_event_loop(&self) {
        let Some(mut rx) = self.events.lock().await.take() else {
            return;
        };
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
    }

    async fn handle_event(&self, event: AgentEvent) {
        match event {
            AgentEvent::Talk { message } => {
                self.deliver_agent_message(&message).await;
            }
            AgentEvent::PlaceboPair { first, second } => {
                let pair = self.placebo.lock().await.add_pair(first, second);
                self.router
                    .notify(format!("[AGENT] New placebo reply pair #{pair} awaits a pick."));
            }
            AgentEvent::Stop => {
                self.orchestrator.clear_busy();
                self.router.notify("[AGENT] Agent stopped.");
                if let Err(e) = self.router.send(token::AGENT_READY, b"").await {
                    tracing::warn!(error = %e, "Could not signal ready state");
                }
            }
            AgentEvent::Busy => {
                if let Err(e) = self.router.send(token::AGENT_BUSY, b"").await {
                    tracing::warn!(error = %e, "Could not signal busy state");
                }
            }
        }
    }

    /// Record an agent-authored message and forward it to the game.
    async fn deliver_agent_message(&self, content: &str) {
        self.log.lock().await.append("agent", content);
        self.audit.record("message", "agent", content, "-");

        let payload = MessagePayload {
            sender: "agent".to_string(),
            content: content.to_string(),
        };
        if let Err(e) = self.router.send_json(token::MESSAGE, &payload).await {
            tracing::warn!(error = %e, "Agent message not delivered to peer");
        }
    }

    /// Operator-authored message to the game. Never touches the agent.
    pub async fn submit_message(&self, content: &str) -> Result<(), WireError> {
        self.log.lock().await.append("server", content);
        self.audit.record("message", "server", content, "-");

        let payload = MessagePayload {
            sender: "server".to_string(),
            content: content.to_string(),
        };
        self.router.send_json(token::MESSAGE, &payload).await
    }

    /// Prompt the agent directly, without a wire round-trip.
    pub fn prompt_agent(self: &Arc<Self>, text: &str) -> Result<(), AgentError> {
        self.orchestrator.plan_and_execute(text).map(drop)
    }

    /// Prompt the agent with the latest screenshot attached, if one arrived.
    pub fn prompt_agent_with_snapshot(self: &Arc<Self>, text: &str) -> Result<(), AgentError> {
        match self.frames.latest() {
            Some(frame) => self
                .orchestrator
                .plan_and_execute_with_images(text, vec![OpenAiClient::encode_image(&frame)])
                .map(drop),
            None => self.orchestrator.plan_and_execute(text).map(drop),
        }
    }

    pub async fn execute_action(&self, id: Uuid) -> Result<String, ActionError> {
        self.queue.execute(id).await
    }

    pub async fn deny_action(&self, id: Uuid) -> Result<(), ActionError> {
        self.queue.deny(id).await
    }

    pub async fn edit_action(
        &self,
        id: Uuid,
        new_args: Vec<(String, String)>,
    ) -> Result<(), ActionError> {
        self.queue.edit(id, new_args).await
    }

    pub async fn clear_actions(&self) {
        self.queue.clear().await
    }

    pub async fn actions(&self) -> Vec<ActionView> {
        self.queue.snapshot().await
    }

    /// Forward one placebo candidate to the game and retire its pair.
    /// Returns the chosen text, or `None` for an out-of-range index.
    pub async fn choose_placebo(&self, index: usize) -> Option<String> {
        let chosen = self.placebo.lock().await.choose(index)?;
        self.deliver_agent_message(&chosen).await;
        Some(chosen)
    }

    pub async fn placebo_options(&self) -> Vec<PlaceboOption> {
        self.placebo.lock().await.options().to_vec()
    }

    /// Replace the active persona. The conversation and tool registry are
    /// rebuilt and the prompt gate reopens.
    pub async fn swap_persona(&self, persona: Persona) {
        self.orchestrator.swap_persona(persona).await;
        self.router
            .notify(format!("[AGENT] Persona swapped to {}.", persona.display_name()));
        if let Err(e) = self.router.send(token::AGENT_READY, b"").await {
            tracing::warn!(error = %e, "Could not signal ready state after swap");
        }
    }

    pub async fn persona(&self) -> Persona {
        self.orchestrator.persona().await
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    pub async fn message_log(&self) -> Vec<MessageLogEntry> {
        self.log.lock().await.entries().to_vec()
    }

    pub fn latest_frame(&self) -> Option<bytes::Bytes> {
        self.frames.latest()
    }

    /// Operator-facing notification feed.
    pub fn notices(&self) -> broadcast::Receiver<String> {
        self.router.notices()
    }

    /// Frame-level entry point, for embedders that drive their own
    /// transport instead of the built-in listeners.
    pub fn router(&self) -> Arc<MessageRouter> {
        Arc::clone(&self.router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse};
    use crate::protocol;
    use crate::wire::{ChannelKind, Connection};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct SilentModel;

    #[async_trait]
    impl LlmClient for SilentModel {
        async fn send(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse::default())
        }

        fn model_name(&self) -> &str {
            "silent"
        }
    }

    fn supervisor(dir: &std::path::Path) -> Arc<Supervisor> {
        Supervisor::new(
            Arc::new(SilentModel),
            Vec::new(),
            SupervisorConfig {
                persona: Persona::Placebo,
                auto_accept: false,
                log_dir: dir.to_path_buf(),
                max_tool_rounds: 4,
                max_tokens: 100,
            },
        )
    }

    async fn attach_control(
        sup: &Supervisor,
    ) -> tokio::sync::mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        sup.registry
            .register(Connection::new(ChannelKind::Control, tx))
            .await;
        rx
    }

    #[tokio::test]
    async fn talk_event_logs_and_forwards_to_the_peer() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let mut wire_rx = attach_control(&sup).await;

        sup.handle_event(AgentEvent::Talk {
            message: "spawning a boss".into(),
        })
        .await;

        let log = sup.message_log().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender, "agent");

        let frame = wire_rx.recv().await.unwrap();
        let (tok, payload) = protocol::decode(&frame).unwrap();
        assert_eq!(tok, token::MESSAGE);
        let msg: MessagePayload = serde_json::from_slice(payload).unwrap();
        assert_eq!(msg.sender, "agent");
        assert_eq!(msg.content, "spawning a boss");
    }

    #[tokio::test]
    async fn stop_event_reopens_the_gate_and_signals_ready() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let mut wire_rx = attach_control(&sup).await;

        sup.prompt_agent("hello").unwrap();
        assert!(sup.is_busy());

        sup.handle_event(AgentEvent::Stop).await;
        assert!(!sup.is_busy());

        let frame = wire_rx.recv().await.unwrap();
        let (tok, _) = protocol::decode(&frame).unwrap();
        assert_eq!(tok, token::AGENT_READY);
    }

    #[tokio::test]
    async fn placebo_pick_delivers_and_retires_the_pair() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let mut wire_rx = attach_control(&sup).await;

        sup.handle_event(AgentEvent::PlaceboPair {
            first: "try the left path".into(),
            second: "try the right path".into(),
        })
        .await;
        assert_eq!(sup.placebo_options().await.len(), 2);

        let chosen = sup.choose_placebo(1).await.unwrap();
        assert_eq!(chosen, "try the right path");
        assert!(sup.placebo_options().await.is_empty());

        let frame = wire_rx.recv().await.unwrap();
        let (tok, payload) = protocol::decode(&frame).unwrap();
        assert_eq!(tok, token::MESSAGE);
        let msg: MessagePayload = serde_json::from_slice(payload).unwrap();
        assert_eq!(msg.content, "try the right path");
    }

    #[tokio::test]
    async fn operator_messages_are_sent_as_server() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());
        let mut wire_rx = attach_control(&sup).await;

        sup.submit_message("two minutes left").await.unwrap();

        let log = sup.message_log().await;
        assert_eq!(log[0].sender, "server");

        let frame = wire_rx.recv().await.unwrap();
        let (_, payload) = protocol::decode(&frame).unwrap();
        let msg: MessagePayload = serde_json::from_slice(payload).unwrap();
        assert_eq!(msg.sender, "server");
    }

    #[tokio::test]
    async fn busy_prompt_is_rejected_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path());

        sup.prompt_agent("first").unwrap();
        assert!(matches!(sup.prompt_agent("second"), Err(AgentError::Busy)));
    }
}
