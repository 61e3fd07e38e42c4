use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, Mutex};

use crate::agent::ConversationOrchestrator;
use crate::audit::AuditLog;
use crate::error::{AgentError, WireError};
use crate::messages::{MessageLog, MessagePayload, SyncPayload};
use crate::protocol::{self, token};
use crate::wire::{ChannelKind, ConnectionRegistry, ImageSink};

const NOTICE_CAPACITY: usize = 64;

/// Routes inbound frames to the message log, the agent, and the image
/// sink, and pushes outbound frames to the active control connection.
///
/// Malformed or unknown frames are logged and dropped; a bad frame never
/// tears down the connection that carried it.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    orchestrator: Arc<ConversationOrchestrator>,
    log: Arc<Mutex<MessageLog>>,
    audit: Arc<AuditLog>,
    image_sink: Arc<dyn ImageSink>,
    image_seq: AtomicU64,
    notices: broadcast::Sender<String>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        orchestrator: Arc<ConversationOrchestrator>,
        log: Arc<Mutex<MessageLog>>,
        audit: Arc<AuditLog>,
        image_sink: Arc<dyn ImageSink>,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            registry,
            orchestrator,
            log,
            audit,
            image_sink,
            image_seq: AtomicU64::new(0),
            notices,
        }
    }

    /// Operator-facing notification feed.
    pub fn notices(&self) -> broadcast::Receiver<String> {
        self.notices.subscribe()
    }

    pub fn notify(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        let _ = self.notices.send(message);
    }

    /// Handle one inbound frame from an open socket.
    pub async fn on_frame(&self, kind: ChannelKind, data: Vec<u8>) {
        match kind {
            ChannelKind::Control => self.on_control_frame(&data).await,
            ChannelKind::ImageStream => self.on_image_frame(&data),
        }
    }

    async fn on_control_frame(&self, data: &[u8]) {
        let (tok, payload) = match protocol::decode(data) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed control frame");
                return;
            }
        };

        match tok.as_str() {
            token::MESSAGE => match serde_json::from_slice::<MessagePayload>(payload) {
                Ok(msg) => self.on_peer_message(msg).await,
                Err(e) => tracing::warn!(error = %e, "Dropping unparseable message payload"),
            },
            token::MESSAGE_SYNC => match serde_json::from_slice::<SyncPayload>(payload) {
                Ok(snapshot) => {
                    self.log.lock().await.replace(snapshot);
                    self.notify("[SYNC] Synchronized the chat logs.");
                }
                Err(e) => tracing::warn!(error = %e, "Dropping unparseable sync payload"),
            },
            other => {
                tracing::warn!(token = other, "Dropping frame with unknown token");
            }
        }
    }

    async fn on_peer_message(&self, msg: MessagePayload) {
        self.log.lock().await.append(&msg.sender, &msg.content);
        self.audit.record("message", &msg.sender, &msg.content, "-");
        self.notify("[SYNC] Received a new message.");

        match self.orchestrator.plan_and_execute(&msg.content) {
            Ok(handle) => {
                // The turn runs in the background; its outcome surfaces
                // through agent events, not through this frame handler.
                drop(handle);
            }
            Err(AgentError::Busy) => {
                self.notify("[AGENT] Agent is busy, prompt ignored.");
            }
            Err(e) => {
                self.notify(format!("[AGENT] Error: {e}"));
            }
        }
    }

    fn on_image_frame(&self, data: &[u8]) {
        let image = match protocol::strip_image_marker(data) {
            Ok(bytes) => Bytes::copy_from_slice(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed image frame");
                return;
            }
        };

        let seq = self.image_seq.fetch_add(1, Ordering::SeqCst);
        let sink = Arc::clone(&self.image_sink);
        tokio::spawn(async move {
            sink.submit(seq, image).await;
        });
    }

    /// Encode and push a frame to the active control connection.
    pub async fn send(&self, tok: &str, payload: &[u8]) -> Result<(), WireError> {
        let frame = protocol::encode(tok, payload)?;

        let Some(conn) = self.registry.active(ChannelKind::Control).await else {
            self.notify("[WS] Error: No active connection.");
            return Err(WireError::NoActiveConnection(ChannelKind::Control));
        };

        if let Err(e) = conn.send(frame).await {
            // The writer task is gone. Reap the handle so the next send
            // falls back to an older connection, if any.
            self.registry.unregister(ChannelKind::Control, conn.id()).await;
            self.notify("[WS] Error: Connection closed while sending.");
            return Err(e);
        }

        let preview: String = String::from_utf8_lossy(payload).chars().take(40).collect();
        tracing::debug!(token = tok, %preview, "Sent control frame");
        Ok(())
    }

    /// Serialize a payload as JSON and push it under the given token.
    pub async fn send_json<T: serde::Serialize>(
        &self,
        tok: &str,
        payload: &T,
    ) -> Result<(), WireError> {
        let body = serde_json::to_vec(payload).map_err(|e| {
            WireError::Protocol(crate::error::ProtocolError::InvalidPayload {
                token: tok.to_string(),
                reason: e.to_string(),
            })
        })?;
        self.send(tok, &body).await
    }

    /// A socket finished its handshake.
    pub async fn on_open(&self, kind: ChannelKind) {
        self.notify(format!("[WS] {kind} channel connected."));
        if kind == ChannelKind::Control {
            self.audit.open_session();
            let signal = if self.orchestrator.is_busy() {
                token::AGENT_BUSY
            } else {
                token::AGENT_READY
            };
            if let Err(e) = self.send(signal, b"").await {
                tracing::warn!(error = %e, "Could not announce agent state to peer");
            }
        }
    }

    /// A socket closed or failed.
    pub async fn on_close(&self, kind: ChannelKind) {
        self.notify(format!("[WS] {kind} channel disconnected."));
        if kind == ChannelKind::Control && self.registry.count(ChannelKind::Control).await == 0 {
            self.audit.close_session();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::PendingActionQueue;
    use crate::agent::OrchestratorConfig;
    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse, LlmClient};
    use crate::tools::ToolContext;
    use crate::wire::{Connection, LatestFrameStore};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    /// Model double that always replies with empty text and no tool calls.
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

    struct Fixture {
        router: Arc<MessageRouter>,
        registry: Arc<ConnectionRegistry>,
        log: Arc<Mutex<MessageLog>>,
        store: Arc<LatestFrameStore>,
        orchestrator: Arc<ConversationOrchestrator>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let audit = Arc::new(AuditLog::new(dir.path()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let queue = Arc::new(PendingActionQueue::new(
            Arc::clone(&audit),
            ToolContext::new(tx.clone()),
        ));
        let orchestrator = Arc::new(ConversationOrchestrator::new(
            Arc::new(SilentModel),
            queue,
            tx,
            Vec::new(),
            OrchestratorConfig::default(),
        ));

        let registry = ConnectionRegistry::new();
        let log = Arc::new(Mutex::new(MessageLog::new()));
        let store = Arc::new(LatestFrameStore::new());
        let router = Arc::new(MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&orchestrator),
            Arc::clone(&log),
            audit,
            Arc::clone(&store) as Arc<dyn ImageSink>,
        ));

        Fixture {
            router,
            registry,
            log,
            store,
            orchestrator,
            _dir: dir,
        }
    }

    fn message_frame(sender: &str, content: &str) -> Vec<u8> {
        let body = serde_json::to_vec(&MessagePayload {
            sender: sender.into(),
            content: content.into(),
        })
        .unwrap();
        protocol::encode(token::MESSAGE, &body).unwrap()
    }

    #[tokio::test]
    async fn message_frame_appends_and_prompts_the_agent() {
        let f = fixture();

        f.router
            .on_frame(ChannelKind::Control, message_frame("user", "hello"))
            .await;

        let log = f.log.lock().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].sender, "user");
        assert!(f.orchestrator.is_busy());
    }

    #[tokio::test]
    async fn sync_frame_replaces_the_log() {
        let f = fixture();
        {
            let mut log = f.log.lock().await;
            log.append("server", "stale one");
            log.append("server", "stale two");
        }

        let body = serde_json::to_vec(&SyncPayload {
            messages: vec![MessagePayload {
                sender: "user".into(),
                content: "fresh".into(),
            }],
        })
        .unwrap();
        let frame = protocol::encode(token::MESSAGE_SYNC, &body).unwrap();
        f.router.on_frame(ChannelKind::Control, frame).await;

        let log = f.log.lock().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].content, "fresh");
    }

    #[tokio::test]
    async fn unknown_and_malformed_frames_are_dropped() {
        let f = fixture();

        let frame = protocol::encode("BOGUS", b"{}").unwrap();
        f.router.on_frame(ChannelKind::Control, frame).await;
        f.router.on_frame(ChannelKind::Control, b"xx".to_vec()).await;

        assert!(f.log.lock().await.is_empty());
        assert!(!f.orchestrator.is_busy());
    }

    #[tokio::test]
    async fn send_without_connection_reports_a_notice() {
        let f = fixture();
        let mut notices = f.router.notices();

        let err = f.router.send(token::MESSAGE, b"{}").await.unwrap_err();
        assert!(matches!(
            err,
            WireError::NoActiveConnection(ChannelKind::Control)
        ));
        assert_eq!(notices.recv().await.unwrap(), "[WS] Error: No active connection.");
    }

    #[tokio::test]
    async fn send_reaches_the_active_connection() {
        let f = fixture();
        let (tx, mut rx) = mpsc::channel(4);
        f.registry
            .register(Connection::new(ChannelKind::Control, tx))
            .await;

        f.router.send(token::AGENT_READY, b"").await.unwrap();

        let frame = rx.recv().await.unwrap();
        let (tok, payload) = protocol::decode(&frame).unwrap();
        assert_eq!(tok, token::AGENT_READY);
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn image_frame_lands_in_the_store() {
        let f = fixture();
        let mut watch = f.store.subscribe();
        watch.borrow_and_update();

        f.router
            .on_frame(ChannelKind::ImageStream, vec![0x01, 0xAA, 0xBB])
            .await;

        tokio::time::timeout(Duration::from_secs(1), watch.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.store.latest().unwrap().as_ref(), &[0xAA, 0xBB]);
    }
}
