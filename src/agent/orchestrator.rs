//! Conversation orchestrator.
//!
//! Drives the recursive "send conversation, execute requested tools, resend"
//! loop against the model collaborator. A busy flag gates top-level prompts:
//! it is set when a prompt is accepted and cleared only when the `stop` tool
//! actually executes (or the turn fails outright), never merely because the
//! model stopped requesting tools.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::actions::{ActionArgs, PendingAction, PendingActionQueue};
use crate::agent::{AgentEvent, Persona};
use crate::error::AgentError;
use crate::llm::{ChatMessage, CompletionRequest, CompletionResponse, LlmClient, ToolCall};
use crate::tools::builtin::{PlaceboTalkTool, StopTool, TalkTool};
use crate::tools::{Tool, ToolContext, ToolRegistry};

/// Final textual result of one conversation turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub content: String,
}

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub persona: Persona,
    /// Iteration cap on the tool-calling loop; exceeding it aborts the turn.
    pub max_tool_rounds: usize,
    pub max_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            persona: Persona::Reactive,
            max_tool_rounds: 16,
            max_tokens: 600,
        }
    }
}

/// Per-persona conversation state, discarded wholesale on persona swap.
struct Conversation {
    persona: Persona,
    registry: ToolRegistry,
    history: Vec<ChatMessage>,
    temperature: f32,
}

pub struct ConversationOrchestrator {
    llm: Arc<dyn LlmClient>,
    queue: Arc<PendingActionQueue>,
    events: mpsc::UnboundedSender<AgentEvent>,
    /// Context tools registered by the embedder, re-registered on every swap.
    extra_tools: Vec<Arc<dyn Tool>>,
    conversation: Mutex<Conversation>,
    busy: AtomicBool,
    max_tool_rounds: usize,
    max_tokens: u32,
}

impl ConversationOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        queue: Arc<PendingActionQueue>,
        events: mpsc::UnboundedSender<AgentEvent>,
        extra_tools: Vec<Arc<dyn Tool>>,
        config: OrchestratorConfig,
    ) -> Self {
        let conversation = build_conversation(config.persona, &events, &extra_tools);
        Self {
            llm,
            queue,
            events,
            extra_tools,
            conversation: Mutex::new(conversation),
            busy: AtomicBool::new(false),
            max_tool_rounds: config.max_tool_rounds,
            max_tokens: config.max_tokens,
        }
    }

    /// Whether a prompt is currently being processed.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Clear the busy flag. Reached only from the `stop` tool's execution,
    /// via the supervisor's event loop.
    pub fn clear_busy(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    pub async fn persona(&self) -> Persona {
        self.conversation.lock().await.persona
    }

    /// Start a conversation turn from a plain text prompt.
    pub fn plan_and_execute(
        self: &Arc<Self>,
        prompt: impl Into<String>,
    ) -> Result<JoinHandle<Result<TurnOutcome, AgentError>>, AgentError> {
        self.begin_turn(prompt.into(), Vec::new())
    }

    /// Start a conversation turn from a prompt with attached images
    /// (base64 data URLs).
    pub fn plan_and_execute_with_images(
        self: &Arc<Self>,
        prompt: impl Into<String>,
        images: Vec<String>,
    ) -> Result<JoinHandle<Result<TurnOutcome, AgentError>>, AgentError> {
        self.begin_turn(prompt.into(), images)
    }

    /// Accept a prompt if the agent is idle and run it on a background task,
    /// so a slow model round-trip never stalls the connection scheduler.
    /// A busy agent rejects immediately; nothing is buffered.
    fn begin_turn(
        self: &Arc<Self>,
        prompt: String,
        images: Vec<String>,
    ) -> Result<JoinHandle<Result<TurnOutcome, AgentError>>, AgentError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            tracing::info!("Agent busy, rejecting prompt");
            return Err(AgentError::Busy);
        }

        let _ = self.events.send(AgentEvent::Busy);
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome = this.run_turn(prompt, images).await;
            match &outcome {
                Ok(turn) => {
                    tracing::debug!(content = %turn.content, "Turn completed");
                }
                Err(AgentError::ToolRoundLimit { limit }) => {
                    // Busy stays latched; the operator recovers via persona
                    // swap. Terminal error per the loop bound contract.
                    tracing::error!(limit, "Tool-calling loop exceeded its bound");
                }
                Err(e) => {
                    // A failed model round-trip ends the turn; release the
                    // gate so the operator can re-initiate.
                    tracing::error!(error = %e, "Turn failed");
                    this.clear_busy();
                }
            }
            outcome
        }))
    }

    async fn run_turn(
        &self,
        prompt: String,
        images: Vec<String>,
    ) -> Result<TurnOutcome, AgentError> {
        let mut conversation = self.conversation.lock().await;

        let user_turn = if images.is_empty() {
            ChatMessage::user(prompt)
        } else {
            ChatMessage::user_with_images(prompt, images)
        };
        conversation.history.push(user_turn);

        for round in 0..self.max_tool_rounds {
            let request = CompletionRequest {
                messages: conversation.history.clone(),
                tools: conversation.registry.descriptors(),
                temperature: conversation.temperature,
                max_tokens: self.max_tokens,
            };

            let response = self.llm.send(request).await?;
            tracing::debug!(
                round,
                tool_calls = response.tool_calls.len(),
                "Model response"
            );

            conversation.history.push(ChatMessage::assistant(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            if response.tool_calls.is_empty() {
                // The turn's text is final. Busy is untouched: only an
                // executed `stop` reopens the prompt gate.
                return Ok(TurnOutcome {
                    content: response.content,
                });
            }

            self.resolve_tool_calls(&mut conversation, response).await;
        }

        Err(AgentError::ToolRoundLimit {
            limit: self.max_tool_rounds,
        })
    }

    /// Execute every requested tool, collecting string results keyed by call
    /// id onto the history. Gated categories are indirected through the
    /// pending-action queue instead of executing inline.
    async fn resolve_tool_calls(&self, conversation: &mut Conversation, response: CompletionResponse) {
        for call in response.tool_calls {
            let result = self.resolve_one(&conversation.registry, &call).await;
            conversation
                .history
                .push(ChatMessage::tool_output(call.call_id, call.name, result));
        }
    }

    async fn resolve_one(&self, registry: &ToolRegistry, call: &ToolCall) -> String {
        match registry.get(&call.name) {
            None => format!("Tool {} doesn't exist.", call.name),
            Some(tool) if tool.category().requires_gate() => {
                let action =
                    PendingAction::new(tool, ActionArgs::from_value(call.arguments.clone()));
                self.queue.enqueue(action).await
            }
            Some(_) => registry.call(&call.name, call.arguments.clone()).await,
        }
    }

    /// Swap the active persona: the tool registry and the entire conversation
    /// state are rebuilt; the busy gate reopens.
    pub async fn swap_persona(&self, persona: Persona) {
        let mut conversation = self.conversation.lock().await;
        *conversation = build_conversation(persona, &self.events, &self.extra_tools);
        self.busy.store(false, Ordering::SeqCst);
        tracing::info!(%persona, "Swapped persona");
    }

    /// Number of turns on the active conversation, the system prompt included.
    pub async fn history_len(&self) -> usize {
        self.conversation.lock().await.history.len()
    }
}

fn build_conversation(
    persona: Persona,
    events: &mpsc::UnboundedSender<AgentEvent>,
    extra_tools: &[Arc<dyn Tool>],
) -> Conversation {
    let ctx = ToolContext::new(events.clone());
    let mut registry = ToolRegistry::new(ctx);

    registry.register(Arc::new(StopTool));
    if persona.uses_placebo_talk() {
        registry.register(Arc::new(PlaceboTalkTool));
    } else {
        registry.register(Arc::new(TalkTool));
    }
    for tool in extra_tools {
        registry.register(Arc::clone(tool));
    }

    Conversation {
        persona,
        registry,
        history: vec![ChatMessage::system(persona.system_prompt())],
        temperature: persona.temperature(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::error::LlmError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use tempfile::tempdir;

    /// Scripted model double: pops one canned response per call.
    struct ScriptedModel {
        script: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    }

    impl ScriptedModel {
        fn new(script: Vec<Result<CompletionResponse, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedModel {
        async fn send(&self, _req: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.script
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(CompletionResponse::default()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct Fixture {
        orchestrator: Arc<ConversationOrchestrator>,
        events: mpsc::UnboundedReceiver<AgentEvent>,
        _dir: tempfile::TempDir,
    }

    fn fixture(script: Vec<Result<CompletionResponse, LlmError>>, auto_accept: bool) -> Fixture {
        let dir = tempdir().unwrap();
        let audit = Arc::new(AuditLog::new(dir.path()));
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(PendingActionQueue::new(audit, ToolContext::new(tx.clone())));
        queue.set_auto_accept(auto_accept);

        let orchestrator = Arc::new(ConversationOrchestrator::new(
            Arc::new(ScriptedModel::new(script)),
            queue,
            tx,
            Vec::new(),
            OrchestratorConfig {
                max_tool_rounds: 4,
                ..Default::default()
            },
        ));

        Fixture {
            orchestrator,
            events: rx,
            _dir: dir,
        }
    }

    fn text_reply(content: &str) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: content.to_string(),
            tool_calls: Vec::new(),
        })
    }

    fn tool_reply(name: &str, args: serde_json::Value) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                call_id: format!("call_{name}"),
                name: name.to_string(),
                arguments: args,
            }],
        })
    }

    #[tokio::test]
    async fn plain_reply_does_not_clear_busy() {
        let mut f = fixture(vec![text_reply("Done")], false);

        let handle = f.orchestrator.plan_and_execute("make it harder").unwrap();
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.content, "Done");
        assert!(f.orchestrator.is_busy());
        assert_eq!(f.events.recv().await, Some(AgentEvent::Busy));
    }

    #[tokio::test]
    async fn busy_agent_rejects_second_prompt_without_touching_history() {
        let mut f = fixture(vec![text_reply("Done")], false);
        let handle = f.orchestrator.plan_and_execute("first").unwrap();
        handle.await.unwrap().unwrap();

        let len_before = f.orchestrator.history_len().await;
        assert!(matches!(
            f.orchestrator.plan_and_execute("second"),
            Err(AgentError::Busy)
        ));
        assert_eq!(f.orchestrator.history_len().await, len_before);

        // Only the first prompt's busy signal was emitted.
        assert_eq!(f.events.recv().await, Some(AgentEvent::Busy));
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn stop_reopens_the_prompt_gate() {
        let mut f = fixture(
            vec![
                tool_reply("stop", serde_json::json!({})),
                text_reply("Waiting"),
                text_reply("Round two"),
            ],
            true,
        );

        let handle = f.orchestrator.plan_and_execute("hello").unwrap();
        handle.await.unwrap().unwrap();

        // The event loop reacts to Stop by clearing busy; emulate it here.
        loop {
            match f.events.recv().await.unwrap() {
                AgentEvent::Stop => {
                    f.orchestrator.clear_busy();
                    break;
                }
                _ => continue,
            }
        }

        let handle = f.orchestrator.plan_and_execute("again").unwrap();
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.content, "Round two");
    }

    #[tokio::test]
    async fn tool_call_results_are_fed_back_and_resent() {
        // Prompt -> talk tool call -> resend -> "Done". Auto-accept on, so the
        // talk executes and its success string goes back into the history.
        let mut f = fixture(
            vec![
                tool_reply("talk", serde_json::json!({ "message": "hi there" })),
                text_reply("Done"),
            ],
            true,
        );

        let handle = f.orchestrator.plan_and_execute("make it harder").unwrap();
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.content, "Done");

        // system + user + assistant(tool) + tool output + assistant(final)
        assert_eq!(f.orchestrator.history_len().await, 5);

        assert_eq!(f.events.recv().await, Some(AgentEvent::Busy));
        assert_eq!(
            f.events.recv().await,
            Some(AgentEvent::Talk {
                message: "hi there".to_string()
            })
        );
    }

    #[tokio::test]
    async fn gated_call_without_auto_accept_reports_queued() {
        let f = fixture(
            vec![
                tool_reply("talk", serde_json::json!({ "message": "hi" })),
                text_reply("Done"),
            ],
            false,
        );

        let handle = f.orchestrator.plan_and_execute("hello").unwrap();
        handle.await.unwrap().unwrap();

        // The queue holds the talk action, still pending.
        let snapshot = f.orchestrator.queue.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].description.contains("talk"));
    }

    #[tokio::test]
    async fn unknown_tool_is_recoverable() {
        let f = fixture(
            vec![
                tool_reply("fly_to_the_moon", serde_json::json!({})),
                text_reply("Sorry"),
            ],
            false,
        );

        let handle = f.orchestrator.plan_and_execute("go").unwrap();
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.content, "Sorry");
    }

    #[tokio::test]
    async fn endless_tool_requests_hit_the_round_limit() {
        let script = (0..8)
            .map(|_| tool_reply("stop", serde_json::json!({})))
            .collect();
        let f = fixture(script, true);

        let handle = f.orchestrator.plan_and_execute("loop forever").unwrap();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::ToolRoundLimit { limit: 4 }));
    }

    #[tokio::test]
    async fn model_failure_releases_the_gate() {
        let f = fixture(
            vec![Err(LlmError::RequestFailed {
                reason: "socket closed".into(),
            })],
            false,
        );

        let handle = f.orchestrator.plan_and_execute("hello").unwrap();
        assert!(handle.await.unwrap().is_err());
        assert!(!f.orchestrator.is_busy());
    }

    #[tokio::test]
    async fn swap_persona_rebuilds_state_and_tools() {
        let f = fixture(vec![text_reply("x")], false);
        let handle = f.orchestrator.plan_and_execute("hello").unwrap();
        handle.await.unwrap().unwrap();
        assert!(f.orchestrator.is_busy());

        f.orchestrator.swap_persona(Persona::Placebo).await;
        assert!(!f.orchestrator.is_busy());
        assert_eq!(f.orchestrator.persona().await, Persona::Placebo);
        // Fresh history: just the new system prompt.
        assert_eq!(f.orchestrator.history_len().await, 1);

        let conversation = f.orchestrator.conversation.lock().await;
        assert!(conversation.registry.get("talk_placebo").is_some());
        assert!(conversation.registry.get("talk").is_none());
    }
}
