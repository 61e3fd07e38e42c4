//! Built-in communication tools.
//!
//! These are the only tools every persona carries: `talk` (or `talk_placebo`
//! for the placebo persona) and `stop`. Game-side context tools are supplied
//! by the embedder.

use async_trait::async_trait;

use crate::agent::AgentEvent;
use crate::error::ToolError;
use crate::tools::{
    str_param, ParamKind, ParamSpec, Tool, ToolCategory, ToolContext, ToolDescriptor, ToolOutput,
};

/// Sends a chat message to the user.
pub struct TalkTool;

#[async_trait]
impl Tool for TalkTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("talk", "Talk to the user")
            .with_param(ParamSpec::required("message", ParamKind::String))
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Communication
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let message = str_param(&params, "message", 0)?;
        tracing::info!(%message, "Agent talk");
        ctx.emit(AgentEvent::Talk { message })?;
        Ok(ToolOutput::text("Message sent successfully"))
    }
}

/// Placebo variant of `talk`: offers two candidate replies, from which a
/// controller (the operator) selects one so the agent does not over-speak.
pub struct PlaceboTalkTool;

#[async_trait]
impl Tool for PlaceboTalkTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "talk_placebo",
            "Talk to the user, providing two possible answers",
        )
        .with_param(ParamSpec::required("response1", ParamKind::String))
        .with_param(ParamSpec::required("response2", ParamKind::String))
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Communication
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let first = str_param(&params, "response1", 0)?;
        let second = str_param(&params, "response2", 1)?;
        tracing::info!(%first, %second, "Agent placebo talk");
        ctx.emit(AgentEvent::PlaceboPair { first, second })?;
        Ok(ToolOutput::text("Messages sent successfully"))
    }
}

/// Ends the agent's turn: clears the busy flag and tells the remote peer a
/// new prompt will be accepted. This is the only path that clears busy.
pub struct StopTool;

#[async_trait]
impl Tool for StopTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("stop", "Stop and wait for the user to talk.")
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Communication
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        tracing::info!("Agent stopped");
        ctx.emit(AgentEvent::Stop)?;
        Ok(ToolOutput::text("Agent stopped successfully"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn context() -> (ToolContext, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ToolContext::new(tx), rx)
    }

    #[tokio::test]
    async fn talk_emits_message_event() {
        let (ctx, mut rx) = context();
        let out = TalkTool
            .execute(serde_json::json!({ "message": "hello" }), &ctx)
            .await
            .unwrap();

        assert_eq!(out.result, "Message sent successfully");
        match rx.recv().await.unwrap() {
            AgentEvent::Talk { message } => assert_eq!(message, "hello"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn talk_accepts_positional_arguments() {
        let (ctx, mut rx) = context();
        TalkTool
            .execute(serde_json::json!(["positional hello"]), &ctx)
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            AgentEvent::Talk { message } if message == "positional hello"
        ));
    }

    #[tokio::test]
    async fn talk_without_message_is_invalid() {
        let (ctx, _rx) = context();
        let err = TalkTool.execute(serde_json::json!({}), &ctx).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn placebo_talk_emits_both_candidates() {
        let (ctx, mut rx) = context();
        PlaceboTalkTool
            .execute(
                serde_json::json!({ "response1": "a", "response2": "b" }),
                &ctx,
            )
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            AgentEvent::PlaceboPair { first, second } => {
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_emits_stop_event() {
        let (ctx, mut rx) = context();
        StopTool
            .execute(serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert!(matches!(rx.recv().await.unwrap(), AgentEvent::Stop));
    }

    #[test]
    fn builtin_tools_are_gated() {
        assert!(TalkTool.category().requires_gate());
        assert!(PlaceboTalkTool.category().requires_gate());
        assert!(StopTool.category().requires_gate());
    }
}
