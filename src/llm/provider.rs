use async_trait::async_trait;

use crate::errors::TutanResult;
use crate::llm::types::{ChatMessage, PlanDecision};

/// Decides the next step of a task. Implementations are opaque to the agent;
/// any failure or malformed answer comes back as `Err`.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Provider identifier (the `[llm.providers.<id>]` key).
    fn name(&self) -> &str;

    /// `history` is the conversation so far, oldest first, without the
    /// system prompt or the current turn.
    async fn plan(
        &self,
        task: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> TutanResult<PlanDecision>;
}
