use async_trait::async_trait;

use crate::agent_engine::state::TaskStatus;
use crate::errors::TutanResult;
use crate::storage::types::{SessionRecord, StepRecord};

/// Task/step persistence. The agent logs failures of these calls and carries
/// on; nothing in the control loop depends on their result.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &SessionRecord) -> TutanResult<()>;

    async fn add_step(&self, session_id: &str, step: &StepRecord) -> TutanResult<()>;

    async fn update_session_status(&self, session_id: &str, status: TaskStatus) -> TutanResult<()>;

    /// All sessions, newest first.
    async fn list_sessions(&self) -> TutanResult<Vec<SessionRecord>>;

    /// Steps of one session ordered by step number.
    async fn session_steps(&self, session_id: &str) -> TutanResult<Vec<StepRecord>>;
}
