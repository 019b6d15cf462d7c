use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::agent_engine::state::TaskStatus;
use crate::errors::{TutanError, TutanResult};
use crate::storage::store::SessionStore;
use crate::storage::types::{SessionRecord, StepRecord};

/// In-process store, used for `--no-persist` runs and tests.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, (SessionRecord, Vec<StepRecord>)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unknown(session_id: &str) -> TutanError {
    TutanError::Storage(format!("unknown session '{session_id}'"))
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: &SessionRecord) -> TutanResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), (session.clone(), Vec::new()));
        Ok(())
    }

    async fn add_step(&self, session_id: &str, step: &StepRecord) -> TutanResult<()> {
        let mut sessions = self.sessions.write().await;
        let (_, steps) = sessions.get_mut(session_id).ok_or_else(|| unknown(session_id))?;
        steps.push(step.clone());
        Ok(())
    }

    async fn update_session_status(&self, session_id: &str, status: TaskStatus) -> TutanResult<()> {
        let mut sessions = self.sessions.write().await;
        let (record, _) = sessions.get_mut(session_id).ok_or_else(|| unknown(session_id))?;
        record.set_status(status);
        Ok(())
    }

    async fn list_sessions(&self) -> TutanResult<Vec<SessionRecord>> {
        let mut list: Vec<SessionRecord> = self
            .sessions
            .read()
            .await
            .values()
            .map(|(r, _)| r.clone())
            .collect();
        list.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(list)
    }

    async fn session_steps(&self, session_id: &str) -> TutanResult<Vec<StepRecord>> {
        let sessions = self.sessions.read().await;
        let (_, steps) = sessions.get(session_id).ok_or_else(|| unknown(session_id))?;
        let mut steps = steps.clone();
        steps.sort_by_key(|s| s.step_number);
        Ok(steps)
    }
}
