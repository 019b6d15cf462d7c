use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::agent_engine::state::TaskStatus;
use crate::errors::{TutanError, TutanResult};
use crate::storage::store::SessionStore;
use crate::storage::types::{SessionRecord, StepRecord};

const STEPS_SUFFIX: &str = ".steps.jsonl";

/// File-backed store. Per session: `session_<id>.json` holds the record and
/// is rewritten on status change; `session_<id>.steps.jsonl` gets one line
/// appended per step.
pub struct JsonlSessionStore {
    dir: PathBuf,
}

impl JsonlSessionStore {
    pub async fn open(dir: impl Into<PathBuf>) -> TutanResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::info!(path = %dir.display(), "session store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, session_id: &str) -> TutanResult<PathBuf> {
        check_id(session_id)?;
        Ok(self.dir.join(format!("session_{session_id}.json")))
    }

    fn steps_path(&self, session_id: &str) -> TutanResult<PathBuf> {
        check_id(session_id)?;
        Ok(self.dir.join(format!("session_{session_id}{STEPS_SUFFIX}")))
    }

    async fn read_record(&self, session_id: &str) -> TutanResult<SessionRecord> {
        let path = self.record_path(session_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TutanError::Storage(format!("unknown session '{session_id}'")));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_record(&self, record: &SessionRecord) -> TutanResult<()> {
        let path = self.record_path(&record.id)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(record)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Ids become file names; only plain uuid-like ids are accepted.
fn check_id(session_id: &str) -> TutanResult<()> {
    let ok = !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(TutanError::Storage(format!("invalid session id '{session_id}'")))
    }
}

#[async_trait]
impl SessionStore for JsonlSessionStore {
    async fn create_session(&self, session: &SessionRecord) -> TutanResult<()> {
        self.write_record(session).await?;
        tracing::debug!(session_id = %session.id, "session created");
        Ok(())
    }

    async fn add_step(&self, session_id: &str, step: &StepRecord) -> TutanResult<()> {
        // The session must exist; a stray step file would never be listed.
        if !tokio::fs::try_exists(self.record_path(session_id)?).await? {
            return Err(TutanError::Storage(format!("unknown session '{session_id}'")));
        }
        let mut line = serde_json::to_string(step)?;
        line.push('\n');
        let path = self.steps_path(session_id)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        tracing::debug!(session_id, step = step.step_number, "step appended");
        Ok(())
    }

    async fn update_session_status(&self, session_id: &str, status: TaskStatus) -> TutanResult<()> {
        let mut record = self.read_record(session_id).await?;
        record.set_status(status);
        self.write_record(&record).await?;
        tracing::debug!(session_id, %status, "session status updated");
        Ok(())
    }

    async fn list_sessions(&self) -> TutanResult<Vec<SessionRecord>> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("session_") || !name.ends_with(".json") {
                continue;
            }
            let parsed = tokio::fs::read_to_string(entry.path())
                .await
                .map_err(TutanError::from)
                .and_then(|c| serde_json::from_str::<SessionRecord>(&c).map_err(TutanError::from));
            match parsed {
                Ok(record) => sessions.push(record),
                Err(e) => tracing::warn!(file = %name, error = %e, "skipping unreadable session file"),
            }
        }
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    async fn session_steps(&self, session_id: &str) -> TutanResult<Vec<StepRecord>> {
        self.read_record(session_id).await?;
        let content = match tokio::fs::read_to_string(self.steps_path(session_id)?).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut steps = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<StepRecord>(line) {
                Ok(step) => steps.push(step),
                Err(e) => tracing::warn!(session_id, error = %e, "skipping malformed step line"),
            }
        }
        steps.sort_by_key(|s| s.step_number);
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_with_path_separators_are_rejected() {
        assert!(check_id("3f2b-11aa").is_ok());
        assert!(check_id("../etc").is_err());
        assert!(check_id("a/b").is_err());
        assert!(check_id("").is_err());
    }
}
