use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent_engine::state::TaskStatus;
use crate::perception::types::PerceptionMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    Success,
    Failed,
}

impl From<bool> for StepResult {
    fn from(ok: bool) -> Self {
        if ok {
            StepResult::Success
        } else {
            StepResult::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub device_serial: String,
    pub task: String,
    pub status: TaskStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Planner provider and model the task ran with.
    #[serde(default)]
    pub model_config: Value,
}

impl SessionRecord {
    pub fn new(id: String, device_serial: String, task: String, model_config: Value) -> Self {
        Self {
            id,
            device_serial,
            task,
            status: TaskStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            model_config,
        }
    }

    /// Set the status; a terminal status also stamps `end_time`.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.end_time = status.is_terminal().then(Utc::now);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_number: u32,
    pub thinking: String,
    pub action: String,
    pub params: Value,
    pub result: StepResult,
    pub mode: PerceptionMode,
    pub timestamp: DateTime<Utc>,
}
