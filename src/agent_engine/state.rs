use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;
use crate::perception::types::PerceptionMode;
use crate::storage::types::StepRecord;

/// Status of one task. `Running` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Aborted,
    Failed,
    Timeout,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Aborted => "aborted",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an agent. A task moves it from `Idle` to `Running` and back;
/// the terminal status is reported through the task outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Running { session_id: String, step: u32 },
}

/// Events streamed to whoever drives the agent, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    Status(String),
    Step(StepRecord),
    UiUpdate {
        mode: PerceptionMode,
        elements: usize,
        /// Base64 PNG, only when screenshots are enabled.
        #[serde(skip_serializing_if = "Option::is_none")]
        screenshot: Option<String>,
    },
    Warning(String),
    Error(String),
    Done(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub session_id: String,
    pub status: TaskStatus,
    /// Steps started, including one interrupted by a planner failure or `finish`.
    pub steps: u32,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_steps: u32,
    pub settle_interval: Duration,
    pub capture_screenshots: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for LoopConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            settle_interval: Duration::from_millis(config.settle_interval_ms),
            capture_screenshots: config.capture_screenshots,
        }
    }
}
