use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{TutanError, TutanResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

/// The planner's choice for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDecision {
    #[serde(default)]
    pub thinking: String,
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

impl PlanDecision {
    /// Read a decision out of the model's JSON object. An `error` key, a
    /// missing `action` or a non-object `params` are all planner failures.
    pub fn from_json(value: &Value) -> TutanResult<Self> {
        if let Some(err) = value.get("error") {
            let msg = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
            return Err(TutanError::Planner(msg));
        }
        let action = value["action"]
            .as_str()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| TutanError::Planner(format!("response has no action: {value}")))?;
        let params = match &value["params"] {
            Value::Null => Value::Object(Default::default()),
            p @ Value::Object(_) => p.clone(),
            other => {
                return Err(TutanError::Planner(format!("params must be an object, got {other}")));
            }
        };
        Ok(Self {
            thinking: value["thinking"].as_str().unwrap_or("").to_string(),
            action,
            params,
        })
    }

    pub fn is_finish(&self) -> bool {
        self.action == "finish"
    }

    pub fn finish_message(&self) -> String {
        self.params["message"].as_str().unwrap_or("Task completed").to_string()
    }
}

/// Per-call settings resolved from the active provider entry.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub model: String,
    pub temperature: f64,
}
