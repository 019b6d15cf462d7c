//! The closed set of device actions and their parsing from planner output.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{TutanError, TutanResult};

/// Where a tap lands: a snapshot element or raw device pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Ref { ref_id: String },
    Point { x: i32, y: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceAction {
    Click { target: Target },
    /// Focus `ref_id` (if any) with a click, then inject `text`.
    Type { ref_id: Option<String>, text: String },
    Scroll { direction: ScrollDirection },
    LongPress { target: Target, duration_ms: u32 },
    Back,
    Home,
    Wait { seconds: f64 },
}

const DEFAULT_LONG_PRESS_MS: u32 = 1000;
const DEFAULT_WAIT_SECS: f64 = 1.0;
const MAX_WAIT_SECS: f64 = 60.0;

impl DeviceAction {
    /// Build an action from the planner's `action` name and `params` object.
    /// Unknown names, `finish` and missing required params are rejected here
    /// so the device never sees them.
    pub fn from_plan(action: &str, params: &Value) -> TutanResult<Self> {
        match action {
            "click" => Ok(DeviceAction::Click {
                target: parse_target(params)
                    .ok_or_else(|| invalid(action, "needs ref_id or x/y"))?,
            }),
            "type" => {
                let text = params["text"]
                    .as_str()
                    .ok_or_else(|| invalid(action, "needs text"))?
                    .to_string();
                Ok(DeviceAction::Type {
                    ref_id: parse_ref_id(params),
                    text,
                })
            }
            "scroll" => {
                let direction = match params["direction"].as_str() {
                    Some("up") => ScrollDirection::Up,
                    Some("down") => ScrollDirection::Down,
                    Some("left") => ScrollDirection::Left,
                    Some("right") => ScrollDirection::Right,
                    other => {
                        return Err(invalid(action, &format!("bad direction {other:?}")));
                    }
                };
                Ok(DeviceAction::Scroll { direction })
            }
            "long_press" => Ok(DeviceAction::LongPress {
                target: parse_target(params)
                    .ok_or_else(|| invalid(action, "needs ref_id or x/y"))?,
                duration_ms: params["duration"]
                    .as_u64()
                    .map(|d| d.min(u32::MAX as u64) as u32)
                    .unwrap_or(DEFAULT_LONG_PRESS_MS),
            }),
            "back" => Ok(DeviceAction::Back),
            "home" => Ok(DeviceAction::Home),
            "wait" => Ok(DeviceAction::Wait {
                seconds: params["seconds"]
                    .as_f64()
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .map(|s| s.min(MAX_WAIT_SECS))
                    .unwrap_or(DEFAULT_WAIT_SECS),
            }),
            "finish" => Err(TutanError::Device(
                "finish is handled by the agent, not the device".into(),
            )),
            other => Err(TutanError::Device(format!("unknown action kind '{other}'"))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DeviceAction::Click { .. } => "click",
            DeviceAction::Type { .. } => "type",
            DeviceAction::Scroll { .. } => "scroll",
            DeviceAction::LongPress { .. } => "long_press",
            DeviceAction::Back => "back",
            DeviceAction::Home => "home",
            DeviceAction::Wait { .. } => "wait",
        }
    }
}

fn invalid(action: &str, why: &str) -> TutanError {
    TutanError::Device(format!("invalid {action} params: {why}"))
}

/// `ref_id` as a non-empty string. Planners sometimes echo the bracketed
/// form from the context (`[e5]`).
fn parse_ref_id(params: &Value) -> Option<String> {
    params["ref_id"]
        .as_str()
        .map(|s| s.trim().trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|s| !s.is_empty())
}

fn parse_target(params: &Value) -> Option<Target> {
    if let Some(ref_id) = parse_ref_id(params) {
        return Some(Target::Ref { ref_id });
    }
    let coord = |key: &str| params[key].as_i64().and_then(|v| i32::try_from(v).ok());
    match (coord("x"), coord("y")) {
        (Some(x), Some(y)) => Some(Target::Point { x, y }),
        _ => None,
    }
}
