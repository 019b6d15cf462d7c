use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Axis-aligned rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Read `{left, top, right, bottom}` from a raw tree node; missing,
    /// non-numeric or out-of-range edges become 0.
    pub fn from_value(value: &Value) -> Self {
        let edge = |key: &str| {
            value[key]
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .unwrap_or(0)
        };
        Self {
            left: edge("left"),
            top: edge("top"),
            right: edge("right"),
            bottom: edge("bottom"),
        }
    }

    /// Centre point, floor-divided.
    pub fn center(&self) -> (i32, i32) {
        let mid = |a: i32, b: i32| (i64::from(a) + i64::from(b)).div_euclid(2) as i32;
        (mid(self.left, self.right), mid(self.top, self.bottom))
    }
}

/// One element of a snapshot. `ref_id` is only meaningful for the snapshot
/// that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefNode {
    pub ref_id: String,
    pub role: String,
    pub text: String,
    /// Accessibility description (`contentDescription` on the wire).
    pub label: String,
    pub resource_id: String,
    pub bounds: Bounds,
    pub clickable: bool,
    pub editable: bool,
}

impl RefNode {
    /// Build a node from a raw accessibility-tree object. Every field falls
    /// back to a default; a node of unknown shape is never an error.
    pub fn from_value(ref_id: String, node: &Value) -> Self {
        let string = |key: &str| node[key].as_str().unwrap_or("").to_string();
        let role = node["class"]
            .as_str()
            .unwrap_or("unknown")
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_string();
        Self {
            ref_id,
            role,
            text: string("text"),
            label: string("contentDescription"),
            resource_id: string("id"),
            bounds: Bounds::from_value(&node["bounds"]),
            clickable: node["clickable"].as_bool().unwrap_or(false),
            editable: node["editable"].as_bool().unwrap_or(false),
        }
    }

    /// Whether the node is worth showing to the planner (and addressable).
    pub fn is_addressable(&self) -> bool {
        !self.text.is_empty() || !self.label.is_empty() || self.clickable || self.editable
    }

    /// `[e2] Button text="Login" label="…" [clickable] [editable]`, absent
    /// parts omitted.
    pub fn render(&self) -> String {
        let mut line = format!("[{}] {}", self.ref_id, self.role);
        if !self.text.is_empty() {
            line.push_str(&format!(" text=\"{}\"", self.text));
        }
        if !self.label.is_empty() {
            line.push_str(&format!(" label=\"{}\"", self.label));
        }
        if self.clickable {
            line.push_str(" [clickable]");
        }
        if self.editable {
            line.push_str(" [editable]");
        }
        line
    }
}

/// How the current context was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerceptionMode {
    /// Structured UI-tree query through the helper app. Initial state.
    Accessibility,
    /// Degraded mode: no tree is available.
    Vision,
}

impl PerceptionMode {
    /// The only transition: any failure lands in `Vision`, and `Vision` is
    /// never left.
    pub fn degrade(self) -> Self {
        PerceptionMode::Vision
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerceptionMode::Accessibility => "accessibility",
            PerceptionMode::Vision => "vision",
        }
    }
}

impl std::fmt::Display for PerceptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Perception {
    /// Text handed to the planner.
    pub context: String,
    pub mode: PerceptionMode,
    /// Number of addressable elements in the snapshot (0 in vision mode).
    pub elements: usize,
}
