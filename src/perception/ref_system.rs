//! Element reference registry.
//!
//! Flattens an accessibility tree into a snapshot of `e1`, `e2`, … ids the
//! planner can name instead of coordinates. Ids are assigned to every visited
//! node in pre-order, but only addressable nodes are kept, so filtered nodes
//! leave gaps in the numbering.
use std::collections::HashMap;

use serde_json::Value;

use crate::perception::types::RefNode;

#[derive(Debug, Default)]
pub struct RefSystem {
    refs: HashMap<String, RefNode>,
    counter: u32,
}

impl RefSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the current snapshot and restart numbering at `e1`.
    pub fn reset(&mut self) {
        self.refs.clear();
        self.counter = 0;
    }

    /// Replace the snapshot with `tree` and return its planner-facing text.
    pub fn parse(&mut self, tree: &Value) -> String {
        self.reset();

        let mut lines = Vec::new();
        // Explicit stack instead of recursion; children pushed in reverse so
        // they pop in document order.
        let mut stack: Vec<&Value> = vec![tree];
        while let Some(node) = stack.pop() {
            self.counter += 1;
            let ref_node = RefNode::from_value(format!("e{}", self.counter), node);
            if ref_node.is_addressable() {
                lines.push(ref_node.render());
                self.refs.insert(ref_node.ref_id.clone(), ref_node);
            }
            if let Some(children) = node["children"].as_array() {
                stack.extend(children.iter().rev());
            }
        }

        tracing::debug!(
            visited = self.counter,
            addressable = self.refs.len(),
            "accessibility tree parsed"
        );
        lines.join("\n")
    }

    pub fn get_node(&self, ref_id: &str) -> Option<&RefNode> {
        self.refs.get(ref_id)
    }

    /// Number of addressable elements in the current snapshot.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Number of ids handed out for the current snapshot, addressable or not.
    pub fn issued(&self) -> u32 {
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn login_screen() -> Value {
        json!({
            "class": "android.widget.FrameLayout",
            "text": "",
            "contentDescription": "",
            "clickable": false,
            "bounds": {"left": 0, "top": 0, "right": 1080, "bottom": 1920},
            "children": [
                {
                    "class": "android.widget.Button",
                    "text": "Login",
                    "contentDescription": "Login Button",
                    "clickable": true,
                    "bounds": {"left": 100, "top": 100, "right": 300, "bottom": 200},
                    "children": []
                },
                {
                    "class": "android.widget.EditText",
                    "text": "",
                    "contentDescription": "Username",
                    "clickable": true,
                    "editable": true,
                    "bounds": {"left": 100, "top": 300, "right": 500, "bottom": 400},
                    "children": []
                }
            ]
        })
    }

    #[test]
    fn login_screen_numbering() {
        let mut refs = RefSystem::new();
        let text = refs.parse(&login_screen());

        assert!(text.contains("[e2] Button"));
        assert!(text.contains("text=\"Login\""));
        assert!(text.contains("[e3] EditText"));
        assert!(text.contains("[editable]"));
        assert!(!text.contains("[e1]"));

        let node = refs.get_node("e2").unwrap();
        assert_eq!(node.role, "Button");
        assert_eq!(node.text, "Login");
        assert!(refs.get_node("e1").is_none());
        assert_eq!(refs.len(), 2);
        assert_eq!(refs.issued(), 3);
    }

    #[test]
    fn rendering_is_one_line_per_addressable_node() {
        let mut refs = RefSystem::new();
        let text = refs.parse(&login_screen());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"[e2] Button text="Login" label="Login Button" [clickable]"#,
                r#"[e3] EditText label="Username" [clickable] [editable]"#,
            ]
        );
    }

    #[test]
    fn ids_follow_preorder() {
        let tree = json!({
            "class": "a.Root", "text": "r",
            "children": [
                {"class": "a.A", "text": "a", "children": [
                    {"class": "a.A1", "text": "a1"},
                    {"class": "a.A2", "text": "a2"}
                ]},
                {"class": "a.B", "text": "b"}
            ]
        });
        let mut refs = RefSystem::new();
        refs.parse(&tree);
        let order: Vec<&str> = (1..=5)
            .map(|i| refs.get_node(&format!("e{i}")).unwrap().role.as_str())
            .collect();
        assert_eq!(order, vec!["Root", "A", "A1", "A2", "B"]);
    }

    #[test]
    fn reparse_restarts_numbering_and_invalidates_old_ids() {
        let mut refs = RefSystem::new();
        refs.parse(&login_screen());
        assert!(refs.get_node("e3").is_some());

        refs.parse(&json!({"class": "android.view.View", "clickable": true}));
        assert_eq!(refs.issued(), 1);
        assert_eq!(refs.get_node("e1").unwrap().role, "View");
        assert!(refs.get_node("e2").is_none());
        assert!(refs.get_node("e3").is_none());
    }

    #[test]
    fn reset_clears_map_and_counter() {
        let mut refs = RefSystem::new();
        refs.parse(&json!({"class": "View", "clickable": true}));
        assert!(!refs.is_empty());

        refs.reset();
        assert!(refs.is_empty());
        assert_eq!(refs.issued(), 0);
    }

    #[test]
    fn unknown_shapes_still_produce_a_snapshot() {
        let tree = json!({
            "children": [
                42,
                {"text": "orphan"},
                {"class": "x.Y", "children": "not-a-list"}
            ]
        });
        let mut refs = RefSystem::new();
        let text = refs.parse(&tree);
        assert_eq!(refs.issued(), 4);
        assert_eq!(text, r#"[e3] unknown text="orphan""#);
    }

    #[test]
    fn deep_chains_number_every_level() {
        let mut tree = json!({"class": "x.Leaf", "clickable": true});
        for _ in 0..500 {
            tree = json!({"class": "x.Wrap", "children": [tree]});
        }
        let mut refs = RefSystem::new();
        refs.parse(&tree);
        assert_eq!(refs.issued(), 501);
        assert_eq!(refs.get_node("e501").unwrap().role, "Leaf");
    }
}
