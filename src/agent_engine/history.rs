use serde_json::Value;

use crate::llm::types::ChatMessage;

/// Conversation fed back to the planner: one assistant turn and one user turn
/// per executed step, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&mut self, thinking: &str, action: &str, params: &Value, success: bool) {
        self.messages.push(ChatMessage::assistant(format!(
            "Thinking: {thinking}\nAction: {action}({params})"
        )));
        let result = if success { "Success" } else { "Failed" };
        self.messages
            .push(ChatMessage::user(format!("Action result: {result}")));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn each_step_adds_assistant_then_user() {
        let mut h = ConversationHistory::new();
        h.record_step("tap login", "click", &json!({"ref_id": "e2"}), true);
        h.record_step("", "back", &json!({}), false);

        let m = h.messages();
        assert_eq!(h.len(), 4);
        assert_eq!(m[0].role, "assistant");
        assert_eq!(m[0].content, "Thinking: tap login\nAction: click({\"ref_id\":\"e2\"})");
        assert_eq!(m[1], ChatMessage::user("Action result: Success"));
        assert_eq!(m[3].content, "Action result: Failed");

        h.clear();
        assert!(h.is_empty());
    }
}
