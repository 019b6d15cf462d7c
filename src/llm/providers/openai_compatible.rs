use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{TutanError, TutanResult};
use crate::llm::prompt::{user_turn, SYSTEM_PROMPT};
use crate::llm::provider::Planner;
use crate::llm::types::{CallConfig, ChatMessage, PlanDecision};

/// Planner backed by any OpenAI-compatible `/chat/completions` endpoint
/// in JSON-object response mode.
pub struct OpenAiCompatiblePlanner {
    id: String,
    api_base: String,
    api_key: String,
    call: CallConfig,
    client: reqwest::Client,
}

impl OpenAiCompatiblePlanner {
    pub fn new(
        id: String,
        api_base: String,
        api_key: String,
        call: CallConfig,
        timeout: Duration,
    ) -> TutanResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            id,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            call,
            client,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn build_body(&self, task: &str, context: &str, history: &[ChatMessage]) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(user_turn(task, context)));

        serde_json::json!({
            "model": self.call.model,
            "messages": messages,
            "response_format": { "type": "json_object" },
            "temperature": self.call.temperature,
        })
    }
}

#[async_trait]
impl Planner for OpenAiCompatiblePlanner {
    fn name(&self) -> &str {
        &self.id
    }

    async fn plan(
        &self,
        task: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> TutanResult<PlanDecision> {
        let body = self.build_body(task, context, history);
        tracing::debug!(
            provider = %self.id,
            model = %self.call.model,
            history = history.len(),
            "sending planner request"
        );

        let mut request = self.client.post(self.endpoint()).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            tracing::error!(provider = %self.id, %status, body = %err_body, "planner API error");
            return Err(TutanError::Planner(format!("API returned {status}")));
        }

        let json: Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| TutanError::Planner("response has no message content".into()))?;
        tracing::debug!(provider = %self.id, content_len = content.len(), "planner response received");

        parse_decision(content)
    }
}

/// Parse the assistant content into a decision. Some models wrap the object
/// in a ``` fence even in JSON mode.
pub fn parse_decision(content: &str) -> TutanResult<PlanDecision> {
    let trimmed = strip_code_fence(content);
    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| TutanError::Planner(format!("response is not valid JSON: {e}")))?;
    PlanDecision::from_json(&value)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> OpenAiCompatiblePlanner {
        OpenAiCompatiblePlanner::new(
            "local".into(),
            "http://localhost:8000/v1/".into(),
            String::new(),
            CallConfig { model: "qwen2-vl".into(), temperature: 0.0 },
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn endpoint_appends_chat_completions() {
        assert_eq!(planner().endpoint(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn body_orders_system_history_then_turn() {
        let history = vec![
            ChatMessage::assistant("Thinking: look\nAction: back({})"),
            ChatMessage::user("Action result: Success"),
        ];
        let body = planner().build_body("Open settings", "[e2] Button", &history);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"], "Action result: Success");
        assert!(messages[3]["content"].as_str().unwrap().contains("[e2] Button"));
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn fenced_json_is_accepted() {
        let d = parse_decision("```json\n{\"action\": \"home\", \"params\": {}}\n```").unwrap();
        assert_eq!(d.action, "home");
        let d = parse_decision("  {\"action\": \"back\"} ").unwrap();
        assert_eq!(d.action, "back");
    }

    #[test]
    fn prose_is_a_planner_error() {
        let err = parse_decision("I think you should click the button").unwrap_err();
        assert!(matches!(err, TutanError::Planner(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let p = OpenAiCompatiblePlanner::new(
            "local".into(),
            "http://127.0.0.1:9/v1".into(),
            String::new(),
            CallConfig { model: "m".into(), temperature: 0.0 },
            Duration::from_millis(500),
        )
        .unwrap();
        assert!(p.plan("task", "ctx", &[]).await.is_err());
    }
}
