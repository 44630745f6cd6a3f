use anyhow::Result;
use async_trait::async_trait;
#[allow(deprecated)]
use rig::client::completion::CompletionModelHandle;
use rig::completion::{self, CompletionModel, CompletionRequest, Message};
use rig::message::{AssistantContent, Text, ToolResult, ToolResultContent, UserContent};
use rig::OneOrMany;
use tracing::debug;

use super::{ChatMessage, InvocationRequest, ModelGateway, ModelResponse, Role, ToolDefinition};

/// [`ModelGateway`] backed by a rig completion model.
///
/// Uses rig only for the HTTP exchange; the tool loop itself is driven by
/// [`crate::AgentLoop`], so every request carries the whole projected
/// conversation.
#[allow(deprecated)]
pub struct RigGateway {
    model: CompletionModelHandle<'static>,
    model_name: String,
    temperature: f64,
    max_tokens: u64,
}

#[allow(deprecated)]
impl RigGateway {
    pub fn new(model: CompletionModelHandle<'static>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            temperature: 0.7,
            max_tokens: 8192,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[allow(deprecated)]
#[async_trait]
impl ModelGateway for RigGateway {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse> {
        let (preamble, history) = to_rig_messages(messages);
        let history_len = history.len();
        let chat_history = OneOrMany::many(history)
            .map_err(|_| anyhow::anyhow!("conversation has no messages to send"))?;

        let request = CompletionRequest {
            preamble,
            chat_history,
            documents: Vec::new(),
            tools: tools
                .iter()
                .map(|t| completion::ToolDefinition {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            tool_choice: None,
            additional_params: None,
        };

        debug!(
            "LLM request to {}: {history_len} messages, {} tools",
            self.model_name,
            tools.len()
        );

        let response = self
            .model
            .completion(request)
            .await
            .map_err(|e| anyhow::anyhow!("LLM completion error: {e}"))?;

        Ok(from_rig_choice(response.choice.iter()))
    }
}

/// Split projected messages into rig's preamble + chat history.
///
/// Consecutive tool results are folded into a single user message, which is
/// how rig providers expect them.
fn to_rig_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<Message>) {
    let mut preamble: Option<String> = None;
    let mut history = Vec::new();
    let mut pending_results: Vec<UserContent> = Vec::new();

    for msg in messages {
        if msg.role != Role::Tool {
            flush_results(&mut pending_results, &mut history);
        }
        let text = msg.content.clone().unwrap_or_default();
        match msg.role {
            Role::System => match preamble.as_mut() {
                Some(existing) => {
                    existing.push_str("\n\n");
                    existing.push_str(&text);
                }
                None => preamble = Some(text),
            },
            Role::User => history.push(Message::User {
                content: OneOrMany::one(UserContent::Text(Text { text })),
            }),
            Role::Assistant => {
                let mut parts: Vec<AssistantContent> = Vec::new();
                if !text.is_empty() || msg.tool_calls.is_empty() {
                    parts.push(AssistantContent::Text(Text { text }));
                }
                for call in &msg.tool_calls {
                    let arguments = serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| {
                            serde_json::Value::String(call.function.arguments.clone())
                        });
                    parts.push(AssistantContent::tool_call(
                        call.id.clone(),
                        call.function.name.clone(),
                        arguments,
                    ));
                }
                if let Ok(content) = OneOrMany::many(parts) {
                    history.push(Message::Assistant { id: None, content });
                }
            }
            Role::Tool => pending_results.push(UserContent::ToolResult(ToolResult {
                id: msg.tool_call_id.clone().unwrap_or_default(),
                call_id: None,
                content: OneOrMany::one(ToolResultContent::Text(Text { text })),
            })),
        }
    }
    flush_results(&mut pending_results, &mut history);

    (preamble, history)
}

fn flush_results(pending: &mut Vec<UserContent>, history: &mut Vec<Message>) {
    if pending.is_empty() {
        return;
    }
    if let Ok(content) = OneOrMany::many(std::mem::take(pending)) {
        history.push(Message::User { content });
    }
}

fn from_rig_choice<'a>(choice: impl Iterator<Item = &'a AssistantContent>) -> ModelResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for content in choice {
        match content {
            AssistantContent::Text(t) => text.push_str(&t.text),
            AssistantContent::ToolCall(tc) => tool_calls.push(InvocationRequest::new(
                tc.id.clone(),
                tc.function.name.clone(),
                tc.function.arguments.to_string(),
            )),
            _ => {}
        }
    }

    ModelResponse {
        content: if text.is_empty() { None } else { Some(text) },
        tool_calls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCallRecord;

    #[test]
    fn system_becomes_preamble_and_results_are_grouped() {
        let first = InvocationRequest::new("a", "read", r#"{"file_path":"x"}"#);
        let second = InvocationRequest::new("b", "glob", r#"{"pattern":"*.rs"}"#);
        let messages = vec![
            ChatMessage::text(Role::System, "be brief"),
            ChatMessage::text(Role::User, "look around"),
            ChatMessage {
                role: Role::Assistant,
                content: None,
                tool_calls: vec![ToolCallRecord::from(&first), ToolCallRecord::from(&second)],
                tool_call_id: None,
            },
            ChatMessage {
                tool_call_id: Some("a".into()),
                ..ChatMessage::text(Role::Tool, "contents")
            },
            ChatMessage {
                tool_call_id: Some("b".into()),
                ..ChatMessage::text(Role::Tool, "main.rs")
            },
        ];

        let (preamble, history) = to_rig_messages(&messages);
        assert_eq!(preamble.as_deref(), Some("be brief"));
        // user, assistant(tool calls), user(two tool results)
        assert_eq!(history.len(), 3);
        match &history[2] {
            Message::User { content } => assert_eq!(content.iter().count(), 2),
            other => panic!("expected grouped tool results, got {other:?}"),
        }
    }

    #[test]
    fn choice_with_tool_calls_maps_to_invocations() {
        let choice = vec![
            AssistantContent::Text(Text {
                text: String::new(),
            }),
            AssistantContent::tool_call("call_1", "bash", serde_json::json!({"command": "ls"})),
        ];
        let response = from_rig_choice(choice.iter());
        assert!(response.content.is_none());
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "bash");
        let args: serde_json::Value =
            serde_json::from_str(&response.tool_calls[0].arguments).unwrap();
        assert_eq!(args["command"], "ls");
    }

    #[test]
    fn text_only_choice_is_final_answer() {
        let choice = vec![AssistantContent::Text(Text {
            text: "done".into(),
        })];
        let response = from_rig_choice(choice.iter());
        assert_eq!(response.content.as_deref(), Some("done"));
        assert!(!response.has_tool_calls());
    }
}
