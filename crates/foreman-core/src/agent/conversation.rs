use crate::llm::{ChatMessage, InvocationRequest, Role, ToolCallRecord};

/// One entry in the conversation log. The system prompt is held separately
/// by [`Conversation`] and never appears here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    User(String),
    AssistantText(String),
    /// Every invocation the model asked for in one response, kept together.
    AssistantInvocations(Vec<InvocationRequest>),
    ToolResult {
        call_id: String,
        content: String,
    },
}

/// Append-only turn log plus the fixed system prompt.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    system_prompt: String,
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            turns: Vec::new(),
        }
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::User(content.into()));
    }

    pub fn add_assistant_text(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::AssistantText(content.into()));
    }

    pub fn add_assistant_invocations(&mut self, calls: Vec<InvocationRequest>) {
        self.turns.push(Turn::AssistantInvocations(calls));
    }

    pub fn add_tool_result(&mut self, call_id: impl Into<String>, content: impl Into<String>) {
        self.turns.push(Turn::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
        });
    }

    /// Flat request form: the system prompt (when non-empty) followed by
    /// every turn in order.
    pub fn project(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage::text(Role::System, &self.system_prompt));
        }

        messages.extend(self.turns.iter().map(|turn| match turn {
            Turn::User(text) => ChatMessage::text(Role::User, text),
            Turn::AssistantText(text) => ChatMessage::text(Role::Assistant, text),
            Turn::AssistantInvocations(calls) => ChatMessage {
                role: Role::Assistant,
                content: None,
                tool_calls: calls.iter().map(ToolCallRecord::from).collect(),
                tool_call_id: None,
            },
            Turn::ToolResult { call_id, content } => ChatMessage {
                tool_call_id: Some(call_id.clone()),
                ..ChatMessage::text(Role::Tool, content)
            },
        }));
        messages
    }

    /// Drop every turn, keeping the system prompt.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
