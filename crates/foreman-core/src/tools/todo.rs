use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use super::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    /// Parse a status string; anything unrecognized is `Pending`.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::InProgress => "[>]",
            Self::Completed => "[x]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub content: String,
    pub status: TodoStatus,
}

/// Shared task list the model maintains through `todo_write`.
#[derive(Default)]
pub struct TodoManager {
    todos: RwLock<Vec<Todo>>,
}

impl TodoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, todos: Vec<Todo>) {
        *self.todos.write().await = todos;
    }

    pub async fn list(&self) -> Vec<Todo> {
        self.todos.read().await.clone()
    }

    pub async fn clear(&self) {
        self.todos.write().await.clear();
    }

    /// Plain-text checklist with a progress summary, or empty if no todos.
    pub async fn render(&self) -> String {
        let todos = self.todos.read().await;
        if todos.is_empty() {
            return String::new();
        }

        let mut lines: Vec<String> = todos
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{} {}. {}", t.status.icon(), i + 1, t.content))
            .collect();

        let count = |s: TodoStatus| todos.iter().filter(|t| t.status == s).count();
        let summary: Vec<String> = [
            (count(TodoStatus::Completed), "done"),
            (count(TodoStatus::InProgress), "in progress"),
            (count(TodoStatus::Pending), "pending"),
        ]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, label)| format!("{n} {label}"))
        .collect();
        lines.push(summary.join(" | "));
        lines.join("\n")
    }
}

pub struct TodoWriteTool {
    manager: Arc<TodoManager>,
}

impl TodoWriteTool {
    pub fn new(manager: Arc<TodoManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Update the todo list. Use this to track tasks and show progress to the user."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "The complete todo list",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {
                                "type": "string",
                                "description": "The task description"
                            },
                            "status": {
                                "type": "string",
                                "description": "The task status: pending, in_progress or completed"
                            }
                        },
                        "required": ["content"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let Some(items) = params.get("todos").and_then(|v| v.as_array()) else {
            return Ok("Error: todos must be an array".to_string());
        };

        let todos: Vec<Todo> = items
            .iter()
            .map(|item| Todo {
                content: item
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                status: TodoStatus::parse_lenient(
                    item.get("status").and_then(|v| v.as_str()).unwrap_or_default(),
                ),
            })
            .collect();

        let count = todos.len();
        self.manager.set(todos).await;
        info!("Todo list updated ({count} items)");
        Ok(format!("Todo list updated with {count} items"))
    }
}
