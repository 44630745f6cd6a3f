use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{required_str, Tool};
use crate::agent::SubagentManager;

pub const DELEGATE_TOOL_NAME: &str = "delegate_task";

/// Tool for handing a sub-task to a scoped subagent.
///
/// Failures never raise; they come back as `Subagent error: ...` text so
/// the parent loop treats them like any other tool outcome.
pub struct DelegateTaskTool {
    manager: Arc<SubagentManager>,
    description: String,
}

impl DelegateTaskTool {
    pub fn new(manager: Arc<SubagentManager>) -> Self {
        let listing = manager.descriptions();
        let listing = if listing.is_empty() {
            "None registered".to_string()
        } else {
            listing
        };
        Self {
            description: format!(
                "Delegate a task to a specialized subagent. Available subagents:\n{listing}"
            ),
            manager,
        }
    }
}

#[async_trait]
impl Tool for DelegateTaskTool {
    fn name(&self) -> &str {
        DELEGATE_TOOL_NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent_name": {
                    "type": "string",
                    "description": "The name of the subagent to delegate to"
                },
                "task": {
                    "type": "string",
                    "description": "The task to delegate. Be specific and provide context."
                }
            },
            "required": ["agent_name", "task"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let agent_name = required_str(&params, "agent_name")?;
        let task = required_str(&params, "task")?;

        let result = self.manager.delegate(agent_name, task).await;
        if result.success {
            Ok(result.output)
        } else {
            Ok(format!(
                "Subagent error: {}",
                result.error.unwrap_or_default()
            ))
        }
    }
}
