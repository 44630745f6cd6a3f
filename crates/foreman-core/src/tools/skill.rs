use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::{required_str, Tool};
use crate::agent::SkillRegistry;

/// Hands a skill's full body to the model on request.
pub struct LoadSkillTool {
    skills: Arc<SkillRegistry>,
    description: String,
}

impl LoadSkillTool {
    pub fn new(skills: Arc<SkillRegistry>) -> Self {
        let description = format!(
            "Load domain expertise for a specific task. {}",
            skills.metadata_prompt()
        );
        Self {
            skills,
            description,
        }
    }

    fn available(&self) -> String {
        let names = self.skills.list();
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    }
}

#[async_trait]
impl Tool for LoadSkillTool {
    fn name(&self) -> &str {
        "load_skill"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "skill_name": {
                    "type": "string",
                    "description": format!("The skill to load. Available: {}", self.available())
                }
            },
            "required": ["skill_name"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let name = required_str(&params, "skill_name")?;

        let Some(skill) = self.skills.get(name) else {
            return Ok(format!(
                "Skill \"{name}\" not found. Available skills: {}",
                self.available()
            ));
        };

        info!("Loaded skill '{name}'");
        Ok(format!(
            "# Skill Loaded: {}\n\n{}\n\n---\nYou now have this expertise loaded. Apply it to the current task.",
            skill.name, skill.body
        ))
    }
}
