use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use foreman_config::ProfileConfig;
use serde::Serialize;
use tracing::{info, warn};

use crate::agent::conversation::Conversation;
use crate::agent::r#loop::{step, Step};
use crate::llm::ModelGateway;
use crate::tools::delegate::DELEGATE_TOOL_NAME;
use crate::tools::ToolRegistry;

/// A named, tool-scoped persona that sub-tasks can be handed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubagentProfile {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    /// Tool allow-list. `None` inherits every parent tool; an empty list
    /// gives the worker no tools at all.
    pub tools: Option<Vec<String>>,
}

impl From<ProfileConfig> for SubagentProfile {
    fn from(cfg: ProfileConfig) -> Self {
        Self {
            name: cfg.name,
            description: cfg.description,
            system_prompt: cfg.system_prompt,
            tools: cfg.tools,
        }
    }
}

fn read_only_tools() -> Option<Vec<String>> {
    Some(vec!["glob".into(), "grep".into(), "read".into()])
}

/// The explorer, researcher and planner profiles.
pub fn builtin_profiles() -> Vec<SubagentProfile> {
    vec![
        SubagentProfile {
            name: "explorer".into(),
            description: "Explores codebase structure, finds files, and searches code".into(),
            system_prompt: "You are a code exploration assistant. Your job is to:\n\
                - Search for files and code patterns\n\
                - Understand codebase structure\n\
                - Find relevant files for a given task\n\
                Be concise in your responses. Report findings clearly."
                .into(),
            tools: read_only_tools(),
        },
        SubagentProfile {
            name: "researcher".into(),
            description: "Researches and gathers information by reading files".into(),
            system_prompt: "You are a research assistant. Your job is to:\n\
                - Read and understand code files\n\
                - Summarize findings\n\
                - Answer questions about code behavior\n\
                Be thorough but concise. Provide relevant code snippets when helpful."
                .into(),
            tools: read_only_tools(),
        },
        SubagentProfile {
            name: "planner".into(),
            description: "Plans implementation steps for complex tasks".into(),
            system_prompt: "You are a planning assistant. Your job is to:\n\
                - Analyze the task requirements\n\
                - Explore the codebase to understand context\n\
                - Create a step-by-step implementation plan\n\
                Output a clear, numbered list of steps. Each step should be actionable."
                .into(),
            tools: read_only_tools(),
        },
    ]
}

/// Outcome of one delegated task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubagentResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubagentResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// A single-use agent with its own conversation and a scoped tool set.
pub struct WorkerAgent {
    id: String,
    profile: Arc<SubagentProfile>,
    gateway: Arc<dyn ModelGateway>,
    tools: ToolRegistry,
}

impl WorkerAgent {
    pub fn new(
        profile: Arc<SubagentProfile>,
        gateway: Arc<dyn ModelGateway>,
        available: &ToolRegistry,
    ) -> Self {
        let tools = available.scoped(profile.tools.as_deref());
        Self {
            id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            profile,
            gateway,
            tools,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run `task` to completion or until `max_iterations` model calls have
    /// been spent. Never fails; errors are reported in the result.
    pub async fn execute(&self, task: &str, max_iterations: usize) -> SubagentResult {
        let mut conversation = Conversation::new(self.profile.system_prompt.clone());
        conversation.add_user(task);
        let tag = format!("{}:{}", self.profile.name, self.id);

        for _ in 0..max_iterations {
            match step(self.gateway.as_ref(), &self.tools, &mut conversation, &tag).await {
                Ok(Step::Continue) => continue,
                Ok(Step::Done(output)) => return SubagentResult::ok(output),
                Err(e) => return SubagentResult::failed(format!("{e:#}")),
            }
        }

        SubagentResult::failed(format!("Max iterations ({max_iterations}) reached"))
    }
}

/// Registry of delegation profiles and the tools workers may draw from.
pub struct SubagentManager {
    profiles: BTreeMap<String, Arc<SubagentProfile>>,
    available_tools: RwLock<ToolRegistry>,
    gateway: Arc<dyn ModelGateway>,
    max_iterations: usize,
}

impl SubagentManager {
    pub fn new(gateway: Arc<dyn ModelGateway>, max_iterations: usize) -> Self {
        Self {
            profiles: BTreeMap::new(),
            available_tools: RwLock::new(ToolRegistry::new()),
            gateway,
            max_iterations,
        }
    }

    /// Add a profile. Registered profiles are immutable, so a second
    /// profile with the same name is rejected.
    pub fn register_profile(&mut self, profile: SubagentProfile) -> bool {
        if self.profiles.contains_key(&profile.name) {
            warn!("Subagent profile '{}' already registered; ignoring", profile.name);
            return false;
        }
        self.profiles.insert(profile.name.clone(), Arc::new(profile));
        true
    }

    /// Replace the tool set workers are scoped from. `delegate_task` is
    /// always dropped so workers cannot delegate further.
    pub fn set_available_tools(&self, mut tools: ToolRegistry) {
        tools.unregister(DELEGATE_TOOL_NAME);
        *self
            .available_tools
            .write()
            .unwrap_or_else(PoisonError::into_inner) = tools;
    }

    pub fn profile(&self, name: &str) -> Option<&SubagentProfile> {
        self.profiles.get(name).map(|p| p.as_ref())
    }

    /// Profile names, sorted.
    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// One `- name: description` line per profile.
    pub fn descriptions(&self) -> String {
        self.profiles
            .values()
            .map(|p| format!("- {}: {}", p.name, p.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Build a fresh worker for `name`, or `None` for an unknown profile.
    pub fn worker(&self, name: &str) -> Option<WorkerAgent> {
        let profile = self.profiles.get(name)?;
        let available = self
            .available_tools
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Some(WorkerAgent::new(
            profile.clone(),
            self.gateway.clone(),
            &available,
        ))
    }

    /// Run `task` on a fresh worker for the named profile.
    pub async fn delegate(&self, name: &str, task: &str) -> SubagentResult {
        let Some(worker) = self.worker(name) else {
            return SubagentResult::failed(format!(
                "Subagent \"{name}\" not found. Available: {}",
                self.profile_names().join(", ")
            ));
        };

        let task_preview: String = task.chars().take(100).collect();
        info!(
            "Subagent {} ({name}) starting with {} tool(s): {task_preview}",
            worker.id(),
            worker.tools().len()
        );

        let result = worker.execute(task, self.max_iterations).await;
        match &result.error {
            None => info!("Subagent {} ({name}) completed", worker.id()),
            Some(e) => warn!("Subagent {} ({name}) failed: {e}", worker.id()),
        }
        result
    }
}
