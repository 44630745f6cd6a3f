use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::agent::conversation::Conversation;
use crate::agent::subagent::SubagentManager;
use crate::llm::ModelGateway;
use crate::tools::delegate::DelegateTaskTool;
use crate::tools::{Tool, ToolRegistry};

const PREVIEW_LEN: usize = 200;

/// Find the largest byte index <= `max` that is a UTF-8 char boundary.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn preview(s: &str) -> String {
    if s.len() > PREVIEW_LEN {
        let end = floor_char_boundary(s, PREVIEW_LEN);
        format!("{}... ({} bytes)", &s[..end], s.len())
    } else {
        s.to_string()
    }
}

pub(crate) enum Step {
    /// Tool results were appended; the model must be asked again.
    Continue,
    /// The model answered in text, which is now the last turn.
    Done(String),
}

/// One model call plus execution of whatever it asked for.
///
/// Shared by the top-level loop and by workers; only the caller decides how
/// many steps are allowed. Gateway errors propagate.
pub(crate) async fn step(
    gateway: &dyn ModelGateway,
    tools: &ToolRegistry,
    conversation: &mut Conversation,
    tag: &str,
) -> Result<Step> {
    let messages = conversation.project();
    let definitions = tools.definitions();
    debug!(
        "[{tag}] LLM request: {} messages, {} tools",
        messages.len(),
        definitions.len()
    );

    let response = gateway.complete(&messages, &definitions).await?;

    if !response.has_tool_calls() {
        let text = response.content.unwrap_or_default();
        debug!("[{tag}] LLM response: text ({} chars)", text.len());
        conversation.add_assistant_text(text.clone());
        return Ok(Step::Done(text));
    }

    let calls = response.tool_calls;
    debug!("[{tag}] LLM response: {} tool call(s)", calls.len());
    conversation.add_assistant_invocations(calls.clone());

    for call in &calls {
        info!("[{tag}] Tool call: {}({})", call.name, preview(&call.arguments));
        let result = tools.invoke(&call.name, &call.arguments).await;
        debug!("[{tag}] Tool result [{}]: {}", call.name, preview(&result));
        conversation.add_tool_result(call.id.clone(), result);
    }

    Ok(Step::Continue)
}

/// The interactive orchestration loop.
///
/// Runs until the model answers in plain text; there is no iteration cap at
/// this level. The conversation persists across [`AgentLoop::run`] calls
/// until [`AgentLoop::reset`].
pub struct AgentLoop {
    gateway: Arc<dyn ModelGateway>,
    tools: ToolRegistry,
    conversation: Conversation,
    delegation: Option<Arc<SubagentManager>>,
}

impl AgentLoop {
    pub fn new(gateway: Arc<dyn ModelGateway>, system_prompt: impl Into<String>) -> Self {
        Self {
            gateway,
            tools: ToolRegistry::new(),
            conversation: Conversation::new(system_prompt),
            delegation: None,
        }
    }

    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let previous = self.tools.register(tool);
        self.sync_delegation();
        previous
    }

    /// Keep the workers' tool set in step with the parent's.
    fn sync_delegation(&self) {
        if let Some(manager) = &self.delegation {
            manager.set_available_tools(self.tools.clone());
        }
    }

    /// Register tools proxied from external hosts. A host tool never shadows
    /// a tool that is already registered. Returns how many were added.
    pub fn add_host_tools(&mut self, host_tools: Vec<Arc<dyn Tool>>) -> usize {
        let mut added = 0;
        for tool in host_tools {
            if self.tools.has(tool.name()) {
                warn!("Skipping host tool '{}': name already registered", tool.name());
                continue;
            }
            self.tools.register(tool);
            added += 1;
        }
        if added > 0 {
            self.sync_delegation();
        }
        added
    }

    /// Expose `manager` as `delegate_task`.
    ///
    /// Workers draw on the parent's tools as registered at delegation time,
    /// including tools registered after this call, but never `delegate_task`
    /// itself. Calling this again replaces the previous manager.
    pub fn enable_delegation(&mut self, manager: SubagentManager) -> Arc<SubagentManager> {
        let manager = Arc::new(manager);
        self.tools
            .register(Arc::new(DelegateTaskTool::new(manager.clone())));
        self.delegation = Some(manager.clone());
        self.sync_delegation();
        info!(
            "Delegation enabled: {} profile(s), {} tool(s) available to workers",
            manager.profile_names().len(),
            self.tools.len() - 1
        );
        manager
    }

    /// Process one user message and return the model's final answer.
    pub async fn run(&mut self, user_message: &str) -> Result<String> {
        self.conversation.add_user(user_message);

        loop {
            match step(
                self.gateway.as_ref(),
                &self.tools,
                &mut self.conversation,
                "agent",
            )
            .await?
            {
                Step::Continue => continue,
                Step::Done(answer) => return Ok(answer),
            }
        }
    }

    /// Start over with only the system prompt.
    pub fn reset(&mut self) {
        self.conversation.clear();
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::conversation::Turn;
    use crate::agent::subagent::SubagentProfile;
    use crate::llm::scripted::ScriptedGateway;
    use crate::llm::{InvocationRequest, ModelResponse, Role};
    use crate::tools::testing::EchoTool;

    fn agent(gateway: Arc<ScriptedGateway>) -> AgentLoop {
        let mut agent = AgentLoop::new(gateway, "You are a test agent.");
        agent.register_tool(EchoTool::named("echo"));
        agent
    }

    fn tool_results(conversation: &Conversation) -> Vec<(String, String)> {
        conversation
            .turns()
            .iter()
            .filter_map(|t| match t {
                Turn::ToolResult { call_id, content } => Some((call_id.clone(), content.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_plain_answer_needs_one_call() {
        let gateway = Arc::new(ScriptedGateway::new(vec![ModelResponse::text("hello")]));
        let mut agent = agent(gateway.clone());

        let answer = agent.run("hi").await.unwrap();
        assert_eq!(answer, "hello");
        assert_eq!(gateway.call_count(), 1);
        assert_eq!(gateway.offered_tools(0), vec!["echo"]);
        assert_eq!(
            agent.conversation().turns().last(),
            Some(&Turn::AssistantText("hello".into()))
        );
    }

    #[tokio::test]
    async fn test_every_invocation_gets_one_correlated_result() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            ModelResponse::calls(vec![
                InvocationRequest::new("a", "echo", r#"{"text":"one"}"#),
                InvocationRequest::new("b", "echo", r#"{"text":"two"}"#),
            ]),
            ModelResponse::calls(vec![InvocationRequest::new("c", "echo", r#"{"text":"three"}"#)]),
            ModelResponse::text("done"),
        ]));
        let mut agent = agent(gateway.clone());

        assert_eq!(agent.run("go").await.unwrap(), "done");
        assert_eq!(gateway.call_count(), 3);
        assert_eq!(
            tool_results(agent.conversation()),
            vec![
                ("a".to_string(), "echo: one".to_string()),
                ("b".to_string(), "echo: two".to_string()),
                ("c".to_string(), "echo: three".to_string()),
            ]
        );

        // The second request carries the invocation turn and both results.
        let second = gateway.request(1);
        let roles: Vec<Role> = second.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Tool]
        );
        assert_eq!(second[2].tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_does_not_stop_the_loop() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            ModelResponse::calls(vec![InvocationRequest::new("x", "rm_everything", "{}")]),
            ModelResponse::text("recovered"),
        ]));
        let mut agent = agent(gateway.clone());

        assert_eq!(agent.run("go").await.unwrap(), "recovered");
        let results = tool_results(agent.conversation());
        assert_eq!(results.len(), 1);
        assert!(results[0].1.starts_with("Error: Tool not found: rm_everything"));
        assert_eq!(gateway.call_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_arguments_become_a_result() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            ModelResponse::calls(vec![
                InvocationRequest::new("bad", "echo", "{not json"),
                InvocationRequest::new("good", "echo", r#"{"text":"ok"}"#),
            ]),
            ModelResponse::text("fine"),
        ]));
        let mut agent = agent(gateway);

        agent.run("go").await.unwrap();
        let results = tool_results(agent.conversation());
        assert_eq!(results.len(), 2);
        assert!(results[0].1.contains("malformed JSON"));
        assert_eq!(results[1].1, "echo: ok");
    }

    #[tokio::test]
    async fn test_gateway_failure_propagates() {
        let gateway = Arc::new(ScriptedGateway::failing("connection refused"));
        let mut agent = agent(gateway);

        let err = agent.run("hi").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_second_run_reuses_history() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            ModelResponse::text("first"),
            ModelResponse::text("second"),
        ]));
        let mut agent = agent(gateway.clone());

        agent.run("one").await.unwrap();
        agent.run("two").await.unwrap();
        // system, user, assistant, user
        assert_eq!(gateway.request(1).len(), 4);

        agent.reset();
        assert!(agent.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_empty_answer_is_accepted() {
        let gateway = Arc::new(ScriptedGateway::new(vec![ModelResponse::default()]));
        let mut agent = agent(gateway);
        assert_eq!(agent.run("hi").await.unwrap(), "");
    }

    #[test]
    fn test_host_tools_never_shadow_local_tools() {
        let gateway = Arc::new(ScriptedGateway::new(Vec::new()));
        let mut agent = agent(gateway);
        let added = agent.add_host_tools(vec![
            EchoTool::named("echo"),
            EchoTool::named("git__status"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(agent.tools().names(), vec!["echo", "git__status"]);
    }

    #[tokio::test]
    async fn test_delegation_round_trip() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            // parent asks for delegation
            ModelResponse::calls(vec![InvocationRequest::new(
                "d1",
                "delegate_task",
                r#"{"agent_name":"scout","task":"find the entry point"}"#,
            )]),
            // worker uses its only tool, then answers
            ModelResponse::calls(vec![InvocationRequest::new("w1", "echo", r#"{"text":"main"}"#)]),
            ModelResponse::text("entry point is main.rs"),
            // parent wraps up
            ModelResponse::text("It starts in main.rs."),
        ]));
        let mut agent = agent(gateway.clone());
        agent.register_tool(EchoTool::named("write"));

        let mut manager = SubagentManager::new(gateway.clone(), 5);
        manager.register_profile(SubagentProfile {
            name: "scout".into(),
            description: "Finds things".into(),
            system_prompt: "You scout.".into(),
            tools: Some(vec!["echo".into()]),
        });
        agent.enable_delegation(manager);

        assert_eq!(agent.run("where does it start?").await.unwrap(), "It starts in main.rs.");
        assert_eq!(gateway.offered_tools(0), vec!["delegate_task", "echo", "write"]);
        // worker requests only offer the allow-listed tool
        assert_eq!(gateway.offered_tools(1), vec!["echo"]);
        assert_eq!(gateway.request(1)[0].content.as_deref(), Some("You scout."));
        assert_eq!(
            tool_results(agent.conversation()),
            vec![("d1".to_string(), "entry point is main.rs".to_string())]
        );
    }

    fn scout(tools: Option<Vec<&str>>) -> SubagentManager {
        let gateway = Arc::new(ScriptedGateway::new(Vec::new()));
        let mut manager = SubagentManager::new(gateway, 5);
        manager.register_profile(SubagentProfile {
            name: "scout".into(),
            description: "Finds things".into(),
            system_prompt: "You scout.".into(),
            tools: tools.map(|t| t.into_iter().map(String::from).collect()),
        });
        manager
    }

    #[test]
    fn test_tools_added_after_delegation_reach_workers() {
        let gateway = Arc::new(ScriptedGateway::new(Vec::new()));
        let mut agent = AgentLoop::new(gateway, "parent");
        agent.register_tool(EchoTool::named("read"));
        let manager = agent.enable_delegation(scout(Some(vec!["read", "git__status", "write"])));

        agent.add_host_tools(vec![EchoTool::named("git__status")]);
        assert_eq!(
            manager.worker("scout").unwrap().tools().names(),
            vec!["git__status", "read"]
        );

        agent.register_tool(EchoTool::named("write"));
        assert_eq!(
            manager.worker("scout").unwrap().tools().names(),
            vec!["git__status", "read", "write"]
        );
    }

    #[test]
    fn test_enabling_delegation_twice_keeps_workers_flat() {
        let gateway = Arc::new(ScriptedGateway::new(Vec::new()));
        let mut agent = AgentLoop::new(gateway, "parent");
        agent.register_tool(EchoTool::named("read"));
        agent.enable_delegation(scout(None));
        let manager = agent.enable_delegation(scout(None));

        assert_eq!(agent.tools().names(), vec!["delegate_task", "read"]);
        assert_eq!(manager.worker("scout").unwrap().tools().names(), vec!["read"]);
    }

    #[test]
    fn test_preview_cuts_on_char_boundary_and_counts_bytes() {
        let text = "é".repeat(150);
        let out = preview(&text);
        assert!(out.starts_with(&"é".repeat(100)));
        assert!(out.ends_with("... (300 bytes)"));
        assert_eq!(preview("short"), "short");
    }
}
