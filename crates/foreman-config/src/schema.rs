use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentDefaults,
    pub subagents: SubagentsConfig,
    pub providers: ProvidersConfig,
    pub tools: ToolsConfig,
    /// External tool hosts spoken to over stdio.
    pub mcp_servers: Vec<McpServerConfig>,
}

impl Config {
    /// Apply `MODEL` and `OPENAI_BASE_URL` overrides from the environment.
    ///
    /// Takes a lookup function so tests don't have to mutate process env.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("MODEL").filter(|m| !m.is_empty()) {
            self.agent.model = model;
        }
        if let Some(base) = lookup("OPENAI_BASE_URL").filter(|b| !b.is_empty()) {
            self.providers
                .openai
                .get_or_insert_with(ProviderConfig::default)
                .api_base = Some(base);
        }
    }

    /// Look up the provider section by provider name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "openai" => self.providers.openai.as_ref(),
            "anthropic" => self.providers.anthropic.as_ref(),
            "ollama" => self.providers.ollama.as_ref(),
            "openrouter" => self.providers.openrouter.as_ref(),
            "deepseek" => self.providers.deepseek.as_ref(),
            "groq" => self.providers.groq.as_ref(),
            "gemini" => self.providers.gemini.as_ref(),
            "mistral" => self.providers.mistral.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentDefaults {
    pub provider: String,
    pub model: String,
    pub workspace: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Directory scanned for `<name>/SKILL.md` knowledge modules.
    /// Defaults to `./skills` when unset.
    pub skills_dir: Option<String>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            workspace: "~/.foreman/workspace".into(),
            max_tokens: 8192,
            temperature: 0.7,
            skills_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubagentsConfig {
    /// Model-call/execute cycles a delegated worker may use before giving up.
    pub max_iterations: usize,
    /// Extra delegation profiles registered alongside the builtin ones.
    pub profiles: Vec<ProfileConfig>,
}

impl Default for SubagentsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            profiles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConfig {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    /// Tool allow-list. Absent means the worker inherits every parent tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub openai: Option<ProviderConfig>,
    pub anthropic: Option<ProviderConfig>,
    pub ollama: Option<ProviderConfig>,
    pub openrouter: Option<ProviderConfig>,
    pub deepseek: Option<ProviderConfig>,
    pub groq: Option<ProviderConfig>,
    pub gemini: Option<ProviderConfig>,
    pub mistral: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolsConfig {
    pub restrict_to_workspace: bool,
    pub exec: ExecToolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecToolConfig {
    pub timeout_secs: u64,
}

impl Default for ExecToolConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg: Config = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(cfg.agent.provider, "openai");
        assert_eq!(cfg.agent.model, "gpt-4o");
        assert_eq!(cfg.subagents.max_iterations, 10);
        assert_eq!(cfg.tools.exec.timeout_secs, 60);
        assert!(cfg.mcp_servers.is_empty());
    }

    #[test]
    fn profiles_and_servers_parse_camel_case() {
        let cfg: Config = serde_json::from_value(serde_json::json!({
            "subagents": {
                "maxIterations": 4,
                "profiles": [{
                    "name": "reviewer",
                    "description": "Reviews diffs",
                    "systemPrompt": "You review code.",
                    "tools": ["read"]
                }]
            },
            "mcpServers": [{ "name": "git", "command": "mcp-git" }]
        }))
        .unwrap();

        assert_eq!(cfg.subagents.max_iterations, 4);
        let profile = &cfg.subagents.profiles[0];
        assert_eq!(profile.system_prompt, "You review code.");
        assert_eq!(profile.tools.as_deref(), Some(&["read".to_string()][..]));
        assert_eq!(cfg.mcp_servers[0].command, "mcp-git");
        assert!(cfg.mcp_servers[0].args.is_empty());
    }

    #[test]
    fn env_overrides_model_and_base_url() {
        let mut cfg = Config::default();
        cfg.apply_env_overrides(|key| match key {
            "MODEL" => Some("gpt-4o-mini".into()),
            "OPENAI_BASE_URL" => Some("http://localhost:8080/v1".into()),
            _ => None,
        });
        assert_eq!(cfg.agent.model, "gpt-4o-mini");
        assert_eq!(
            cfg.provider("openai").and_then(|p| p.api_base.as_deref()),
            Some("http://localhost:8080/v1")
        );
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env_overrides(|_| Some(String::new()));
        assert_eq!(cfg.agent.model, "gpt-4o");
        assert!(cfg.providers.openai.is_none());
    }
}
