use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use foreman_config::McpServerConfig;
use rmcp::service::{Peer, RoleClient, RunningService};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::ServiceExt;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{HostToolInfo, ToolHost};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one external tool host, spoken to over the child's stdio.
pub struct McpClient {
    name: String,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpClient {
    /// Spawn the server process and complete the initialize handshake.
    pub async fn connect(config: &McpServerConfig) -> Result<Self> {
        let command = Command::new(&config.command).configure(|cmd| {
            cmd.args(&config.args)
                .envs(&config.env)
                .stderr(Stdio::null());
        });
        let transport = TokioChildProcess::new(command)
            .with_context(|| format!("failed to start MCP server '{}'", config.name))?;

        let service = tokio::time::timeout(HANDSHAKE_TIMEOUT, ().serve(transport))
            .await
            .with_context(|| format!("MCP server '{}' did not answer initialize", config.name))?
            .with_context(|| format!("MCP handshake with '{}' failed", config.name))?;
        info!("Connected to MCP server '{}'", config.name);

        Ok(Self {
            name: config.name.clone(),
            service: Mutex::new(Some(service)),
        })
    }

    async fn peer(&self) -> Result<Peer<RoleClient>> {
        match self.service.lock().await.as_ref() {
            Some(service) => Ok(service.peer().clone()),
            None => bail!("MCP server '{}' is not connected", self.name),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.service.lock().await.is_some()
    }
}

/// Text parts joined by newlines, or the raw content JSON if there are none.
fn extract_text(result: &Value) -> String {
    let content = result.get("content").cloned().unwrap_or(Value::Null);
    let parts: Vec<&str> = content
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|c| c.get("text").and_then(Value::as_str))
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    if parts.is_empty() {
        content.to_string()
    } else {
        parts.join("\n")
    }
}

#[async_trait]
impl ToolHost for McpClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<HostToolInfo>> {
        let tools = self.peer().await?.list_all_tools().await?;
        tools
            .iter()
            .map(|tool| {
                serde_json::to_value(tool)
                    .and_then(serde_json::from_value)
                    .context("malformed tool listing")
            })
            .collect()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let params = serde_json::from_value(json!({"name": name, "arguments": arguments}))
            .context("tool arguments must be a JSON object")?;
        let result = self.peer().await?.call_tool(params).await?;

        let result = serde_json::to_value(&result)?;
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            warn!("MCP tool {}__{name} reported an error", self.name);
        }
        Ok(extract_text(&result))
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(service) = self.service.lock().await.take() {
            if let Err(e) = service.cancel().await {
                warn!("MCP server '{}' did not stop cleanly: {e}", self.name);
            }
            info!("Disconnected MCP server '{}'", self.name);
        }
        Ok(())
    }
}
