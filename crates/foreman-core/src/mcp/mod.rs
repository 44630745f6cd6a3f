//! Bridge to external tool hosts.
//!
//! Each host's tools are wrapped as local [`Tool`]s named `<host>__<tool>`,
//! so tools from different hosts never collide.

pub mod client;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use foreman_config::McpServerConfig;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::tools::Tool;

pub use client::McpClient;

/// A tool as advertised by a host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

/// Something that can list tools and run them by name.
#[async_trait]
pub trait ToolHost: Send + Sync {
    fn name(&self) -> &str;
    async fn list_tools(&self) -> Result<Vec<HostToolInfo>>;
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String>;
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Keep only the object shape the model needs: `properties` and `required`.
fn normalize_schema(schema: &Value) -> Value {
    let mut normalized = serde_json::json!({
        "type": "object",
        "properties": schema.get("properties").cloned().unwrap_or_else(|| serde_json::json!({})),
    });
    if let Some(required) = schema.get("required").filter(|r| r.is_array()) {
        normalized["required"] = required.clone();
    }
    normalized
}

/// A host tool exposed through the local [`Tool`] trait.
pub struct HostTool {
    host: Arc<dyn ToolHost>,
    name: String,
    remote_name: String,
    description: String,
    schema: Value,
}

impl HostTool {
    pub fn new(host: Arc<dyn ToolHost>, info: HostToolInfo) -> Self {
        Self {
            name: format!("{}__{}", host.name(), info.name),
            description: info
                .description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| format!("MCP tool: {}", info.name)),
            schema: normalize_schema(&info.input_schema),
            remote_name: info.name,
            host,
        }
    }
}

#[async_trait]
impl Tool for HostTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, params: Value) -> Result<String> {
        self.host.call_tool(&self.remote_name, params).await
    }
}

/// Wrap every tool a host advertises.
pub async fn host_tools(host: Arc<dyn ToolHost>) -> Result<Vec<Arc<dyn Tool>>> {
    let infos = host.list_tools().await?;
    Ok(infos
        .into_iter()
        .map(|info| Arc::new(HostTool::new(host.clone(), info)) as Arc<dyn Tool>)
        .collect())
}

/// The set of connected tool hosts, keyed by host name.
#[derive(Default)]
pub struct McpServerManager {
    servers: BTreeMap<String, Arc<dyn ToolHost>>,
}

impl McpServerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start and connect the server described by `config`.
    pub async fn add_server(&mut self, config: &McpServerConfig) -> Result<()> {
        if self.servers.contains_key(&config.name) {
            bail!("Server already exists: {}", config.name);
        }
        let client = McpClient::connect(config).await?;
        self.add_host(Arc::new(client))
    }

    /// Add an already-connected host.
    pub fn add_host(&mut self, host: Arc<dyn ToolHost>) -> Result<()> {
        let name = host.name().to_string();
        if self.servers.contains_key(&name) {
            bail!("Server already exists: {name}");
        }
        self.servers.insert(name, host);
        Ok(())
    }

    /// Disconnect and forget a host. Returns whether it was present.
    pub async fn remove_server(&mut self, name: &str) -> Result<bool> {
        match self.servers.remove(name) {
            Some(host) => {
                host.shutdown().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get_server(&self, name: &str) -> Option<Arc<dyn ToolHost>> {
        self.servers.get(name).cloned()
    }

    /// Host names, sorted.
    pub fn list_servers(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    /// Tools from every host. A host whose listing fails is logged and
    /// skipped.
    pub async fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut all = Vec::new();
        for (name, host) in &self.servers {
            match host_tools(host.clone()).await {
                Ok(tools) => {
                    info!("MCP server '{name}' provides {} tool(s)", tools.len());
                    all.extend(tools);
                }
                Err(e) => warn!("Failed to list tools from MCP server '{name}': {e:#}"),
            }
        }
        all
    }

    pub async fn disconnect_all(&mut self) {
        for (name, host) in std::mem::take(&mut self.servers) {
            if let Err(e) = host.shutdown().await {
                warn!("Failed to disconnect MCP server '{name}': {e:#}");
            }
        }
    }
}
