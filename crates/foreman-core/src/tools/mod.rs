pub mod delegate;
pub mod filesystem;
pub mod search;
pub mod shell;
pub mod skill;
pub mod todo;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::error::ToolError;
use crate::llm::ToolDefinition;

/// Trait for tools callable by the LLM agent.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;
    async fn execute(&self, params: serde_json::Value) -> Result<String>;
}

/// Registry of available tools.
///
/// Handlers are reference-counted so a registry can be copied into a
/// subagent without sharing the map itself: registering into the copy never
/// touches the original.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    ///
    /// Replacement is logged and the previous handler is returned.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let name = tool.name().to_string();
        let previous = self.tools.insert(name.clone(), tool);
        if previous.is_some() {
            warn!("Tool '{name}' registered twice; previous handler replaced");
        }
        previous
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tool definitions offered to the model, in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Copy of this registry restricted to `allow_list`.
    ///
    /// `None` copies every tool. Names in the list that are not registered
    /// here are skipped.
    pub fn scoped(&self, allow_list: Option<&[String]>) -> ToolRegistry {
        let Some(allowed) = allow_list else {
            return self.clone();
        };
        let tools = allowed
            .iter()
            .filter_map(|name| self.tools.get(name).map(|t| (name.clone(), t.clone())))
            .collect();
        ToolRegistry { tools }
    }

    /// Validate `params` against the tool's schema and run it.
    pub async fn execute(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> std::result::Result<String, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
            available: self.names().join(", "),
        })?;

        let errors = validate_params(&params, &tool.parameters_schema());
        if !errors.is_empty() {
            return Err(ToolError::InvalidArguments {
                name: name.to_string(),
                reason: errors.join("; "),
            });
        }

        tool.execute(params).await.map_err(|e| ToolError::Failed {
            name: name.to_string(),
            message: format!("{e:#}"),
        })
    }

    /// Run a model-proposed call from its raw JSON arguments.
    ///
    /// Never fails: unknown tools, malformed arguments and handler errors all
    /// come back as `Error: ...` text for the model to read.
    pub async fn invoke(&self, name: &str, raw_args: &str) -> String {
        let params = match parse_arguments(raw_args) {
            Ok(p) => p,
            Err(e) => {
                let err = ToolError::InvalidArguments {
                    name: name.to_string(),
                    reason: format!("malformed JSON arguments: {e}"),
                };
                return format!("Error: {err}");
            }
        };

        match self.execute(name, params).await {
            Ok(output) => output,
            Err(e) => format!("Error: {e}"),
        }
    }
}

/// Providers send `""` for calls without arguments; treat that as `{}`.
fn parse_arguments(raw: &str) -> serde_json::Result<serde_json::Value> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw)
}

/// Read a required string parameter.
pub(crate) fn required_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing required parameter: {key}"))
}

/// Validate tool parameters against a JSON schema.
/// Returns a list of validation error strings (empty if valid).
fn validate_params(params: &serde_json::Value, schema: &serde_json::Value) -> Vec<String> {
    let mut errors = Vec::new();
    validate_value(params, schema, "", &mut errors);
    errors
}

fn validate_value(
    val: &serde_json::Value,
    schema: &serde_json::Value,
    path: &str,
    errors: &mut Vec<String>,
) {
    let display_path = if path.is_empty() { "root" } else { path };

    if let Some(expected_type) = schema.get("type").and_then(|t| t.as_str()) {
        let type_ok = match expected_type {
            "object" => val.is_object(),
            "array" => val.is_array(),
            "string" => val.is_string(),
            "integer" => val.is_i64() || val.is_u64(),
            "number" => val.is_number(),
            "boolean" => val.is_boolean(),
            "null" => val.is_null(),
            _ => true,
        };
        if !type_ok {
            errors.push(format!("{display_path}: expected type '{expected_type}'"));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(val) {
            errors.push(format!("{display_path}: value not in allowed enum"));
        }
    }

    if let Some(n) = val.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(|m| m.as_f64()) {
            if n < min {
                errors.push(format!("{display_path}: value {n} < minimum {min}"));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(|m| m.as_f64()) {
            if n > max {
                errors.push(format!("{display_path}: value {n} > maximum {max}"));
            }
        }
    }

    if let Some(s) = val.as_str() {
        let len = s.chars().count() as u64;
        if let Some(min_len) = schema.get("minLength").and_then(|m| m.as_u64()) {
            if len < min_len {
                errors.push(format!(
                    "{display_path}: string length {len} < minLength {min_len}"
                ));
            }
        }
        if let Some(max_len) = schema.get("maxLength").and_then(|m| m.as_u64()) {
            if len > max_len {
                errors.push(format!(
                    "{display_path}: string length {len} > maxLength {max_len}"
                ));
            }
        }
    }

    if let Some(obj) = val.as_object() {
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for field in required.iter().filter_map(|r| r.as_str()) {
                if !obj.contains_key(field) {
                    let field_path = if path.is_empty() {
                        field.to_string()
                    } else {
                        format!("{path}.{field}")
                    };
                    errors.push(format!("{field_path}: required field missing"));
                }
            }
        }
        if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
            for (key, prop_schema) in props {
                if let Some(prop_val) = obj.get(key) {
                    let prop_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    validate_value(prop_val, prop_schema, &prop_path, errors);
                }
            }
        }
    }

    if let Some(arr) = val.as_array() {
        if let Some(items_schema) = schema.get("items") {
            for (i, item) in arr.iter().enumerate() {
                let item_path = format!("{display_path}[{i}]");
                validate_value(item, items_schema, &item_path, errors);
            }
        }
    }
}
