use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{required_str, Tool};

const MAX_OUTPUT: usize = 10_000;

const DENY_PATTERNS: &[&str] = &[
    r"\brm\s+-[rf]{1,2}\b",
    r"\brmdir\s+/s\b",
    r"\b(mkfs|diskpart)\b",
    r"\bdd\s+if=",
    r">\s*/dev/sd",
    r"\b(shutdown|reboot|poweroff)\b",
    r":\(\)\s*\{.*\};\s*:",
];

/// Runs a command through `sh -c` in the workspace, with a timeout and a
/// deny-list of destructive patterns.
pub struct BashTool {
    timeout: Duration,
    working_dir: PathBuf,
    deny_patterns: Vec<Regex>,
    restrict_to_workspace: bool,
    absolute_path_re: Option<Regex>,
}

impl BashTool {
    pub fn new(working_dir: PathBuf, timeout_secs: u64, restrict_to_workspace: bool) -> Self {
        let deny_patterns = DENY_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        Self {
            timeout: Duration::from_secs(timeout_secs),
            working_dir,
            deny_patterns,
            restrict_to_workspace,
            absolute_path_re: Regex::new(r#"(?:^|[\s|>])(/[^\s"'>]+)"#).ok(),
        }
    }

    fn guard_command(&self, command: &str) -> Option<String> {
        let lower = command.to_lowercase();
        if self.deny_patterns.iter().any(|re| re.is_match(&lower)) {
            return Some("Error: Command blocked by safety guard (dangerous pattern detected)".into());
        }

        if !self.restrict_to_workspace {
            return None;
        }

        if command.contains("../") {
            return Some("Error: Command blocked by safety guard (path traversal detected)".into());
        }

        let cwd = self
            .working_dir
            .canonicalize()
            .unwrap_or_else(|_| self.working_dir.clone());
        let re = self.absolute_path_re.as_ref()?;
        for cap in re.captures_iter(command) {
            let Some(m) = cap.get(1) else { continue };
            let p = Path::new(m.as_str());
            let resolved = p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
            if !resolved.starts_with(&cwd) {
                return Some(
                    "Error: Command blocked by safety guard (path outside working dir)".into(),
                );
            }
        }

        None
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command and return the output"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let command = required_str(&params, "command")?;

        if let Some(err) = self.guard_command(command) {
            warn!("Blocked command: {command}");
            return Ok(err);
        }
        debug!("bash: {command}");

        let result = tokio::time::timeout(
            self.timeout,
            Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&self.working_dir)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Ok(format!("Error executing command: {e}")),
            Err(_) => {
                return Ok(format!(
                    "Error: Command timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            }
        };

        let mut parts = Vec::new();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.is_empty() {
            parts.push(stdout.to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            parts.push(format!("STDERR:\n{stderr}"));
        }
        if !output.status.success() {
            parts.push(format!(
                "\nExit code: {}",
                output.status.code().unwrap_or(-1)
            ));
        }

        let text = if parts.is_empty() {
            "(no output)".to_string()
        } else {
            parts.join("\n")
        };

        if text.len() > MAX_OUTPUT {
            let mut end = MAX_OUTPUT;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            Ok(format!(
                "{}\n... (truncated, {} more bytes)",
                &text[..end],
                text.len() - end
            ))
        } else {
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tool(dir: &Path, restrict: bool) -> BashTool {
        BashTool::new(dir.to_path_buf(), 10, restrict)
    }

    #[test]
    fn test_guard_allows_safe_commands() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(dir.path(), false);
        assert!(tool.guard_command("echo hello").is_none());
        assert!(tool.guard_command("ls -la /etc").is_none());
    }

    #[test]
    fn test_guard_blocks_destructive_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(dir.path(), false);
        for cmd in ["rm -rf /", "RM -f data.db", "dd if=/dev/zero of=x", "reboot"] {
            let blocked = tool.guard_command(cmd);
            assert!(blocked.is_some(), "{cmd} should be blocked");
        }
    }

    #[test]
    fn test_guard_restricted_to_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(dir.path(), true);
        let traversal = tool.guard_command("cat ../../etc/passwd").unwrap();
        assert!(traversal.contains("path traversal"));
        let outside = tool.guard_command("cat /etc/passwd").unwrap();
        assert!(outside.contains("outside working dir"));
    }

    #[tokio::test]
    async fn test_exec_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(dir.path(), false);
        let result = tool
            .execute(serde_json::json!({"command": "echo hello"}))
            .await
            .unwrap();
        assert_eq!(result.trim(), "hello");
    }

    #[tokio::test]
    async fn test_exec_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let tool = make_tool(dir.path(), false);
        let result = tool
            .execute(serde_json::json!({"command": "ls"}))
            .await
            .unwrap();
        assert!(result.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_exec_nonzero_exit_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(dir.path(), false);
        let result = tool
            .execute(serde_json::json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert!(result.contains("STDERR:\noops"));
        assert!(result.contains("Exit code: 3"));
    }

    #[tokio::test]
    async fn test_exec_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let tool = make_tool(dir.path(), false);
        let result = tool
            .execute(serde_json::json!({"command": "true"}))
            .await
            .unwrap();
        assert_eq!(result, "(no output)");
    }

    #[tokio::test]
    async fn test_exec_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = BashTool::new(dir.path().to_path_buf(), 1, false);
        let result = tool
            .execute(serde_json::json!({"command": "sleep 5"}))
            .await
            .unwrap();
        assert!(result.contains("timed out after 1 seconds"));
    }
}
