use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use super::{required_str, Tool};

const MAX_READ_CHARS: usize = 50_000;

fn expand_home(path: &str) -> PathBuf {
    if path.starts_with("~/") || path == "~" {
        dirs::home_dir()
            .map(|h| h.join(path.strip_prefix("~/").unwrap_or("")))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

/// Drop `.` and fold `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-join the rest, so
/// symlinks are resolved even for files that do not exist yet.
fn canonicalize_existing(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if let Ok(real) = ancestor.canonicalize() {
            return match path.strip_prefix(ancestor) {
                Ok(rest) if !rest.as_os_str().is_empty() => real.join(rest),
                _ => real,
            };
        }
    }
    path.to_path_buf()
}

/// Resolve a path, expanding `~` and enforcing the optional directory
/// restriction. `..` is folded before the check, so a file about to be
/// written cannot climb out of the allowed directory.
fn resolve_path(path: &str, allowed_dir: Option<&Path>) -> std::result::Result<PathBuf, String> {
    let expanded = expand_home(path);
    let absolute =
        std::path::absolute(&expanded).map_err(|e| format!("Invalid path {path}: {e}"))?;
    let resolved = canonicalize_existing(&normalize_lexically(&absolute));

    if let Some(allowed) = allowed_dir {
        let allowed_abs = std::path::absolute(allowed).unwrap_or_else(|_| allowed.to_path_buf());
        let allowed_resolved = canonicalize_existing(&normalize_lexically(&allowed_abs));
        if !resolved.starts_with(&allowed_resolved) {
            return Err(format!(
                "Path {path} is outside allowed directory {}",
                allowed.display()
            ));
        }
    }

    Ok(resolved)
}

fn truncate_chars(content: String, max: usize) -> String {
    if content.len() <= max {
        return content;
    }
    let mut end = max;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n... (truncated, {} more bytes)",
        &content[..end],
        content.len() - end
    )
}

// ---------------------------------------------------------------------------
// ReadTool
// ---------------------------------------------------------------------------

pub struct ReadTool {
    allowed_dir: Option<PathBuf>,
}

impl ReadTool {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The path to the file to read"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let path = required_str(&params, "file_path")?;

        let file_path = match resolve_path(path, self.allowed_dir.as_deref()) {
            Ok(p) => p,
            Err(e) => return Ok(format!("Error: {e}")),
        };
        if !file_path.exists() {
            return Ok(format!("Error: File not found: {path}"));
        }
        if !file_path.is_file() {
            return Ok(format!("Error: Not a file: {path}"));
        }
        match tokio::fs::read_to_string(&file_path).await {
            Ok(content) => Ok(truncate_chars(content, MAX_READ_CHARS)),
            Err(e) => Ok(format!("Error: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// WriteTool
// ---------------------------------------------------------------------------

pub struct WriteTool {
    allowed_dir: Option<PathBuf>,
}

impl WriteTool {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file (creates directories if needed)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let path = required_str(&params, "file_path")?;
        let content = required_str(&params, "content")?;

        let file_path = match resolve_path(path, self.allowed_dir.as_deref()) {
            Ok(p) => p,
            Err(e) => return Ok(format!("Error: {e}")),
        };
        if let Some(parent) = file_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(format!("Error: {e}"));
            }
        }
        match tokio::fs::write(&file_path, content).await {
            Ok(()) => Ok(format!("Successfully wrote to {path}")),
            Err(e) => Ok(format!("Error: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// EditTool
// ---------------------------------------------------------------------------

pub struct EditTool {
    allowed_dir: Option<PathBuf>,
}

impl EditTool {
    pub fn new(allowed_dir: Option<PathBuf>) -> Self {
        Self { allowed_dir }
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing a specific string with another string"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "The path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact string to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The string to replace it with"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let path = required_str(&params, "file_path")?;
        let old_string = required_str(&params, "old_string")?;
        let new_string = required_str(&params, "new_string")?;

        let file_path = match resolve_path(path, self.allowed_dir.as_deref()) {
            Ok(p) => p,
            Err(e) => return Ok(format!("Error: {e}")),
        };
        if !file_path.exists() {
            return Ok(format!("Error: File not found: {path}"));
        }

        let content = match tokio::fs::read_to_string(&file_path).await {
            Ok(c) => c,
            Err(e) => return Ok(format!("Error: {e}")),
        };

        let count = content.matches(old_string).count();
        if count == 0 {
            return Ok(format!("Error: Could not find the specified string in {path}"));
        }
        if count > 1 {
            return Ok(format!(
                "Error: Found {count} occurrences of the string. Please provide a more specific string to ensure a unique match."
            ));
        }

        let new_content = content.replacen(old_string, new_string, 1);
        match tokio::fs::write(&file_path, new_content).await {
            Ok(()) => Ok(format!("Successfully edited {path}")),
            Err(e) => Ok(format!("Error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "hello world").unwrap();

        let tool = ReadTool::new(None);
        let result = tool
            .execute(serde_json::json!({"file_path": file.to_str().unwrap()}))
            .await
            .unwrap();
        assert_eq!(result, "hello world");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let tool = ReadTool::new(None);
        let result = tool
            .execute(serde_json::json!({"file_path": missing.to_str().unwrap()}))
            .await
            .unwrap();
        assert!(result.starts_with("Error: File not found"));
    }

    #[tokio::test]
    async fn test_read_outside_allowed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let outside = other.path().join("secret.txt");
        std::fs::write(&outside, "x").unwrap();

        let tool = ReadTool::new(Some(dir.path().to_path_buf()));
        let result = tool
            .execute(serde_json::json!({"file_path": outside.to_str().unwrap()}))
            .await
            .unwrap();
        assert!(result.contains("outside allowed directory"));
    }

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a/b/deep.txt");

        let tool = WriteTool::new(None);
        let result = tool
            .execute(serde_json::json!({
                "file_path": file.to_str().unwrap(),
                "content": "deep"
            }))
            .await
            .unwrap();

        assert!(result.starts_with("Successfully wrote to"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "deep");
    }

    #[tokio::test]
    async fn test_edit_unique_match() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("edit.txt");
        std::fs::write(&file, "hello world").unwrap();

        let tool = EditTool::new(None);
        let result = tool
            .execute(serde_json::json!({
                "file_path": file.to_str().unwrap(),
                "old_string": "world",
                "new_string": "rust"
            }))
            .await
            .unwrap();

        assert!(result.starts_with("Successfully edited"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello rust");
    }

    #[tokio::test]
    async fn test_edit_missing_string() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("edit.txt");
        std::fs::write(&file, "hello world").unwrap();

        let tool = EditTool::new(None);
        let result = tool
            .execute(serde_json::json!({
                "file_path": file.to_str().unwrap(),
                "old_string": "absent",
                "new_string": "x"
            }))
            .await
            .unwrap();
        assert!(result.starts_with("Error: Could not find the specified string"));
    }

    #[tokio::test]
    async fn test_edit_ambiguous_match_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("edit.txt");
        std::fs::write(&file, "foo bar foo").unwrap();

        let tool = EditTool::new(None);
        let result = tool
            .execute(serde_json::json!({
                "file_path": file.to_str().unwrap(),
                "old_string": "foo",
                "new_string": "qux"
            }))
            .await
            .unwrap();

        assert!(result.contains("Found 2 occurrences"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "foo bar foo");
    }

    #[tokio::test]
    async fn test_write_cannot_climb_out_of_allowed_dir() {
        let root = tempfile::tempdir().unwrap();
        let ws = root.path().join("ws");
        std::fs::create_dir_all(&ws).unwrap();
        let escape = format!("{}/../outside/pwned.txt", ws.display());

        let tool = WriteTool::new(Some(ws.clone()));
        let result = tool
            .execute(serde_json::json!({"file_path": escape, "content": "x"}))
            .await
            .unwrap();

        assert!(result.contains("outside allowed directory"));
        assert!(!root.path().join("outside/pwned.txt").exists());
        assert!(!root.path().join("outside").exists());
    }

    #[tokio::test]
    async fn test_edit_cannot_climb_out_of_allowed_dir() {
        let root = tempfile::tempdir().unwrap();
        let ws = root.path().join("ws");
        std::fs::create_dir_all(&ws).unwrap();
        let target = root.path().join("secret.txt");
        std::fs::write(&target, "keep me").unwrap();

        let tool = EditTool::new(Some(ws.clone()));
        let result = tool
            .execute(serde_json::json!({
                "file_path": format!("{}/./sub/../../secret.txt", ws.display()),
                "old_string": "keep",
                "new_string": "lost"
            }))
            .await
            .unwrap();

        assert!(result.contains("outside allowed directory"));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "keep me");
    }

    #[tokio::test]
    async fn test_dotdot_that_stays_inside_is_allowed() {
        let ws = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(ws.path().join("sub")).unwrap();
        let path = format!("{}/sub/../new/file.txt", ws.path().display());

        let tool = WriteTool::new(Some(ws.path().to_path_buf()));
        let result = tool
            .execute(serde_json::json!({"file_path": path, "content": "ok"}))
            .await
            .unwrap();

        assert!(result.starts_with("Successfully wrote to"));
        assert_eq!(
            std::fs::read_to_string(ws.path().join("new/file.txt")).unwrap(),
            "ok"
        );
    }

    #[test]
    fn normalize_folds_dot_and_dotdot() {
        assert_eq!(
            normalize_lexically(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize_lexically(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(10);
        let out = truncate_chars(text, 5);
        assert!(out.starts_with("éé\n"));
        assert!(out.contains("truncated"));
    }
}
