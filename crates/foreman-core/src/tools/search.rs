use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use regex::RegexBuilder;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use super::{required_str, Tool};

const MAX_GREP_MATCHES: usize = 50;

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "node_modules"
}

/// Every regular file under `root`, skipping hidden entries and
/// `node_modules`, in file-name order. Only a failure on `root` itself is
/// an error; unreadable subtrees are logged and left out.
fn walk_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e));

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => debug!("Skipping unreadable entry: {e}"),
        }
    }
    Ok(files)
}

fn search_root(params: &serde_json::Value, default_dir: &Path) -> PathBuf {
    params
        .get("path")
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| default_dir.to_path_buf())
}

// ---------------------------------------------------------------------------
// GlobTool
// ---------------------------------------------------------------------------

pub struct GlobTool {
    default_dir: PathBuf,
}

impl GlobTool {
    pub fn new(default_dir: PathBuf) -> Self {
        Self { default_dir }
    }
}

fn glob_matches(pattern: &Pattern, root: &Path, file: &Path) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let by_name = file
        .file_name()
        .map(|n| pattern.matches_with(&n.to_string_lossy(), options))
        .unwrap_or(false);
    let relative = file.strip_prefix(root).unwrap_or(file);
    by_name || pattern.matches_path_with(relative, options)
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g., \"**/*.rs\", \"*.json\")"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "The glob pattern to match files against"
                },
                "path": {
                    "type": "string",
                    "description": "The directory to search in (defaults to the workspace)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let raw = required_str(&params, "pattern")?.to_string();
        let root = search_root(&params, &self.default_dir);

        let pattern = match Pattern::new(&raw) {
            Ok(p) => p,
            Err(e) => return Ok(format!("Error: invalid glob pattern: {e}")),
        };

        let found = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<PathBuf>> {
            let mut files = walk_files(&root)?;
            files.retain(|f| glob_matches(&pattern, &root, f));
            Ok(files)
        })
        .await?;

        match found {
            Ok(files) if files.is_empty() => Ok(format!("No files found matching pattern: {raw}")),
            Ok(files) => Ok(files
                .iter()
                .map(|f| f.display().to_string())
                .collect::<Vec<_>>()
                .join("\n")),
            Err(e) => Ok(format!("Error: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// GrepTool
// ---------------------------------------------------------------------------

pub struct GrepTool {
    default_dir: PathBuf,
}

impl GrepTool {
    pub fn new(default_dir: PathBuf) -> Self {
        Self { default_dir }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search for a pattern in files"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "The regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "The directory to search in (defaults to the workspace)"
                },
                "include": {
                    "type": "string",
                    "description": "File pattern to include (e.g., \"*.rs\")"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let raw = required_str(&params, "pattern")?.to_string();
        let root = search_root(&params, &self.default_dir);
        let suffix = params
            .get("include")
            .and_then(|v| v.as_str())
            .map(|s| s.replacen('*', "", 1));

        let re = match RegexBuilder::new(&raw).case_insensitive(true).build() {
            Ok(re) => re,
            Err(e) => return Ok(format!("Error: invalid regex: {e}")),
        };

        let matches = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<String>> {
            let files = walk_files(&root)?;

            let mut matches = Vec::new();
            for file in files {
                if let Some(suffix) = suffix.as_deref() {
                    let name = file.file_name().map(|n| n.to_string_lossy().to_string());
                    if !name.is_some_and(|n| n.ends_with(suffix)) {
                        continue;
                    }
                }
                // Binary or unreadable files are skipped.
                let Ok(content) = std::fs::read_to_string(&file) else {
                    continue;
                };
                for (idx, line) in content.lines().enumerate() {
                    if re.is_match(line) {
                        matches.push(format!("{}:{}: {}", file.display(), idx + 1, line.trim()));
                    }
                }
            }
            Ok(matches)
        })
        .await?;

        let matches = match matches {
            Ok(m) => m,
            Err(e) => return Ok(format!("Error: {e}")),
        };
        if matches.is_empty() {
            return Ok(format!("No matches found for pattern: {raw}"));
        }

        let output = matches
            .iter()
            .take(MAX_GREP_MATCHES)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        if matches.len() > MAX_GREP_MATCHES {
            Ok(format!(
                "{output}\n\n... and {} more matches",
                matches.len() - MAX_GREP_MATCHES
            ))
        } else {
            Ok(output)
        }
    }
}
