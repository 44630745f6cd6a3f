use std::path::PathBuf;

use thiserror::Error;

/// Failures at the tool registry boundary.
///
/// None of these abort the agent loop: [`crate::ToolRegistry::invoke`] renders
/// them into the tool-result text the model sees on its next turn.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {name}. Available tools: {available}")]
    NotFound { name: String, available: String },

    #[error("Invalid parameters for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("{name} failed: {message}")]
    Failed { name: String, message: String },
}

/// Reasons a `SKILL.md` file is rejected during a scan.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("missing frontmatter block in {}", .0.display())]
    MissingFrontmatter(PathBuf),

    #[error("frontmatter in {} has no '{field}'", .path.display())]
    MissingField { field: &'static str, path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
