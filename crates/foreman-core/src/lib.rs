pub mod agent;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod tools;

// Re-export key types
pub use agent::{
    AgentLoop, Conversation, SkillRegistry, SubagentManager, SubagentProfile, SubagentResult, Turn,
};
pub use error::{SkillError, ToolError};
pub use llm::{ChatMessage, InvocationRequest, ModelGateway, ModelResponse, RigGateway, ToolDefinition};
pub use mcp::{McpClient, McpServerManager, ToolHost};
pub use tools::{Tool, ToolRegistry};
