pub mod conversation;
pub mod r#loop;
pub mod skills;
pub mod subagent;

pub use conversation::{Conversation, Turn};
pub use r#loop::AgentLoop;
pub use skills::{Skill, SkillRegistry};
pub use subagent::{builtin_profiles, SubagentManager, SubagentProfile, SubagentResult, WorkerAgent};
