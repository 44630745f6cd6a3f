mod provider;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use foreman_config::{
    find_config_path, foreman_home, load_config, resolve_workspace, save_config, Config,
};
use foreman_core::agent::{builtin_profiles, AgentLoop, SkillRegistry, SubagentManager};
use foreman_core::mcp::McpServerManager;
use foreman_core::tools::filesystem::{EditTool, ReadTool, WriteTool};
use foreman_core::tools::search::{GlobTool, GrepTool};
use foreman_core::tools::shell::BashTool;
use foreman_core::tools::skill::LoadSkillTool;
use foreman_core::tools::todo::{TodoManager, TodoWriteTool};
use foreman_core::RigGateway;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const SYSTEM_PROMPT: &str = "You are a helpful coding assistant with access to tools.
You can execute bash commands, read/write files, and search code.

IMPORTANT: Use the todo_write tool to track your tasks when working on multi-step tasks.
- Create a todo list at the start of complex tasks
- Update task status as you work (pending -> in_progress -> completed)
- This helps the user see your progress

You can delegate specialized tasks to subagents using the delegate_task tool:
- explorer: For searching and exploring the codebase
- researcher: For reading and understanding code
- planner: For creating implementation plans";

const EXAMPLE_SKILL: &str = "---
name: code-review
description: Checklist for reviewing a change before it is merged
---

# Code Review

1. Read the diff end to end before commenting.
2. Check error paths and edge cases, not just the happy path.
3. Confirm new behavior has tests.
4. Flag naming or structure that will confuse the next reader.
";

/// Render markdown text to the terminal using termimad.
fn render_markdown(text: &str) {
    let skin = termimad::MadSkin::default();
    skin.print_text(text);
}

#[cfg(unix)]
fn save_terminal_state() -> Option<nix::sys::termios::Termios> {
    nix::sys::termios::tcgetattr(std::io::stdin()).ok()
}

#[cfg(unix)]
fn restore_terminal_state(saved: &nix::sys::termios::Termios) {
    let _ = nix::sys::termios::tcsetattr(
        std::io::stdin(),
        nix::sys::termios::SetArg::TCSADRAIN,
        saved,
    );
}

/// Drop keystrokes typed while the agent was busy.
#[cfg(unix)]
fn flush_pending_input() {
    let _ = nix::sys::termios::tcflush(std::io::stdin(), nix::sys::termios::FlushArg::TCIFLUSH);
}

#[derive(Parser)]
#[command(name = "foreman", about = "Coding agent that delegates to scoped subagents", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log agent steps at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Agent {
        /// Single message mode (non-interactive)
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Show configuration, skills and tool hosts
    Status,
    /// Write a default config and an example skill
    Onboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = if cli.verbose {
        format!("{base_filter},foreman_core::agent=debug")
    } else {
        base_filter
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let config_path = cli.config.unwrap_or_else(find_config_path);

    match cli.command {
        Commands::Onboard => run_onboard(&config_path),
        Commands::Status => run_status(&config_path),
        Commands::Agent { message } => {
            let config = load_config(&config_path)?;
            let mut session = Session::build(&config).await?;

            let result = match message {
                Some(msg) => run_single_message(&mut session, &msg).await,
                None => run_interactive(&mut session).await,
            };
            session.mcp.disconnect_all().await;
            result
        }
    }
}

/// Everything one chat needs: the agent plus handles the REPL reports on.
struct Session {
    agent: AgentLoop,
    todos: Arc<TodoManager>,
    skills: Arc<SkillRegistry>,
    delegation: Arc<SubagentManager>,
    mcp: McpServerManager,
}

impl Session {
    async fn build(config: &Config) -> Result<Self> {
        let workspace = resolve_workspace(&config.agent.workspace);
        std::fs::create_dir_all(&workspace).with_context(|| {
            format!("failed to create workspace '{}'", workspace.display())
        })?;
        let cwd = std::env::current_dir()?;

        let model = provider::create_model(config)?;
        let gateway = Arc::new(
            RigGateway::new(model, config.agent.model.clone())
                .with_temperature(config.agent.temperature as f64)
                .with_max_tokens(config.agent.max_tokens as u64),
        );

        let skills_dir = config
            .agent
            .skills_dir
            .as_deref()
            .map(resolve_workspace)
            .unwrap_or_else(|| cwd.join("skills"));
        let mut skills = SkillRegistry::new();
        let loaded = skills.load_from_dir(&skills_dir);
        tracing::info!("Loaded {loaded} skill(s) from {}", skills_dir.display());
        let skills = Arc::new(skills);

        let mut prompt = SYSTEM_PROMPT.to_string();
        let skills_prompt = skills.metadata_prompt();
        if !skills_prompt.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&skills_prompt);
        }
        let mut agent = AgentLoop::new(gateway.clone(), prompt);

        let allowed_dir = config
            .tools
            .restrict_to_workspace
            .then(|| workspace.clone());
        let todos = Arc::new(TodoManager::new());
        agent.register_tool(Arc::new(BashTool::new(
            workspace.clone(),
            config.tools.exec.timeout_secs,
            config.tools.restrict_to_workspace,
        )));
        agent.register_tool(Arc::new(ReadTool::new(allowed_dir.clone())));
        agent.register_tool(Arc::new(WriteTool::new(allowed_dir.clone())));
        agent.register_tool(Arc::new(EditTool::new(allowed_dir)));
        agent.register_tool(Arc::new(GlobTool::new(cwd.clone())));
        agent.register_tool(Arc::new(GrepTool::new(cwd)));
        agent.register_tool(Arc::new(TodoWriteTool::new(todos.clone())));

        let mut mcp = McpServerManager::new();
        for server in &config.mcp_servers {
            if let Err(e) = mcp.add_server(server).await {
                tracing::warn!("Skipping MCP server '{}': {e:#}", server.name);
            }
        }
        let added = agent.add_host_tools(mcp.tools().await);
        if added > 0 {
            tracing::info!("Registered {added} MCP tool(s)");
        }

        agent.register_tool(Arc::new(LoadSkillTool::new(skills.clone())));

        let mut manager = SubagentManager::new(gateway, config.subagents.max_iterations);
        for profile in builtin_profiles() {
            manager.register_profile(profile);
        }
        for profile in &config.subagents.profiles {
            manager.register_profile(profile.clone().into());
        }
        let delegation = agent.enable_delegation(manager);

        Ok(Self {
            agent,
            todos,
            skills,
            delegation,
            mcp,
        })
    }

    fn print_help(&self) {
        println!("Commands:");
        println!("  /help    - Show this help");
        println!("  /reset   - Clear the conversation and todo list");
        println!("  /tools   - List available tools");
        println!("  /agents  - List subagent profiles");
        println!("  /skills  - List loaded skills");
        println!("  /todos   - Show the current todo list");
        println!("  exit     - Quit");
        println!();
    }

    /// Handle a slash command. Returns false when `input` is not one.
    async fn command(&mut self, input: &str) -> bool {
        match input {
            "/help" => self.print_help(),
            "/reset" => {
                self.agent.reset();
                self.todos.clear().await;
                println!("Conversation cleared.");
                println!();
            }
            "/tools" => {
                println!("Tools:");
                for name in self.agent.tools().names() {
                    println!("  {name}");
                }
                println!();
            }
            "/agents" => {
                println!("Subagents:");
                println!("{}", self.delegation.descriptions());
                println!();
            }
            "/skills" => {
                if self.skills.is_empty() {
                    println!("No skills loaded.");
                } else {
                    println!("Skills:");
                    for (name, description) in self.skills.metadata() {
                        println!("  {name}: {description}");
                    }
                }
                println!();
            }
            "/todos" => {
                let rendered = self.todos.render().await;
                if rendered.is_empty() {
                    println!("No todos.");
                } else {
                    println!("{rendered}");
                }
                println!();
            }
            _ => return false,
        }
        true
    }
}

async fn run_single_message(session: &mut Session, message: &str) -> Result<()> {
    let response = session.agent.run(message).await?;
    render_markdown(&response);
    Ok(())
}

async fn run_interactive(session: &mut Session) -> Result<()> {
    #[cfg(unix)]
    let saved_term = save_terminal_state();

    let history_dir = foreman_home();
    std::fs::create_dir_all(&history_dir)?;
    let history_path = history_dir.join("history");

    let mut rl = DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    println!("foreman interactive mode (type /help for commands, Ctrl-D to quit)");
    println!();

    let result = loop {
        #[cfg(unix)]
        flush_pending_input();

        match rl.readline("you> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);

                if matches!(input, "exit" | "quit" | "/exit" | "/quit") {
                    break Ok(());
                }
                if session.command(input).await {
                    continue;
                }

                match session.agent.run(input).await {
                    Ok(response) => {
                        println!();
                        render_markdown(&response);
                        println!();
                    }
                    Err(e) => {
                        eprintln!("Error: {e:#}");
                        println!();
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break Ok(());
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break Ok(());
            }
        }
    };

    let _ = rl.save_history(&history_path);

    #[cfg(unix)]
    if let Some(ref saved) = saved_term {
        restore_terminal_state(saved);
    }

    result
}

/// Write a default config (if none exists), the workspace, and an example skill.
fn run_onboard(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("Config already exists: {}", config_path.display());
        println!("To reset, delete it and run `foreman onboard` again.");
    } else {
        save_config(config_path, &Config::default())?;
        println!("Created config: {}", config_path.display());
    }

    let config = load_config(config_path)?;
    let workspace = resolve_workspace(&config.agent.workspace);
    std::fs::create_dir_all(&workspace)?;
    println!("Workspace: {}", workspace.display());

    let skills_dir = config
        .agent
        .skills_dir
        .as_deref()
        .map(resolve_workspace)
        .unwrap_or_else(|| PathBuf::from("skills"));
    let skill_path = skills_dir.join("code-review").join("SKILL.md");
    if !skill_path.exists() {
        if let Some(parent) = skill_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&skill_path, EXAMPLE_SKILL)?;
        println!("  Created {}", skill_path.display());
    }

    println!();
    println!("Setup complete! Next steps:");
    println!(
        "  1. Edit {} to configure your LLM provider",
        config_path.display()
    );
    println!("  2. Run `foreman agent` to start chatting");
    println!();

    Ok(())
}

fn or_not_set(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

/// Show system status and configuration summary.
fn run_status(config_path: &Path) -> Result<()> {
    println!("foreman status");
    println!();

    if config_path.exists() {
        println!("  Config:    {} (found)", config_path.display());
    } else {
        println!(
            "  Config:    {} (not found, run `foreman onboard`)",
            config_path.display()
        );
        return Ok(());
    }

    let config = load_config(config_path)?;
    let workspace = resolve_workspace(&config.agent.workspace);
    let found = |p: &Path| if p.exists() { "found" } else { "not found" };

    println!("  Workspace: {} ({})", workspace.display(), found(&workspace));
    println!("  Provider:  {}", or_not_set(&config.agent.provider));
    println!("  Model:     {}", or_not_set(&config.agent.model));
    let env_var = format!("{}_API_KEY", config.agent.provider.to_uppercase());
    let key = provider::resolve_api_key(config.provider(&config.agent.provider), &env_var);
    println!(
        "  API key:   {}",
        if key.is_some() { "configured" } else { "not configured" }
    );
    println!();

    let skills_dir = config
        .agent
        .skills_dir
        .as_deref()
        .map(resolve_workspace)
        .unwrap_or_else(|| PathBuf::from("skills"));
    let mut skills = SkillRegistry::new();
    skills.load_from_dir(&skills_dir);
    println!("  Skills:    {} in {}", skills.len(), skills_dir.display());

    println!("  Tools:");
    println!(
        "    Workspace restriction: {}",
        if config.tools.restrict_to_workspace {
            "on"
        } else {
            "off"
        }
    );
    println!("    Exec timeout: {}s", config.tools.exec.timeout_secs);
    println!();

    println!(
        "  Subagents: {} builtin, {} configured (max {} iterations)",
        builtin_profiles().len(),
        config.subagents.profiles.len(),
        config.subagents.max_iterations
    );
    if config.mcp_servers.is_empty() {
        println!("  MCP servers: none");
    } else {
        println!("  MCP servers:");
        for server in &config.mcp_servers {
            println!("    {}: {} {}", server.name, server.command, server.args.join(" "));
        }
    }

    Ok(())
}
