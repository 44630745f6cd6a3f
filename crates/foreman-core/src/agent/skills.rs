use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::SkillError;

const SKILL_FILE: &str = "SKILL.md";

static FRONTMATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^---\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n(.*))?$").expect("valid frontmatter regex")
});

/// A knowledge module: name and description are always advertised, the body
/// is only handed out when the model loads the skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub body: String,
    pub path: PathBuf,
}

/// Parse a `SKILL.md` document. Both `name` and `description` are required.
pub fn parse_skill(content: &str, path: &Path) -> Result<Skill, SkillError> {
    let caps = FRONTMATTER_RE
        .captures(content)
        .ok_or_else(|| SkillError::MissingFrontmatter(path.to_path_buf()))?;

    let header = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let mut meta: HashMap<&str, String> = HashMap::new();
    for line in header.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            meta.insert(key.trim(), value.to_string());
        }
    }

    let mut take = |field: &'static str| {
        meta.remove(field)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SkillError::MissingField {
                field,
                path: path.to_path_buf(),
            })
    };
    let name = take("name")?;
    let description = take("description")?;

    Ok(Skill {
        name,
        description,
        body: caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
        path: path.to_path_buf(),
    })
}

/// Read and parse one `SKILL.md` file.
pub fn load_skill_file(path: &Path) -> Result<Skill, SkillError> {
    let content = std::fs::read_to_string(path).map_err(|source| SkillError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_skill(&content, path)
}

/// Named knowledge modules, kept in name order.
#[derive(Debug, Clone, Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, Skill>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `<dir>/<module>/SKILL.md` under `dir`.
    ///
    /// Invalid modules are logged and skipped; a missing directory loads
    /// nothing. Returns the number of skills added.
    pub fn load_from_dir(&mut self, dir: &Path) -> usize {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                debug!("No skills loaded from {}: {e}", dir.display());
                return 0;
            }
        };

        let mut loaded = 0;
        for entry in entries.flatten() {
            let skill_file = entry.path().join(SKILL_FILE);
            if !entry.path().is_dir() || !skill_file.is_file() {
                continue;
            }
            match load_skill_file(&skill_file) {
                Ok(skill) => {
                    self.register(skill);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping skill: {e}"),
            }
        }
        loaded
    }

    /// Add a skill, replacing any skill with the same name.
    ///
    /// Replacement is logged and the previous skill is returned.
    pub fn register(&mut self, skill: Skill) -> Option<Skill> {
        let name = skill.name.clone();
        let previous = self.skills.insert(name.clone(), skill);
        match &previous {
            Some(old) => warn!(
                "Skill '{name}' registered twice; {} replaced",
                old.path.display()
            ),
            None => debug!("Registered skill '{name}'"),
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    /// Skill names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.skills.keys().cloned().collect()
    }

    /// `(name, description)` pairs in name order.
    pub fn metadata(&self) -> impl Iterator<Item = (&str, &str)> {
        self.skills
            .values()
            .map(|s| (s.name.as_str(), s.description.as_str()))
    }

    /// One line per skill for the system prompt, or empty when there are none.
    pub fn metadata_prompt(&self) -> String {
        if self.skills.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = self
            .metadata()
            .map(|(name, description)| format!("- {name}: {description}"))
            .collect();
        format!(
            "Available skills (use load_skill tool to activate):\n{}",
            lines.join("\n")
        )
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}
