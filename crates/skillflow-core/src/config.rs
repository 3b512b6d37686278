use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkillflowError};

/// Top-level skillflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: ExecutionConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Limits and defaults applied to every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Loop cap used when a Loop node does not set `max_iterations`.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: usize,
    /// Wall-clock budget for a whole run, checked at node boundaries (0 = unlimited).
    #[serde(default)]
    pub max_run_duration_secs: u64,
    /// Capacity of the broadcast channel feeding event subscribers.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: default_max_iterations(),
            max_run_duration_secs: 0,
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_max_iterations() -> usize { 100 }
fn default_event_buffer() -> usize { 256 }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for run log files. Default: ./runs
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: default_log_dir(),
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_dir() -> String { "./runs".to_string() }

/// Where command-backed tool manifests are loaded from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub dirs: Vec<String>,
}

impl EngineConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SkillflowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| SkillflowError::Config(e.to_string()))
    }

    /// Run log directory, if logging is enabled.
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log
            .as_ref()
            .filter(|l| l.enabled)
            .map(|l| expand_home(&l.log_dir))
    }

    /// Tool manifest directories with `~` expanded.
    pub fn tool_dirs(&self) -> Vec<PathBuf> {
        self.tools.dirs.iter().map(|d| expand_home(d)).collect()
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
