pub mod command;
pub mod manifest;
pub mod registry;

use std::path::Path;

use tracing::{debug, info, warn};

use skillflow_core::traits::Tool;

pub use command::CommandTool;
pub use manifest::{Prerequisites, ToolManifest};
pub use registry::ToolRegistry;

/// Load command tools from a directory and register them into the registry.
///
/// Scans `dir` for subdirectories containing `tool.toml`, parses each
/// manifest, and registers the corresponding `CommandTool`.
/// Returns the number of tools successfully loaded.
pub fn load_and_register_tools(dir: &Path, registry: &mut ToolRegistry) -> usize {
    let tools = load_tools(dir);
    let count = tools.len();
    for tool in tools {
        info!(name = %tool.name(), "Registered command tool");
        registry.register(tool);
    }
    count
}

/// Load command tools from a directory, returning a vec of CommandTools.
pub fn load_tools(dir: &Path) -> Vec<CommandTool> {
    let mut tools = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            debug!(path = %dir.display(), error = %e, "Cannot read tools directory");
            return tools;
        }
    };

    let mut dirs: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    dirs.sort();

    for tool_dir in dirs {
        if !tool_dir.is_dir() {
            continue;
        }

        let manifest_path = tool_dir.join("tool.toml");
        if !manifest_path.exists() {
            debug!(path = %tool_dir.display(), "No tool.toml, skipping");
            continue;
        }

        let content = match std::fs::read_to_string(&manifest_path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %manifest_path.display(), error = %e, "Failed to read tool manifest");
                continue;
            }
        };

        let manifest: ToolManifest = match toml::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %manifest_path.display(), error = %e, "Failed to parse tool manifest");
                continue;
            }
        };

        if let Err(reason) = check_prerequisites(&manifest.prerequisites) {
            warn!(
                tool = %manifest.name,
                reason = %reason,
                "Skipping tool: prerequisites not met"
            );
            continue;
        }

        match CommandTool::new(manifest, tool_dir) {
            Ok(tool) => tools.push(tool),
            Err(e) => {
                warn!(error = %e, "Failed to create command tool");
            }
        }
    }

    tools
}

/// Check that a tool's prerequisites are met.
fn check_prerequisites(prereqs: &Prerequisites) -> std::result::Result<(), String> {
    for bin in &prereqs.required_binaries {
        if which(bin).is_none() {
            return Err(format!("required binary '{}' not found on PATH", bin));
        }
    }

    for var in &prereqs.required_env {
        if std::env::var(var).is_err() {
            return Err(format!("required env var '{}' is not set", var));
        }
    }

    Ok(())
}

/// Searches PATH for a binary.
fn which(name: &str) -> Option<std::path::PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_tool(root: &Path, dir: &str, manifest: &str) {
        let tool_dir = root.join(dir);
        fs::create_dir_all(&tool_dir).unwrap();
        fs::write(tool_dir.join("tool.toml"), manifest).unwrap();
    }

    #[test]
    fn load_from_temp_dir() {
        let tmp = tempfile::tempdir().unwrap();
        write_tool(
            tmp.path(),
            "echo",
            r#"
name = "echo"
description = "Echo back input"
command = "cat"
"#,
        );

        let mut registry = ToolRegistry::new();
        let count = load_and_register_tools(tmp.path(), &mut registry);
        assert_eq!(count, 1);
        assert!(registry.get("echo").is_some());
    }

    #[test]
    fn skip_invalid_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        write_tool(tmp.path(), "bad", "not valid toml {{{");
        assert!(load_tools(tmp.path()).is_empty());
    }

    #[test]
    fn skip_missing_dir() {
        assert!(load_tools(Path::new("/nonexistent/path/to/tools")).is_empty());
    }

    #[test]
    fn skip_tool_with_missing_env() {
        let tmp = tempfile::tempdir().unwrap();
        write_tool(
            tmp.path(),
            "needs_env",
            r#"
name = "needs_env"
command = "echo"

[prerequisites]
required_env = ["_SKILLFLOW_UNSET_ENV_XYZ"]
"#,
        );
        assert!(load_tools(tmp.path()).is_empty());
    }

    #[test]
    fn skip_tool_with_missing_binary() {
        let tmp = tempfile::tempdir().unwrap();
        write_tool(
            tmp.path(),
            "needs_bin",
            r#"
name = "needs_bin"
command = "echo"

[prerequisites]
required_binaries = ["_skillflow_nonexistent_binary_xyz"]
"#,
        );
        assert!(load_tools(tmp.path()).is_empty());
    }
}
