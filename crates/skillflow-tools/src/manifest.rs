use serde::Deserialize;

/// Environment prerequisites for a command tool.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Prerequisites {
    /// Required binaries that must be on PATH (e.g., ["jq", "curl"]).
    #[serde(default)]
    pub required_binaries: Vec<String>,
    /// Required environment variables (e.g., ["SEARCH_API_KEY"]).
    #[serde(default)]
    pub required_env: Vec<String>,
}

/// TOML manifest for a drop-in command tool.
///
/// Lives at `<tools dir>/<name>/tool.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolManifest {
    /// Unique tool name referenced by Tool nodes (e.g., "web_search").
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Shell command to execute. `$TOOL_DIR` is substituted
    /// with the tool's directory path at runtime.
    pub command: String,

    /// Timeout for the command in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// JSON string containing the input schema.
    #[serde(default = "default_schema")]
    pub input_schema_json: String,

    /// Environment prerequisites.
    #[serde(default)]
    pub prerequisites: Prerequisites,
}

fn default_timeout() -> u64 {
    30
}

fn default_schema() -> String {
    r#"{"type":"object","properties":{}}"#.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_manifest() {
        let m: ToolManifest = toml::from_str(
            r#"
name = "echo"
command = "cat"
"#,
        )
        .unwrap();
        assert_eq!(m.name, "echo");
        assert_eq!(m.timeout_secs, 30);
        assert!(m.description.is_empty());
        assert!(m.prerequisites.required_binaries.is_empty());
    }

    #[test]
    fn parse_full_manifest() {
        let m: ToolManifest = toml::from_str(
            r#"
name = "search"
description = "Search the index"
command = "python3 $TOOL_DIR/search.py"
timeout_secs = 5
input_schema_json = '{"type":"object","properties":{"q":{"type":"string"}}}'

[prerequisites]
required_binaries = ["python3"]
required_env = ["SEARCH_KEY"]
"#,
        )
        .unwrap();
        assert_eq!(m.timeout_secs, 5);
        assert_eq!(m.prerequisites.required_binaries, vec!["python3"]);
        assert_eq!(m.prerequisites.required_env, vec!["SEARCH_KEY"]);
    }
}
