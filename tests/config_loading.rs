use std::io::Write;
use std::path::PathBuf;

use skillflow_core::config::EngineConfig;
use skillflow_engine::{plan, validate, Graph};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
default_max_iterations = 25
max_run_duration_secs = 120
event_buffer = 64

[log]
enabled = true
log_dir = "/tmp/skillflow-runs"

[tools]
dirs = ["./tools", "/opt/skillflow/tools"]
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = EngineConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.default_max_iterations, 25);
    assert_eq!(config.engine.max_run_duration_secs, 120);
    assert_eq!(config.engine.event_buffer, 64);
    assert_eq!(config.log_dir(), Some(PathBuf::from("/tmp/skillflow-runs")));
    assert_eq!(
        config.tool_dirs(),
        vec![PathBuf::from("./tools"), PathBuf::from("/opt/skillflow/tools")]
    );
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("SKILLFLOW_TEST_LOG_DIR", "/var/log/skillflow");

    let toml_content = r#"
[log]
log_dir = "${SKILLFLOW_TEST_LOG_DIR}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = EngineConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.log_dir(), Some(PathBuf::from("/var/log/skillflow")));

    std::env::remove_var("SKILLFLOW_TEST_LOG_DIR");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"# nothing configured\n").expect("write toml");

    let config = EngineConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.default_max_iterations, 100);
    assert_eq!(config.engine.max_run_duration_secs, 0);
    assert_eq!(config.engine.event_buffer, 256);
    assert!(config.log.is_none());
    assert!(config.log_dir().is_none());
    assert!(config.tool_dirs().is_empty());
}

#[test]
fn test_disabled_log_section() {
    let toml_content = r#"
[log]
enabled = false
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = EngineConfig::load(tmp.path()).expect("load config");
    assert!(config.log.is_some());
    assert!(config.log_dir().is_none());
}

#[test]
fn test_invalid_config_is_an_error() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\ndefault_max_iterations = \"lots\"\n")
        .expect("write toml");

    let err = EngineConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, skillflow_core::SkillflowError::Config(_)));
}

#[test]
fn test_workflow_file_loads_and_plans() {
    let workflow = r#"
id = "triage"
terminal = "report"

[[nodes]]
id = "fetch"
kind = "tool"
config = { tool = "fetch_issues", params = { repo = "${input.repo}" } }

[[nodes]]
id = "urgent"
kind = "transform"
config = { operation = "filter_array", source = "${fetch}", predicate = "${item.priority} == \"high\"" }

[[nodes]]
id = "report"
kind = "transform"
config = { operation = "format_text", template = "${input.repo}: ${urgent}" }

[[edges]]
source = "fetch"
target = "urgent"

[[edges]]
source = "urgent"
target = "report"
"#;

    let mut tmp = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp file");
    tmp.write_all(workflow.as_bytes()).expect("write workflow");

    let graph = Graph::load(tmp.path()).expect("load workflow");
    let validated = validate(&graph).expect("valid workflow");
    assert_eq!(validated.entry(), "fetch");
    assert_eq!(plan(&validated).order(), ["fetch", "urgent", "report"]);
}
