use apiflows::core::config::loader::CONFIG_FILE_NAME;
use apiflows::core::config::{ApiflowsConfig, ConfigLoader, ConfigValidator};
use apiflows::core::types::GenerationPass;
use apiflows::core::{
    AppError, ExternalServices, OutboundRequest, Point, RawPoint, ResponseSource, StubData,
    Workflow, WorkflowHost, WorkflowRunner,
};
use insta::assert_debug_snapshot;
use serde_json::json;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const STUBS: &str = "github:\n  get#/user:\n    200-ok: {login: octocat}\n    404-missing: {}\n";

/// Reads the signed-in user once per initial point.
struct UserService;

impl WorkflowHost for UserService {
    fn process(
        &mut self,
        _workflow: &Workflow,
        _initial: &Point,
        source: &mut dyn ResponseSource,
    ) -> Result<RawPoint, AppError> {
        let user = source.respond(&OutboundRequest::new("GET", "https://api.github.com/user"))?;
        let mut raw = RawPoint::new();
        raw.insert("status".into(), json!(user.status()));
        Ok(raw)
    }
}

fn load_workspace_config(toml: &str) -> ApiflowsConfig {
    clear_env();
    let workspace = TempDir::new().unwrap();
    fs::write(workspace.path().join(CONFIG_FILE_NAME), toml).unwrap();
    load(workspace.path())
}

fn load(workspace: &Path) -> ApiflowsConfig {
    let config = ConfigLoader::load_from_workspace(workspace).unwrap();
    ConfigValidator::validate(&config).unwrap();
    config
}

fn generated_runs(config: &ApiflowsConfig) -> (usize, usize, usize) {
    let data = StubData::from_yaml_str(STUBS).unwrap();
    let generator = config.generator.generator(
        data,
        vec!["context_default".to_string()],
        1,
        config.externals.clone(),
    );
    let mut session = config
        .generator
        .session(generator, vec![vec![Point::api("get", "/profile")]]);
    let runs = session.run_all(&mut UserService).unwrap();
    (
        runs,
        session.pipelines(GenerationPass::Explore).len(),
        session.pipelines(GenerationPass::Repeat).len(),
    )
}

fn replay_mismatched_method(config: &ApiflowsConfig) -> AppError {
    let data = StubData::from_yaml_str(STUBS).unwrap();
    let stubs = config.replay.replay_stubs(data, config.externals.clone());
    let mut runner = WorkflowRunner::new(stubs);
    let workflow = Workflow::new(vec![
        Point::api("get", "/profile"),
        Point::external_api("github", "post", "/user"),
    ]);
    runner.run(&mut UserService, workflow).unwrap_err()
}

fn clear_env() {
    for name in [
        "APIFLOWS_GENERATOR_MAX_TESTS",
        "APIFLOWS_GENERATOR_SKIP_DOUBLERUN",
        "APIFLOWS_GENERATOR_FOLD",
        "APIFLOWS_NORMALIZER_GENERALIZE_PATHS",
        "APIFLOWS_NORMALIZER_TOKEN_NAME",
        "APIFLOWS_REPLAY_ERROR_STATUSES",
        "APIFLOWS_REPLAY_STRICT_POINTS",
    ] {
        env::remove_var(name);
    }
}

#[test]
fn test_config_serialization_roundtrip() {
    let mut original = ApiflowsConfig::default();
    original.generator.max_tests = 12;
    original.generator.skip_doublerun = true;
    original.normalizer.token_name = "id".to_string();
    original.replay.error_statuses = vec![500];

    let toml_str = toml::to_string_pretty(&original).unwrap();
    let deserialized: ApiflowsConfig = toml::from_str(&toml_str).unwrap();

    assert_eq!(original, deserialized);
    assert_debug_snapshot!(deserialized.generator, @r"
    GeneratorConfig {
        max_tests: 12,
        skip_doublerun: true,
        fold: true,
    }
    ");
}

#[test]
fn test_default_externals() {
    let config = ApiflowsConfig::default();
    assert_eq!(config.externals, ExternalServices::default());
    assert_eq!(
        config.externals.lookup("https://api.github.com/repos/acme/app"),
        Some(("github".to_string(), "/repos/acme/app".to_string()))
    );
    assert_eq!(config.externals.lookup("https://example.com/"), None);
}

#[test]
#[serial]
fn test_configured_externals_replace_defaults() {
    clear_env();
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join(CONFIG_FILE_NAME),
        "[externals]\n\"hooks.slack.com\" = \"slack\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    assert_eq!(config.externals.len(), 1);
    assert_eq!(
        config.externals.lookup("https://hooks.slack.com/services/T0"),
        Some(("slack".to_string(), "/services/T0".to_string()))
    );
    assert!(config
        .externals
        .lookup("https://api.github.com/user")
        .is_none());
}

#[test]
#[serial]
fn test_partial_file_keeps_section_defaults() {
    clear_env();
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join(CONFIG_FILE_NAME),
        "[normalizer]\ngeneralize_paths = false\n",
    )
    .unwrap();

    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    assert!(!config.normalizer.generalize_paths);
    assert_eq!(config.normalizer.token_name, "token");
    assert_eq!(config.normalizer.token_patterns.len(), 2);
    assert_eq!(config.generator.max_tests, 100);
    assert_eq!(config.replay.error_statuses, vec![408, 500, 503]);
    assert!(config.normalizer.path_generalizer().unwrap().is_none());
}

#[test]
#[serial]
fn test_env_overrides_then_validation() {
    clear_env();
    let workspace = TempDir::new().unwrap();

    env::set_var("APIFLOWS_GENERATOR_MAX_TESTS", "0");
    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    let error = ConfigValidator::validate(&config).unwrap_err();
    assert_eq!(error.code, "CFG-004");

    env::set_var("APIFLOWS_GENERATOR_MAX_TESTS", "5");
    env::set_var("APIFLOWS_NORMALIZER_TOKEN_NAME", " ");
    let config = ConfigLoader::load_from_workspace(workspace.path()).unwrap();
    assert_eq!(config.generator.max_tests, 5);
    let error = ConfigValidator::validate(&config).unwrap_err();
    assert_eq!(error.code, "CFG-005");

    clear_env();
}

#[test]
#[serial]
fn test_unreadable_config_path() {
    clear_env();
    let workspace = TempDir::new().unwrap();
    fs::create_dir(workspace.path().join(CONFIG_FILE_NAME)).unwrap();

    let error = ConfigLoader::load_from_workspace(workspace.path()).unwrap_err();
    assert_eq!(error.code, "CFG-001");
}

#[test]
fn test_replay_expand_options_follow_config() {
    let mut config = ApiflowsConfig::default();
    config.replay.error_statuses = vec![502];
    let options = config.replay.expand_options();
    assert_eq!(options.error_statuses, vec![502]);
    assert!(!options.filter_used_asserts);
    assert!(!options.context_set_up);
}

#[test]
#[serial]
fn test_max_tests_caps_generation_runs() {
    let config = load_workspace_config("[generator]\nmax_tests = 1\n");
    assert_eq!(generated_runs(&config), (2, 2, 0));

    let config = load_workspace_config("");
    assert_eq!(generated_runs(&config), (4, 2, 2));
}

#[test]
#[serial]
fn test_skip_doublerun_drops_repeat_pass() {
    let config = load_workspace_config("[generator]\nskip_doublerun = true\n");
    assert_eq!(generated_runs(&config), (2, 2, 0));

    env::set_var("APIFLOWS_GENERATOR_SKIP_DOUBLERUN", "false");
    let workspace = TempDir::new().unwrap();
    fs::write(
        workspace.path().join(CONFIG_FILE_NAME),
        "[generator]\nskip_doublerun = true\n",
    )
    .unwrap();
    let config = load(workspace.path());
    clear_env();
    assert_eq!(generated_runs(&config), (4, 2, 2));
}

#[test]
#[serial]
fn test_strict_points_rejects_out_of_order_calls() {
    let config = load_workspace_config("[replay]\nstrict_points = true\n");
    let error = replay_mismatched_method(&config);
    assert_eq!(error.code, "POINT-001");

    let config = load_workspace_config("[replay]\nstrict_points = false\n");
    let error = replay_mismatched_method(&config);
    assert_eq!(error.code, "POINT-003");
}
