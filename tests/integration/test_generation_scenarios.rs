use apiflows::core::error::AppError;
use apiflows::core::stub::{OutboundRequest, ResponseSource};
use apiflows::core::stubgen::StaticPayloads;
use apiflows::core::transformer::{expand_tests, get_flows, unfold, ExpandOptions, NormalizeOptions};
use apiflows::core::types::GenerationPass;
use apiflows::core::{
    CombinationGenerator, ExternalServices, GenerationSession, Point, RawPoint, ReplayStubs,
    StubData, Workflow, WorkflowHost, WorkflowRunner,
};
use serde_json::json;

const STUBS: &str = r#"
apistubs: true
github:
  get#/user:
    200-ok: {login: octocat}
    404-missing: {}
  get#/repos/{owner}/{repo}:
    200-ok: {name: app}
    500-error: {}
  _get#/legacy:
    200-ok: {}
"#;

/// Profile endpoint of the application under test: reads the user, then their repository.
struct ProfileService {
    second_url: &'static str,
}

impl ProfileService {
    fn repos() -> Self {
        Self {
            second_url: "https://api.github.com/repos/acme/app",
        }
    }

    fn orgs() -> Self {
        Self {
            second_url: "https://api.github.com/orgs/acme",
        }
    }
}

impl WorkflowHost for ProfileService {
    fn process(
        &mut self,
        _workflow: &Workflow,
        _initial: &Point,
        source: &mut dyn ResponseSource,
    ) -> Result<RawPoint, AppError> {
        let mut raw = RawPoint::new();
        let user = source.respond(&OutboundRequest::new("GET", "https://api.github.com/user"))?;
        if user.status() != 200 {
            raw.insert("status".into(), json!(404));
            return Ok(raw);
        }
        let second = source.respond(&OutboundRequest::new("GET", self.second_url))?;
        let status = if second.status() == 200 { 200 } else { 502 };
        raw.insert("status".into(), json!(status));
        raw.insert("content".into(), json!({"login": user.json()?["login"]}));
        Ok(raw)
    }

    fn asserts(&self) -> Vec<String> {
        vec!["assert_profile".to_string()]
    }

    fn check(&mut self, _name: &str, _workflow: &Workflow) -> Result<bool, AppError> {
        Ok(true)
    }
}

fn generator(data: StubData) -> CombinationGenerator {
    CombinationGenerator::new(
        data,
        vec!["context_default".to_string()],
        1,
        ExternalServices::default(),
    )
}

fn session(generator: CombinationGenerator) -> GenerationSession {
    GenerationSession::new(generator, vec![vec![Point::api("get", "/profile")]], 100)
}

#[test]
fn covered_combinations_are_skipped() {
    let data = StubData::from_yaml_str(STUBS).unwrap();
    assert!(!data.contains("github", "_get#/legacy"));

    let mut session = session(generator(data));
    let mut host = ProfileService::repos();
    let runs = session.run_all(&mut host).unwrap();

    // user ok x {repo ok, repo error}, user missing; the fourth candidate is covered
    assert_eq!(runs, 6);
    let explored = session.pipelines(GenerationPass::Explore);
    assert_eq!(
        explored.keys().collect::<Vec<_>>(),
        vec![
            "TEST.test_001_generated",
            "TEST.test_002_generated",
            "TEST.test_003_generated"
        ]
    );
    assert_eq!(explored["TEST.test_001_generated"].len(), 4);
    assert_eq!(explored["TEST.test_003_generated"].len(), 3);
    assert_eq!(
        explored["TEST.test_001_generated"][2]["pattern"],
        json!("/repos/{owner}/{repo}")
    );
    assert_eq!(session.pipelines(GenerationPass::Repeat).len(), 3);
    assert_eq!(
        session.generator().passed_combinations()[2],
        vec![Some(0), Some(0), Some(1), None]
    );
}

#[test]
fn finished_session_folds_expands_and_replays() {
    let data = StubData::from_yaml_str(STUBS).unwrap();
    let mut session = session(generator(data));
    let mut host = ProfileService::repos();
    session.run_all(&mut host).unwrap();

    let output = session.finish(&NormalizeOptions::default(), true);
    assert_eq!(output.pipelines.len(), 3);
    assert_eq!(get_flows(&output.tree).len(), 3);
    assert_eq!(unfold(&output.tree).len(), 3);
    assert!(output.data_used.contains("github", "get#/user"));
    assert!(output.data_used.contains("github", "get#/repos/{owner}/{repo}"));

    let tests = expand_tests(&output.tree, &ExpandOptions::default());
    assert_eq!(tests.len(), 3);
    let failing: Vec<_> = tests.iter().filter(|test| !test.meta.success).collect();
    assert_eq!(failing.len(), 1);
    assert!(failing[0].display_name().starts_with("error_"));
    let mut numbers: Vec<_> = tests.iter().filter_map(|test| test.meta.success_no).collect();
    numbers.sort();
    assert_eq!(numbers, vec![1, 2]);

    for test in &tests {
        let workflow = test.build().unwrap();
        assert_eq!(workflow.context.as_deref(), Some("context_default"));
        let stubs = ReplayStubs::new(output.data_used.clone(), ExternalServices::default());
        let mut runner = WorkflowRunner::new(stubs);
        let replayed = runner.run(&mut host, workflow).unwrap();
        assert!(replayed.get_external_calls(Some(false)).is_empty());
    }
}

#[test]
fn unknown_endpoint_without_payload_requires_stub_extension() {
    let data = StubData::from_yaml_str("github:\n  get#/user:\n    200-ok: {login: octocat}\n")
        .unwrap();
    let mut session = session(generator(data));
    let mut host = ProfileService::orgs();

    let error = session.run_all(&mut host).unwrap_err();
    assert_eq!(error.code, "STUB-002");
    assert!(error.message.contains("https://api.github.com/orgs/acme"));
}

#[test]
fn unknown_endpoint_is_discovered_from_payload_source() {
    let data = StubData::from_yaml_str(STUBS).unwrap();
    let payloads = StaticPayloads::new().with(
        "get",
        "https://api.github.com/orgs/acme",
        json!({"login": "acme"}),
    );
    let generator = generator(data)
        .with_payload_source(Box::new(payloads))
        .skip_doublerun(true);
    let mut session = session(generator);
    let mut host = ProfileService::orgs();

    let runs = session.run_all(&mut host).unwrap();
    assert_eq!(runs, 4);
    assert!(session.pipelines(GenerationPass::Repeat).is_empty());

    let variants = session
        .generator()
        .data_used()
        .variants("github", "get#/orgs/acme")
        .unwrap();
    let statuses: Vec<_> = variants
        .keys()
        .map(|key| key.split('-').next().unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["200", "404", "500"]);
    assert_eq!(variants[0], json!({"login": "acme"}));
}
