use apiflows::core::error::AppError;
use apiflows::core::points::ExternalApiPoint;
use apiflows::core::types::{ErrorCategory, ErrorSeverity};
use apiflows::core::{Point, StubData, Workflow};
use serde_json::json;

#[test]
fn test_error_creation_all_categories() {
    let categories = vec![
        ErrorCategory::ValidationError,
        ErrorCategory::UnresolvableCall,
        ErrorCategory::UnresolvablePoint,
        ErrorCategory::UncalledPoints,
        ErrorCategory::AssertionError,
        ErrorCategory::UnknownService,
        ErrorCategory::SerializationError,
        ErrorCategory::IoError,
        ErrorCategory::InternalError,
        ErrorCategory::Unknown,
    ];

    for category in categories {
        let error = AppError::new(category, "test message");
        assert_eq!(error.category, category);
        assert_eq!(error.message, "test message");
        assert_eq!(error.context.len(), 0);
        assert_eq!(error.recovery_suggestions.len(), 0);
        assert!(error.occurred_at <= chrono::Utc::now());
        assert!(error.source.is_none());
        assert!(error.code.starts_with("ERR-"));
    }
}

#[test]
fn test_error_severity_mapping() {
    let test_cases = vec![
        (ErrorCategory::ValidationError, ErrorSeverity::Error),
        (ErrorCategory::UnresolvableCall, ErrorSeverity::Error),
        (ErrorCategory::UnresolvablePoint, ErrorSeverity::Error),
        (ErrorCategory::UncalledPoints, ErrorSeverity::Error),
        (ErrorCategory::AssertionError, ErrorSeverity::Error),
        (ErrorCategory::UnknownService, ErrorSeverity::Error),
        (ErrorCategory::SerializationError, ErrorSeverity::Error),
        (ErrorCategory::IoError, ErrorSeverity::Error),
        (ErrorCategory::InternalError, ErrorSeverity::Error),
        (ErrorCategory::Unknown, ErrorSeverity::Info),
    ];

    for (category, expected_severity) in test_cases {
        let error = AppError::new(category, "test");
        assert_eq!(error.severity(), expected_severity);
    }
}

#[test]
fn test_error_add_context() {
    let mut error = AppError::new(ErrorCategory::UnresolvableCall, "no stub");

    error.add_context("service", "github");
    error.add_context("endpoint", "get#/user");

    assert_eq!(error.context.get("service"), Some(&"github".to_string()));
    assert_eq!(
        error.context.get("endpoint"),
        Some(&"get#/user".to_string())
    );
    assert_eq!(error.context.len(), 2);
}

#[test]
fn test_error_display() {
    let error = AppError::new(ErrorCategory::UnknownService, "unknown service slack")
        .with_code("STUB-001")
        .with_context("hooks.slack.com");

    let display = error.to_string();
    assert!(display.starts_with("[STUB-001] UnknownService: unknown service slack"));
    assert!(display.contains("hooks.slack.com"));
}

#[test]
fn test_error_conversions() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error: AppError = io_error.into();
    assert_eq!(error.category, ErrorCategory::IoError);
    assert_eq!(error.code, "IO_ERROR");
    assert!(error.source.is_some());

    let yaml_error = serde_yaml::from_str::<Vec<u8>>("{").unwrap_err();
    let error: AppError = yaml_error.into();
    assert_eq!(error.category, ErrorCategory::SerializationError);
    assert_eq!(error.code, "YAML_ERROR");

    let json_error = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
    let error: AppError = json_error.into();
    assert_eq!(error.code, "JSON_ERROR");

    let error: AppError = anyhow::anyhow!("boom").into();
    assert_eq!(error.category, ErrorCategory::InternalError);
    assert_eq!(error.code, "ANYHOW_ERROR");
    assert_eq!(error.recovery_suggestions.len(), 1);
}

#[test]
fn test_invalid_stub_keys_are_rejected() {
    let error = StubData::from_yaml_str("github:\n  /user:\n    200-ok: {}\n").unwrap_err();
    assert_eq!(error.category, ErrorCategory::ValidationError);

    let error = StubData::from_yaml_str("github:\n  get#/user:\n    ok: {}\n").unwrap_err();
    assert_eq!(error.category, ErrorCategory::ValidationError);
}

#[test]
fn test_uncalled_points_report_every_point() {
    let workflow = Workflow::new(vec![
        Point::api("get", "/profile"),
        Point::ExternalApi(
            ExternalApiPoint::new("github", "get", "/user")
                .with_pattern("/user")
                .with_response(200, json!({"login": "octocat"})),
        ),
        Point::ExternalApi(
            ExternalApiPoint::new("github", "get", "/orgs")
                .with_pattern("/orgs")
                .with_response(200, json!([])),
        ),
    ]);

    let error = workflow.assert_all_called().unwrap_err();
    assert_eq!(error.category, ErrorCategory::UncalledPoints);
    assert_eq!(error.code, "POINT-003");
    assert!(error.message.contains("/user"));
    assert!(error.message.contains("/orgs"));
}

#[test]
fn test_explicit_point_lookup_errors() {
    let mut workflow = Workflow::new(vec![Point::ExternalApi(
        ExternalApiPoint::new("github", "get", "/user")
            .with_pattern("/user")
            .with_response(200, json!({})),
    )]);

    let mismatch = workflow
        .get_response("github", "post", Some("/user"), true)
        .unwrap_err();
    assert_eq!(mismatch.code, "POINT-001");

    let consumed = workflow
        .get_response("github", "get", Some("/user"), true)
        .unwrap()
        .unwrap();
    assert_eq!(consumed.status, Some(200));

    let missing = workflow
        .get_response("github", "get", Some("/user"), true)
        .unwrap_err();
    assert_eq!(missing.code, "POINT-002");
    assert!(workflow
        .get_response("github", "get", Some("/user"), false)
        .unwrap()
        .is_none());
}
