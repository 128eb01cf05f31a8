#![allow(clippy::result_large_err)]

//! Replay-mode stubs: answer outbound calls from a declared workflow and assert what the code
//! under test sent.

use super::transport::{normalize_query, MockResponse, OutboundRequest, ResponseSource};
use super::{ExternalServices, StubData, Variants};
use crate::core::error::AppError;
use crate::core::generalizer::{is_subset, matches_expected};
use crate::core::points::Point;
use crate::core::types::ErrorCategory;
use crate::core::workflow::Workflow;
use apiflows_types::VariantKey;
use serde_json::{Map, Value};

const DEFAULT_STATUS: u16 = 200;

pub struct ReplayStubs {
    data: StubData,
    externals: ExternalServices,
    expected_points: Vec<Point>,
    workflow: Option<Workflow>,
    prompt: Vec<String>,
    explicit: bool,
}

impl ReplayStubs {
    pub fn new(data: StubData, externals: ExternalServices) -> Self {
        Self {
            data,
            externals,
            expected_points: Vec::new(),
            workflow: None,
            prompt: Vec::new(),
            explicit: false,
        }
    }

    /// Points answered by service, method and literal path before the workflow is consulted.
    pub fn with_expected_points(mut self, points: Vec<Point>) -> Self {
        self.expected_points = points;
        self
    }

    /// Treat any outbound call that does not line up with the next declared point as a failure.
    pub fn strict(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    pub fn add_expected_points(&mut self, points: Vec<Point>, clear: bool) {
        if clear {
            self.expected_points.clear();
        }
        self.expected_points.extend(points);
    }

    /// Start answering calls for `workflow`: patterns are bound and the alias prompt loaded.
    /// Stub data carried by the workflow replaces the configured data.
    pub fn up(&mut self, mut workflow: Workflow) {
        if let Some(stubs) = &workflow.stubs {
            if workflow.stubs_modified || self.data.is_empty() {
                self.data = stubs.clone();
                workflow.stubs_modified = false;
            }
        }
        workflow.bind_patterns(&self.data);
        self.prompt = workflow.stubs_prompt();
        self.workflow = Some(workflow);
    }

    /// Stop answering calls and hand the consumed workflow back.
    pub fn down(&mut self) -> Option<Workflow> {
        self.prompt.clear();
        self.workflow.take()
    }

    pub fn workflow(&self) -> Option<&Workflow> {
        self.workflow.as_ref()
    }

    pub fn data(&self) -> &StubData {
        &self.data
    }

    /// Aliases requested by the workflow and not consumed yet.
    pub fn remaining_prompt(&self) -> &[String] {
        &self.prompt
    }

    /// Pick a variant: the first one, unless a requested alias names another. Each requested
    /// alias is consumed once and the last matching variant wins.
    pub fn select_response(&mut self, options: &Variants) -> Option<(u16, Value)> {
        let mut selected: Option<(&String, VariantKey)> = None;
        for key in options.keys() {
            let Ok(variant) = key.parse::<VariantKey>() else {
                continue;
            };
            let requested = self.prompt.iter().position(|alias| *alias == variant.alias);
            if let Some(position) = requested {
                self.prompt.remove(position);
                selected = Some((key, variant));
            } else if selected.is_none() {
                selected = Some((key, variant));
            }
        }
        selected.and_then(|(key, variant)| {
            options
                .get(key)
                .map(|content| (variant.status, content.clone()))
        })
    }

    fn find_expected(&self, service: &str, method: &str, path: &str) -> Option<&Point> {
        self.expected_points.iter().find(|point| {
            point.service() == Some(service)
                && point.method() == Some(method)
                && point.path().as_deref() == Some(path)
        })
    }
}

impl ResponseSource for ReplayStubs {
    fn respond(&mut self, request: &OutboundRequest) -> Result<MockResponse, AppError> {
        let method = request.method_lowercase();
        let Some((service, path)) = self.externals.lookup(&request.url) else {
            return Err(AppError::new(
                ErrorCategory::UnknownService,
                format!(
                    "Unexpected api call to an unknown service. Method ({}), url ({})",
                    method, request.url
                ),
            )
            .with_code("STUB-001")
            .with_suggestion("Add the host to [externals] in apiflows.toml"));
        };

        if let Some(point) = self.find_expected(&service, &method, &path) {
            if let Some(expected) = point.data() {
                assert_data(point, expected, request)?;
            }
            let status = point.response_status().unwrap_or(DEFAULT_STATUS);
            let content = point.response_content().cloned().unwrap_or(Value::Null);
            tracing::debug!(service, method, path, status, "answered from expected points");
            return MockResponse::from_content(status, &content);
        }

        let resolution = self.data.resolve(&service, &path, Some(&method));
        let options = resolution.variants.cloned();
        if let (Some(options), Some(workflow)) = (options, self.workflow.as_mut()) {
            let consumed = workflow.get_response(
                &service,
                &method,
                resolution.pattern.as_deref(),
                self.explicit,
            )?;
            let (mut status, mut content) = (None, None);
            if let Some(consumed) = consumed {
                assert_request(&consumed.point, request)?;
                status = consumed.status;
                content = consumed.content;
            }
            if status.is_none() {
                if let Some((selected_status, selected_content)) = self.select_response(&options) {
                    status = Some(selected_status);
                    content = Some(selected_content);
                }
            }
            if let Some(status) = status {
                let content = content
                    .filter(|content| !content.is_null())
                    .unwrap_or_else(|| Value::Object(Map::new()));
                tracing::debug!(service, method, path, status, "answered from workflow");
                return MockResponse::from_content(status, &content);
            }
        }

        Err(AppError::new(
            ErrorCategory::UnresolvableCall,
            format!(
                "Unexpected api call.\nService ({}), method ({}), path ({})",
                service, method, path
            ),
        )
        .with_code("STUB-003"))
    }
}

fn assert_request(point: &Point, request: &OutboundRequest) -> Result<(), AppError> {
    let http = match point.http() {
        Some(http) => http,
        None => return Ok(()),
    };
    assert_data(point, http.data.as_ref().unwrap_or(&Value::Null), request)?;

    let expected = http.params.as_ref().map(normalize_query);
    let actual = request.effective_params().map(|params| normalize_query(&params));
    let params_match = match (&expected, &actual) {
        (None, None) => true,
        (Some(expected), Some(actual)) => matches_expected(expected, actual),
        _ => false,
    };
    if !params_match {
        return Err(mismatch(
            "ASSERT-002",
            "Unexpected request params",
            point,
            expected.as_ref(),
            actual.as_ref(),
        ));
    }

    if let Some(Value::Object(expected)) = &http.headers {
        let actual: Map<String, Value> = request
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect();
        if !is_subset(expected, &actual) {
            return Err(mismatch(
                "ASSERT-003",
                "Unexpected request headers",
                point,
                http.headers.as_ref(),
                Some(&Value::Object(actual)),
            ));
        }
    }
    Ok(())
}

fn assert_data(point: &Point, expected: &Value, request: &OutboundRequest) -> Result<(), AppError> {
    let mut actual = request.decoded_data().unwrap_or(Value::Null);
    let mut expected = expected.clone();
    if request.is_form_encoded() {
        expected = normalize_query(&expected);
        actual = normalize_query(&actual);
    }
    if matches_expected(&expected, &actual) {
        return Ok(());
    }
    Err(mismatch(
        "ASSERT-001",
        "Unexpected request data",
        point,
        Some(&expected),
        Some(&actual),
    ))
}

fn mismatch(
    code: &str,
    message: &str,
    point: &Point,
    expected: Option<&Value>,
    actual: Option<&Value>,
) -> AppError {
    let render = |value: Option<&Value>| value.map(Value::to_string).unwrap_or_else(|| "null".into());
    let mut error = AppError::new(
        ErrorCategory::AssertionError,
        format!("{}. Point {}", message, Value::Object(point.raw())),
    )
    .with_code(code);
    error.add_context("expected", &render(expected));
    error.add_context("actual", &render(actual));
    error
}
