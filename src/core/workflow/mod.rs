#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::points::{Point, RawPoint};
use crate::core::stub::StubData;
use crate::core::types::ErrorCategory;
use apiflows_types::{keys, Role};
use serde_json::Value;

/// Response handed out when an outbound call consumes a declared output point.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedResponse {
    pub status: Option<u16>,
    pub content: Option<Value>,
    pub point: Point,
}

/// Ordered points of one test scenario plus the selected context.
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    pub points: Vec<Point>,
    pub context: Option<String>,
    pub stubs: Option<StubData>,
    pub stubs_modified: bool,
}

impl Workflow {
    pub fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_stubs(mut self, stubs: StubData) -> Self {
        self.stubs = Some(stubs);
        self
    }

    /// Build a workflow from a flat snapshot pipeline. The last `_context` wins.
    pub fn from_raw_pipeline(pipeline: &[RawPoint]) -> Result<Self, AppError> {
        let mut points = Vec::with_capacity(pipeline.len());
        let mut context = None;
        for raw in pipeline {
            points.push(Point::from_raw(raw)?);
            if let Some(Value::String(name)) = raw.get(keys::CONTEXT) {
                context = Some(name.clone());
            }
        }
        Ok(Self {
            points,
            context,
            ..Default::default()
        })
    }

    /// Output HTTP points, optionally filtered by their `called` flag.
    pub fn get_external_calls(&self, called: Option<bool>) -> Vec<&Point> {
        self.points
            .iter()
            .filter(|point| point.is_external_call())
            .filter(|point| called.map(|flag| point.called() == flag).unwrap_or(true))
            .collect()
    }

    /// Consume the first uncalled output point matching service, method and pattern.
    ///
    /// With `explicit`, the first uncalled point of a different shape is an error, and so is
    /// running out of points. Without it, a missing point yields `Ok(None)`.
    pub fn get_response(
        &mut self,
        service: &str,
        method: &str,
        pattern: Option<&str>,
        explicit: bool,
    ) -> Result<Option<ConsumedResponse>, AppError> {
        for point in self.points.iter_mut() {
            if !point.is_external_call() || point.called() {
                continue;
            }

            if point.service() != Some(service)
                || point.method() != Some(method)
                || point.pattern() != pattern
            {
                if explicit {
                    return Err(AppError::new(
                        ErrorCategory::UnresolvablePoint,
                        format!(
                            "Invalid point for request service ({}), method ({}), pattern ({}). Point {}",
                            service,
                            method,
                            pattern.unwrap_or_default(),
                            Value::Object(point.raw())
                        ),
                    )
                    .with_code("POINT-001"));
                }
                continue;
            }

            point.set_called(true);
            return Ok(Some(ConsumedResponse {
                status: point.response_status(),
                content: point.response_content().cloned(),
                point: point.clone(),
            }));
        }

        if explicit {
            return Err(AppError::new(
                ErrorCategory::UnresolvablePoint,
                format!(
                    "External api point does not exist in pipeline: service ({}), method ({}), pattern ({})",
                    service,
                    method,
                    pattern.unwrap_or_default()
                ),
            )
            .with_code("POINT-002"));
        }

        Ok(None)
    }

    /// Fails listing the raw form of every declared external call nobody consumed.
    pub fn assert_all_called(&self) -> Result<(), AppError> {
        let uncalled: Vec<Value> = self
            .get_external_calls(Some(false))
            .into_iter()
            .map(|point| Value::Object(point.raw()))
            .collect();
        if uncalled.is_empty() {
            return Ok(());
        }
        Err(AppError::new(
            ErrorCategory::UncalledPoints,
            format!("There are uncalled points: {}", Value::Array(uncalled)),
        )
        .with_code("POINT-003"))
    }

    pub fn initials(&self) -> Vec<&Point> {
        self.points
            .iter()
            .filter(|point| point.role().is_initial())
            .collect()
    }

    /// Stub aliases requested by the workflow, in declaration order.
    pub fn stubs_prompt(&self) -> Vec<String> {
        self.points
            .iter()
            .filter(|point| point.role() == Role::Stub)
            .filter_map(|point| point.alias().map(str::to_string))
            .collect()
    }

    /// Resolve patterns of external points against stub data and reset consumption.
    pub fn bind_patterns(&mut self, data: &StubData) {
        for point in self.points.iter_mut() {
            if let Point::ExternalApi(external) = point {
                let resolved = data.resolve(
                    &external.service,
                    &external.http.path,
                    Some(&external.http.method),
                );
                external.http.pattern = resolved.pattern;
                external.called = false;
            }
        }
    }
}
