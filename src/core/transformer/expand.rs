#![allow(clippy::result_large_err)]

use super::{get_flows, load_flow, FlowTree};
use crate::core::error::AppError;
use crate::core::points::{parse_status, RawPoint};
use crate::core::workflow::Workflow;
use apiflows_types::keys;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

pub const DEFAULT_ERROR_STATUSES: [u16; 3] = [408, 500, 503];

const IS_USED: &str = "is_used";
const IS_USED_HASH: &str = "is_used_hash";
const PREFIX_OK: &str = "ok_";
const PREFIX_ERROR: &str = "error_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Mark points whose hash or outbound endpoint was already seen in an earlier flow.
    pub filter_used_asserts: bool,
    /// Drop flows made only of already seen points. Needs `filter_used_asserts`.
    pub filter_used_subflows: bool,
    /// Start every pipeline with a context point naming the flow's context.
    pub context_set_up: bool,
    pub error_statuses: Vec<u16>,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            filter_used_asserts: false,
            filter_used_subflows: false,
            context_set_up: false,
            error_statuses: DEFAULT_ERROR_STATUSES.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestMeta {
    pub success: bool,
    pub prefix: String,
    /// 1-based ordinal among successful tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_no: Option<usize>,
}

/// One runnable test derived from a root-to-leaf flow of a snapshot tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedTest {
    pub name: String,
    pub flow: Vec<String>,
    pub pipeline: Vec<RawPoint>,
    pub prompt: Vec<String>,
    pub context: Option<String>,
    pub meta: TestMeta,
}

impl ExpandedTest {
    /// Test name with its `ok_`/`error_` prefix, reduced to identifier characters.
    pub fn display_name(&self) -> String {
        let slug: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.meta.prefix, slug.trim_matches('_'))
    }

    pub fn build(&self) -> Result<Workflow, AppError> {
        build_pipeline(&self.pipeline)
    }
}

/// Turn snapshot points back into a workflow.
pub fn build_pipeline(pipeline: &[RawPoint]) -> Result<Workflow, AppError> {
    Workflow::from_raw_pipeline(pipeline)
}

#[derive(Default)]
struct UsageTracker {
    hashes: HashSet<String>,
    endpoints: HashSet<(String, String)>,
}

impl UsageTracker {
    fn mark(&mut self, pipeline: &mut [RawPoint]) {
        for point in pipeline.iter_mut() {
            let hash = point
                .get(keys::HASH)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let used_hash = !self.hashes.insert(hash);
            point.insert(IS_USED_HASH.to_string(), Value::Bool(used_hash));

            let mut used = false;
            if point.get(keys::POINT).and_then(Value::as_str) == Some("external_api") {
                let method = point.get(keys::METHOD).and_then(Value::as_str);
                let path = point.get(keys::PATH).and_then(Value::as_str);
                used = match (method, path) {
                    (_, None) => true,
                    (method, Some(path)) => !self
                        .endpoints
                        .insert((method.unwrap_or_default().to_string(), path.to_string())),
                };
            }
            point.insert(IS_USED.to_string(), Value::Bool(used));
        }
    }
}

/// Expand every flow of the tree into a named test, in traversal order.
///
/// A test fails when any of its points carries an error status; successful tests are
/// numbered in order. The name is the last prompt seen along the flow, else the leaf label.
pub fn expand_tests(tree: &FlowTree, options: &ExpandOptions) -> Vec<ExpandedTest> {
    let mut tests = Vec::new();
    let mut usage = UsageTracker::default();
    let mut success_no = 1;

    for flow in get_flows(tree) {
        let Some(mut pipeline) = load_flow(tree, &flow) else {
            continue;
        };

        let mut context = None;
        let mut prompt = Vec::new();
        for point in &pipeline {
            if let Some(Value::String(name)) = point.get(keys::CONTEXT) {
                if !name.is_empty() {
                    context = Some(name.clone());
                }
            }
            if let Some(Value::String(text)) = point.get(keys::PROMPT) {
                if !text.is_empty() {
                    prompt.push(text.clone());
                }
            }
        }

        if options.filter_used_asserts {
            usage.mark(&mut pipeline);
        }
        if options.filter_used_subflows && all_used(&pipeline) {
            tracing::debug!(flow = ?flow, "Skipping flow made of already covered points");
            continue;
        }

        if options.context_set_up {
            if let Some(name) = &context {
                let mut point = RawPoint::new();
                point.insert(keys::POINT.to_string(), Value::from("context"));
                point.insert(keys::PATH.to_string(), Value::from(name.as_str()));
                pipeline.insert(0, point);
            }
        }

        let success = !pipeline.iter().any(|point| {
            point
                .get(keys::STATUS)
                .and_then(parse_status)
                .map(|status| options.error_statuses.contains(&status))
                .unwrap_or(false)
        });
        let meta = TestMeta {
            success,
            prefix: if success { PREFIX_OK } else { PREFIX_ERROR }.to_string(),
            success_no: success.then_some(success_no),
        };
        if success {
            success_no += 1;
        }

        let name = prompt
            .last()
            .cloned()
            .or_else(|| flow.last().cloned())
            .unwrap_or_default();
        tests.push(ExpandedTest {
            name,
            flow,
            pipeline,
            prompt,
            context,
            meta,
        });
    }
    tests
}

fn all_used(pipeline: &[RawPoint]) -> bool {
    pipeline.iter().all(|point| {
        point
            .get(IS_USED_HASH)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    })
}
