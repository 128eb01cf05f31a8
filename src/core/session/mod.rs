#![allow(clippy::result_large_err)]

//! Generation and replay sessions.
//!
//! A [`GenerationSession`] owns the combination generator and the pipelines captured during
//! both passes. Each run selects one combination, lets the host process the initial points
//! with outbound calls answered by the generator, and records what the run exercised. Once
//! the generator is exhausted, [`GenerationSession::finish`] normalizes the explored pipelines
//! against their repeated counterparts and folds them into a snapshot tree.
//!
//! A [`WorkflowRunner`] replays one snapshot workflow against the host with [`ReplayStubs`].

use crate::core::error::AppError;
use crate::core::points::{Point, RawPoint};
use crate::core::stub::{ReplayStubs, ResponseSource, StubData};
use crate::core::stubgen::{CombinationGenerator, PassedCombination};
use crate::core::transformer::{
    fold, normalize, remove_meta, FlowItem, FlowTree, NormalizeOptions, Pipelines, PointRegistry,
};
use crate::core::types::{ErrorCategory, GenerationPass};
use crate::core::workflow::Workflow;
use apiflows_types::keys;
use serde_json::Value;

/// The application under test, seen from the engine.
pub trait WorkflowHost {
    /// Set up the named context before a run.
    fn enter_context(&mut self, _context: &str, _workflow: &Workflow) -> Result<(), AppError> {
        Ok(())
    }

    fn exit_context(&mut self, _context: &str) -> Result<(), AppError> {
        Ok(())
    }

    /// Process one initial point. Outbound calls must go through `source`. The returned
    /// mapping carries the response fields (`status`, `content`, `response_headers`).
    fn process(
        &mut self,
        workflow: &Workflow,
        initial: &Point,
        source: &mut dyn ResponseSource,
    ) -> Result<RawPoint, AppError>;

    /// Names of the assertions to try after every generated run.
    fn asserts(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether the named assertion holds for the finished workflow.
    fn check(&mut self, _name: &str, _workflow: &Workflow) -> Result<bool, AppError> {
        Ok(false)
    }
}

/// Artifacts of a finished generation session.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutput {
    /// Normalized pipelines of the exploration pass.
    pub pipelines: Pipelines,
    /// Snapshot tree with `_meta` on every point.
    pub meta_tree: FlowTree,
    /// Snapshot tree with `_meta` stripped.
    pub tree: FlowTree,
    pub registry: PointRegistry,
    /// Stub entries exercised during generation, including discovered ones.
    pub data_used: StubData,
}

impl GenerationOutput {
    /// Normalize captured pipelines and derive the tree, its meta-free form and the registry.
    pub fn build(
        pipelines: Pipelines,
        repeated: Option<&Pipelines>,
        options: &NormalizeOptions,
        fold_tree: bool,
        data_used: StubData,
    ) -> Self {
        let pipelines = normalize(pipelines, repeated, options);
        let meta_tree = if fold_tree {
            fold(&pipelines)
        } else {
            flat_tree(&pipelines)
        };
        let mut tree = meta_tree.clone();
        let registry = remove_meta(&mut tree);
        tracing::info!(
            tests = pipelines.len(),
            points = registry.len(),
            "generation output built"
        );
        Self {
            pipelines,
            meta_tree,
            tree,
            registry,
            data_used,
        }
    }
}

pub struct GenerationSession {
    generator: CombinationGenerator,
    initials: Vec<Vec<Point>>,
    max_runs: usize,
    runs: usize,
    pipelines: [Pipelines; 2],
    current: Option<CurrentRun>,
    finished: bool,
}

struct CurrentRun {
    context: Option<String>,
    pipeline: Vec<RawPoint>,
}

impl GenerationSession {
    /// `initials` holds one group of initial points per initial slot. Runs are capped at twice
    /// `max_tests` to leave room for the repeat pass.
    pub fn new(generator: CombinationGenerator, initials: Vec<Vec<Point>>, max_tests: usize) -> Self {
        Self {
            generator,
            initials,
            max_runs: max_tests.saturating_mul(2),
            runs: 0,
            pipelines: [Pipelines::new(), Pipelines::new()],
            current: None,
            finished: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.finished || self.runs >= self.max_runs
    }

    pub fn generator(&self) -> &CombinationGenerator {
        &self.generator
    }

    pub fn generator_mut(&mut self) -> &mut CombinationGenerator {
        &mut self.generator
    }

    pub fn pipelines(&self, pass: GenerationPass) -> &Pipelines {
        &self.pipelines[pass.index()]
    }

    /// Select the next combination and return the initial points it runs.
    ///
    /// `None` marks the end of generation; later calls keep returning `None`.
    pub fn next_combination(&mut self) -> Option<Vec<Point>> {
        if self.is_done() {
            return None;
        }
        if self.generator.init_test().is_none() {
            tracing::info!(runs = self.runs, "generator exhausted");
            self.finished = true;
            return None;
        }
        self.runs += 1;
        let initials = self
            .generator
            .initial_index()
            .and_then(|index| self.initials.get(index))
            .cloned()
            .unwrap_or_default();
        self.current = Some(CurrentRun {
            context: self.generator.context().map(str::to_string),
            pipeline: Vec::new(),
        });
        Some(initials)
    }

    /// Append a point to the running pipeline, stamped with the run's context.
    pub fn append_point(&mut self, mut point: RawPoint) {
        if let Some(run) = self.current.as_mut() {
            stamp_context(&mut point, run.context.as_deref());
            run.pipeline.push(point);
        }
    }

    /// Close the current run: store its pipeline under the pass it ran in and record the
    /// combination as passed.
    pub fn record_result(&mut self) -> Result<PassedCombination, AppError> {
        let pass = self.generator.pass();
        let record = self.generator.finish_test()?;
        if let Some(run) = self.current.take() {
            if !run.pipeline.is_empty() {
                let pipelines = &mut self.pipelines[pass.index()];
                let name = test_name(pipelines.len() + 1, &run.pipeline);
                pipelines.insert(name, run.pipeline);
            }
        }
        Ok(record)
    }

    /// Drive one full run against the host. Returns `false` once generation is over.
    pub fn run_next(&mut self, host: &mut dyn WorkflowHost) -> Result<bool, AppError> {
        let Some(initials) = self.next_combination() else {
            return Ok(false);
        };
        let context = self.generator.context().map(str::to_string);
        let mut workflow = Workflow::new(initials.clone()).with_stubs(self.generator.data().clone());
        if let Some(context) = &context {
            workflow = workflow.with_context(context.clone());
            host.enter_context(context, &workflow)?;
        }

        let outcome = self.process_initials(host, &mut workflow, &initials);
        leave_context(host, context.as_deref(), outcome)?;
        self.record_result()?;
        Ok(true)
    }

    /// Process every initial point, then append the named asserts that hold.
    fn process_initials(
        &mut self,
        host: &mut dyn WorkflowHost,
        workflow: &mut Workflow,
        initials: &[Point],
    ) -> Result<(), AppError> {
        for (position, initial) in initials.iter().enumerate() {
            let start = self.current_len();
            self.append_point(initial.raw());
            let calls_before = self.generator.generated_pipeline().len();

            let response = host.process(workflow, initial, &mut self.generator)?;

            let calls: Vec<RawPoint> = self.generator.generated_pipeline()[calls_before..].to_vec();
            for call in calls {
                self.append_point(call);
            }
            if let Some(run) = self.current.as_mut() {
                if let Some(initial_raw) = run.pipeline.get_mut(start) {
                    for (key, value) in &response {
                        initial_raw.insert(key.clone(), value.clone());
                    }
                }
            }
            if let Some(point) = workflow.points.get_mut(position) {
                point.apply_response(&response);
            }
        }

        for name in host.asserts() {
            if host.check(&name, workflow)? {
                let mut point = RawPoint::new();
                point.insert(keys::POINT.to_string(), Value::from("assert"));
                point.insert(keys::PATH.to_string(), Value::from(name));
                self.append_point(point);
            }
        }
        Ok(())
    }

    /// Run until the generator or the run budget is exhausted.
    pub fn run_all(&mut self, host: &mut dyn WorkflowHost) -> Result<usize, AppError> {
        let mut runs = 0;
        while self.run_next(host)? {
            runs += 1;
        }
        Ok(runs)
    }

    /// Normalize explored pipelines against the repeat pass and build the snapshot trees.
    pub fn finish(self, options: &NormalizeOptions, fold_tree: bool) -> GenerationOutput {
        let [explored, repeated] = self.pipelines;
        let repeated = (!repeated.is_empty()).then_some(repeated);
        GenerationOutput::build(
            explored,
            repeated.as_ref(),
            options,
            fold_tree,
            self.generator.data_used().clone(),
        )
    }

    fn current_len(&self) -> usize {
        self.current.as_ref().map(|run| run.pipeline.len()).unwrap_or(0)
    }
}

/// Tear down `context` whatever the run's outcome. A run error wins over a teardown error.
fn leave_context<T>(
    host: &mut dyn WorkflowHost,
    context: Option<&str>,
    outcome: Result<T, AppError>,
) -> Result<T, AppError> {
    let Some(context) = context else {
        return outcome;
    };
    let exited = host.exit_context(context);
    match outcome {
        Ok(value) => exited.map(|()| value),
        Err(error) => {
            if let Err(teardown) = exited {
                tracing::warn!(context, error = %teardown, "context teardown failed after run error");
            }
            Err(error)
        }
    }
}

fn stamp_context(point: &mut RawPoint, context: Option<&str>) {
    point.insert(
        keys::CONTEXT.to_string(),
        context.map(Value::from).unwrap_or(Value::Null),
    );
}

/// `TEST.test_NNN_generated`; runs without any stub alias prompt get a `TEST.002.` prefix.
fn test_name(number: usize, pipeline: &[RawPoint]) -> String {
    let prompted = pipeline.iter().any(|point| point.contains_key(keys::PROMPT));
    if prompted {
        format!("TEST.test_{:03}_generated", number)
    } else {
        format!("TEST.002.test_{:03}_generated", number)
    }
}

/// Unfolded pipelines in tree form, one branch per test.
fn flat_tree(pipelines: &Pipelines) -> FlowTree {
    pipelines
        .iter()
        .map(|(name, points)| {
            (
                name.clone(),
                points.iter().cloned().map(FlowItem::Point).collect(),
            )
        })
        .collect()
}

/// Replays snapshot workflows against the host.
pub struct WorkflowRunner {
    stubs: ReplayStubs,
    default_initials: Vec<Point>,
    default_context: Option<String>,
    check_uncalled: bool,
}

impl WorkflowRunner {
    pub fn new(stubs: ReplayStubs) -> Self {
        Self {
            stubs,
            default_initials: Vec::new(),
            default_context: None,
            check_uncalled: true,
        }
    }

    /// Initial points used when a workflow declares none.
    pub fn with_default_initials(mut self, initials: Vec<Point>) -> Self {
        self.default_initials = initials;
        self
    }

    pub fn with_default_context(mut self, context: impl Into<String>) -> Self {
        self.default_context = Some(context.into());
        self
    }

    pub fn check_uncalled(mut self, check: bool) -> Self {
        self.check_uncalled = check;
        self
    }

    pub fn stubs(&self) -> &ReplayStubs {
        &self.stubs
    }

    /// Run every initial point of the workflow, then its named asserts, then the uncalled
    /// points check. Returns the workflow with responses applied and consumption marked.
    pub fn run(&mut self, host: &mut dyn WorkflowHost, mut workflow: Workflow) -> Result<Workflow, AppError> {
        if workflow.initials().is_empty() {
            workflow.points.extend(self.default_initials.iter().cloned());
        }
        if workflow.context.is_none() {
            workflow.context = self.default_context.clone();
        }
        let context = workflow.context.clone();
        if let Some(context) = &context {
            host.enter_context(context, &workflow)?;
        }

        let outcome = self.replay_points(host, workflow);
        let workflow = leave_context(host, context.as_deref(), outcome)?;
        if self.check_uncalled {
            workflow.assert_all_called()?;
        }
        Ok(workflow)
    }

    /// Process the initial points with the stubs up, then check the named asserts.
    fn replay_points(&mut self, host: &mut dyn WorkflowHost, workflow: Workflow) -> Result<Workflow, AppError> {
        let initial_positions: Vec<usize> = workflow
            .points
            .iter()
            .enumerate()
            .filter(|(_, point)| point.role().is_initial())
            .map(|(position, _)| position)
            .collect();

        self.stubs.up(workflow);
        let mut responses = Vec::with_capacity(initial_positions.len());
        for &position in &initial_positions {
            let view = self.stubs.workflow().cloned().unwrap_or_default();
            let Some(initial) = view.points.get(position) else {
                continue;
            };
            let outcome = host.process(&view, initial, &mut self.stubs);
            match outcome {
                Ok(response) => responses.push((position, response)),
                Err(error) => {
                    self.stubs.down();
                    return Err(error);
                }
            }
        }
        let mut workflow = self.stubs.down().unwrap_or_default();
        for (position, response) in &responses {
            if let Some(point) = workflow.points.get_mut(*position) {
                point.apply_response(response);
            }
        }

        let asserts: Vec<String> = workflow
            .points
            .iter()
            .filter_map(|point| match point {
                Point::Assert(named) => Some(named.name.clone()),
                _ => None,
            })
            .collect();
        for name in asserts {
            if !host.check(&name, &workflow)? {
                return Err(AppError::new(
                    ErrorCategory::AssertionError,
                    format!("Assertion '{}' does not hold", name),
                )
                .with_code("ASSERT-004"));
            }
        }
        Ok(workflow)
    }
}
