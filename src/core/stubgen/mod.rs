#![allow(clippy::result_large_err)]

//! Combination generator.
//!
//! Every generation run selects one combination (context, initial point and one response
//! variant per known endpoint), answers the outbound calls of that run from it and records
//! which slots the run actually exercised. Candidates already covered by a recorded run are
//! skipped. Endpoints met for the first time during a run become new dimensions.

pub mod combination;
pub mod payload;

pub use combination::{is_covered, Combination, PassedCombination, ProductCursor};
pub use payload::{payload_prompt, NoPayload, PayloadSource, StaticPayloads};

use crate::core::error::AppError;
use crate::core::points::RawPoint;
use crate::core::stub::{
    ExternalServices, MockResponse, OutboundRequest, ResponseSource, StubData, Variants,
};
use crate::core::types::{ErrorCategory, GenerationPass};
use apiflows_types::{keys, VariantKey};
use indexmap::IndexMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

pub const CONTEXT_COMBINATION_INDEX: usize = 0;
pub const INITIAL_COMBINATION_INDEX: usize = 1;

const ENDPOINT_HASH_LEN: usize = 10;
const REJECTION_WARN_THRESHOLD: usize = 100;

/// `(service, "method#pattern")` identifying one endpoint dimension.
pub type EndpointSlot = (String, String);

pub struct CombinationGenerator {
    data: StubData,
    data_used: StubData,
    externals: ExternalServices,
    contexts: Vec<String>,
    paths_indexes: IndexMap<EndpointSlot, usize>,
    cursor: ProductCursor,
    passed_combinations: Vec<PassedCombination>,
    iteration_combinations: VecDeque<Combination>,
    stub_combination: Option<Combination>,
    pass: GenerationPass,
    skip_doublerun: bool,
    generated_pipeline: Vec<RawPoint>,
    payload_source: Box<dyn PayloadSource>,
}

impl CombinationGenerator {
    pub fn new(
        data: StubData,
        contexts: Vec<String>,
        initials_count: usize,
        externals: ExternalServices,
    ) -> Self {
        let cursor = ProductCursor::new(vec![contexts.len(), initials_count]);
        Self {
            data,
            data_used: StubData::new(),
            externals,
            contexts,
            paths_indexes: IndexMap::new(),
            cursor,
            passed_combinations: Vec::new(),
            iteration_combinations: VecDeque::new(),
            stub_combination: None,
            pass: GenerationPass::Explore,
            skip_doublerun: false,
            generated_pipeline: Vec::new(),
            payload_source: Box::new(NoPayload),
        }
    }

    pub fn with_payload_source(mut self, source: Box<dyn PayloadSource>) -> Self {
        self.payload_source = source;
        self
    }

    pub fn skip_doublerun(mut self, skip: bool) -> Self {
        self.skip_doublerun = skip;
        self
    }

    /// Register every stored endpoint as a dimension up front instead of on first call.
    pub fn prefill_data_used(mut self) -> Self {
        let endpoints: Vec<(String, String, Variants)> = self
            .data
            .services()
            .flat_map(|(service, endpoints)| {
                endpoints.iter().map(move |(endpoint, variants)| {
                    (service.clone(), endpoint.clone(), variants.clone())
                })
            })
            .collect();
        for (service, endpoint, variants) in endpoints {
            self.register_endpoint(&service, &endpoint, variants);
        }
        self
    }

    /// Select the combination for the next run, or `None` once both passes are exhausted.
    pub fn init_test(&mut self) -> Option<&Combination> {
        self.generated_pipeline.clear();
        let combination = match self.pass {
            GenerationPass::Explore => match self.get_stub_combination() {
                Some(combination) => Some(combination),
                None => {
                    let repeated = self.iteration_combinations.pop_front();
                    if repeated.is_some() {
                        tracing::info!(
                            queued = self.iteration_combinations.len() + 1,
                            "exploration exhausted, repeating passed combinations"
                        );
                        self.pass = GenerationPass::Repeat;
                    }
                    repeated
                }
            },
            GenerationPass::Repeat => self.iteration_combinations.pop_front(),
        };
        if let Some(combination) = &combination {
            tracing::info!(pass = ?self.pass, combination = ?combination, "combination selected");
        }
        self.stub_combination = combination;
        self.stub_combination.as_ref()
    }

    /// Next untried candidate of the product that no passed record covers.
    pub fn get_stub_combination(&mut self) -> Option<Combination> {
        let mut rejected = 0;
        let found = loop {
            let candidate = self.cursor.next_combination()?;
            if !is_covered(&candidate, &self.passed_combinations) {
                break candidate;
            }
            tracing::debug!(candidate = ?candidate, "combination already covered");
            rejected += 1;
            if rejected == REJECTION_WARN_THRESHOLD {
                tracing::warn!(
                    rejected,
                    space = self.cursor.space(),
                    "many candidate combinations are already covered"
                );
            }
        };
        Some(found)
    }

    /// Record the finished run, projected onto the slots it exercised.
    pub fn finish_test(&mut self) -> Result<PassedCombination, AppError> {
        let combination = self.stub_combination.clone().ok_or_else(no_combination)?;
        let mut record: PassedCombination = vec![None; combination.len()];
        record[CONTEXT_COMBINATION_INDEX] = combination.get(CONTEXT_COMBINATION_INDEX).copied();
        record[INITIAL_COMBINATION_INDEX] = combination.get(INITIAL_COMBINATION_INDEX).copied();
        for point in &self.generated_pipeline {
            let Some(slot) = generated_slot(point) else {
                continue;
            };
            if let Some(&index) = self.paths_indexes.get(&slot) {
                if let Some(entry) = record.get_mut(index) {
                    *entry = combination.get(index).copied();
                }
            }
        }
        tracing::info!(record = ?record, calls = self.generated_pipeline.len(), "combination passed");
        self.passed_combinations.push(record.clone());
        if self.pass == GenerationPass::Explore && !self.skip_doublerun {
            self.iteration_combinations.push_back(combination);
        }
        Ok(record)
    }

    pub fn stub_combination(&self) -> Option<&Combination> {
        self.stub_combination.as_ref()
    }

    pub fn pass(&self) -> GenerationPass {
        self.pass
    }

    pub fn sizes(&self) -> &[usize] {
        self.cursor.sizes()
    }

    pub fn passed_combinations(&self) -> &[PassedCombination] {
        &self.passed_combinations
    }

    pub fn paths_indexes(&self) -> &IndexMap<EndpointSlot, usize> {
        &self.paths_indexes
    }

    pub fn data(&self) -> &StubData {
        &self.data
    }

    /// Stub entries exercised so far, including synthesized ones.
    pub fn data_used(&self) -> &StubData {
        &self.data_used
    }

    /// External points produced by the current run, in call order.
    pub fn generated_pipeline(&self) -> &[RawPoint] {
        &self.generated_pipeline
    }

    pub fn context(&self) -> Option<&str> {
        let index = *self.stub_combination.as_ref()?.get(CONTEXT_COMBINATION_INDEX)?;
        self.contexts.get(index).map(String::as_str)
    }

    pub fn initial_index(&self) -> Option<usize> {
        self.stub_combination
            .as_ref()?
            .get(INITIAL_COMBINATION_INDEX)
            .copied()
    }

    /// Aliases of endpoint slots not on their default variant.
    pub fn combination_prompt(&self) -> Vec<String> {
        self.selected_aliases(true)
    }

    /// Aliases of every endpoint slot.
    pub fn combination_prompt_full(&self) -> Vec<String> {
        self.selected_aliases(false)
    }

    /// Alias of the default variant of every endpoint slot.
    pub fn default_prompt(&self) -> Vec<String> {
        self.paths_indexes
            .keys()
            .filter_map(|(service, endpoint)| self.alias_at(service, endpoint, 0))
            .collect()
    }

    fn selected_aliases(&self, skip_default: bool) -> Vec<String> {
        let Some(combination) = &self.stub_combination else {
            return Vec::new();
        };
        self.paths_indexes
            .iter()
            .filter_map(|((service, endpoint), slot)| {
                let index = *combination.get(*slot)?;
                if skip_default && index == 0 {
                    return None;
                }
                self.alias_at(service, endpoint, index)
            })
            .collect()
    }

    fn alias_at(&self, service: &str, endpoint: &str, index: usize) -> Option<String> {
        let variants = self.data_used.variants(service, endpoint)?;
        let key = variants.keys().nth(index)?;
        key.parse::<VariantKey>().ok().map(|variant| variant.alias)
    }

    fn register_endpoint(&mut self, service: &str, endpoint: &str, variants: Variants) {
        let size = variants.len();
        self.data_used.insert(service, endpoint, variants);
        let slot = (service.to_string(), endpoint.to_string());
        if self.paths_indexes.contains_key(&slot) {
            return;
        }
        let index = self.paths_indexes.len() + INITIAL_COMBINATION_INDEX + 1;
        self.paths_indexes.insert(slot, index);
        self.cursor.push_dimension(size);
        if let Some(combination) = self.stub_combination.as_mut() {
            combination.push(0);
        }
        tracing::info!(service, endpoint, variants = size, slot = index, "endpoint discovered");
    }

    /// Synthesize the three canonical variants for an endpoint missing from the stub file.
    fn synthesize(&mut self, method: &str, url: &str, path: &str) -> Result<Variants, AppError> {
        let payload = self.payload_source.payload(method, url)?.ok_or_else(|| {
            AppError::new(
                ErrorCategory::UnresolvableCall,
                format!(
                    "Extend apistubs file.\n{}",
                    payload_prompt(method, url)
                ),
            )
            .with_code("STUB-002")
            .with_suggestion(format!("Add a '{}#{}' entry to the stub file", method, path))
        })?;
        let hash = endpoint_hash(method, path);
        let mut variants = Variants::new();
        variants.insert(format!("200-ok_{}", hash), payload);
        variants.insert(format!("404-not_found_{}", hash), empty_object());
        variants.insert(format!("500-error_{}", hash), empty_object());
        Ok(variants)
    }
}

impl ResponseSource for CombinationGenerator {
    fn respond(&mut self, request: &OutboundRequest) -> Result<MockResponse, AppError> {
        let method = request.method_lowercase();
        let Some((service, path)) = self.externals.lookup(&request.url) else {
            return Err(AppError::new(
                ErrorCategory::UnknownService,
                format!(
                    "Request to apidocs (Open API specs) for expanding stub file. Url: [{}] {}",
                    method, request.url
                ),
            )
            .with_code("STUB-001"));
        };
        if self.stub_combination.is_none() {
            return Err(no_combination());
        }

        let used = self.data_used.resolve(&service, &path, Some(&method));
        let (pattern, options, endpoint) = match used.variants {
            Some(options) => {
                let pattern = used.pattern.clone();
                let endpoint = format!("{}#{}", method, pattern.as_deref().unwrap_or(&path));
                (pattern, options.clone(), endpoint)
            }
            None => {
                let stored = self.data.resolve(&service, &path, Some(&method));
                match (stored.pattern, stored.variants.cloned()) {
                    (Some(pattern), Some(options)) => {
                        let endpoint = format!("{}#{}", method, pattern);
                        self.register_endpoint(&service, &endpoint, options.clone());
                        (Some(pattern), options, endpoint)
                    }
                    _ => {
                        let options = self.synthesize(&method, &request.url, &path)?;
                        let endpoint = format!("{}#{}", method, path);
                        self.register_endpoint(&service, &endpoint, options.clone());
                        (None, options, endpoint)
                    }
                }
            }
        };

        let slot = (service.clone(), endpoint);
        let position = *self.paths_indexes.get(&slot).ok_or_else(no_combination)?;
        let combination = self.stub_combination.as_mut().ok_or_else(no_combination)?;
        // combinations queued before the endpoint was discovered run its default variant
        if combination.len() <= position {
            combination.resize(position + 1, 0);
        }
        let index = combination.get(position).copied().unwrap_or(0);
        let (key, content) = options.get_index(index).ok_or_else(|| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("Variant {} does not exist for {} {}", index, slot.0, slot.1),
            )
        })?;
        let variant: VariantKey = key
            .parse()
            .map_err(|reason: String| AppError::new(ErrorCategory::ValidationError, reason))?;

        let mut point = RawPoint::new();
        point.insert(keys::POINT.to_string(), Value::from("external_api"));
        point.insert(
            keys::CONTEXT.to_string(),
            self.context().map(Value::from).unwrap_or(Value::Null),
        );
        point.insert(keys::SERVICE.to_string(), Value::from(service.as_str()));
        point.insert(keys::METHOD.to_string(), Value::from(method.as_str()));
        point.insert(keys::PATH.to_string(), Value::from(path.as_str()));
        if let Some(pattern) = pattern.filter(|pattern| *pattern != path) {
            point.insert(keys::PATTERN.to_string(), Value::from(pattern));
        }
        point.insert(keys::STATUS.to_string(), Value::from(variant.status));
        point.insert(keys::CONTENT.to_string(), content.clone());
        if let Some(data) = request.decoded_data().filter(|data| !data.is_null()) {
            point.insert(keys::DATA.to_string(), data);
        }
        if let Some(params) = request.effective_params() {
            point.insert(keys::PARAMS.to_string(), params);
        }
        point.insert(keys::PROMPT.to_string(), Value::from(variant.alias.as_str()));
        self.generated_pipeline.push(point);

        tracing::debug!(service, method, path, status = variant.status, alias = %variant.alias, "answered from combination");
        MockResponse::from_content(variant.status, content)
    }
}

/// First ten hex characters of the SHA-256 of `method#path`.
pub fn endpoint_hash(method: &str, path: &str) -> String {
    let digest = Sha256::digest(format!("{}#{}", method, path).as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(ENDPOINT_HASH_LEN);
    hash
}

fn generated_slot(point: &RawPoint) -> Option<EndpointSlot> {
    let service = point.get(keys::SERVICE)?.as_str()?;
    let method = point.get(keys::METHOD)?.as_str()?;
    let path = point
        .get(keys::PATTERN)
        .or_else(|| point.get(keys::PATH))?
        .as_str()?;
    Some((service.to_string(), format!("{}#{}", method, path)))
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn no_combination() -> AppError {
    AppError::new(
        ErrorCategory::InternalError,
        "No stub combination selected; call init_test first",
    )
    .with_code("GEN-001")
}
