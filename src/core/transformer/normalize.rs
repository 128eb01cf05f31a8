use super::Pipelines;
use crate::core::generalizer::{generalize_by_double_run, PathGeneralizer};
use crate::core::points::RawPoint;
use apiflows_types::keys;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

const HASH_LEN: usize = 40;
const TRACE_KEY: &str = "trace";
const META_TEST: &str = "test";
const META_INDEX: &str = "index";
const META_ORIGIN: &str = "origin";

/// Point kinds whose request payload changes behavior and so takes part in the hash.
const PAYLOAD_KINDS: [&str; 4] = ["api", "notification", "input_mq", "mq"];

/// Hook applied to every point (and its repeated counterpart) before hashing.
pub type CleanHook = Box<dyn Fn(&mut RawPoint)>;

#[derive(Default)]
pub struct NormalizeOptions {
    /// Rewrite token-bearing paths into patterns.
    pub path_generalizer: Option<PathGeneralizer>,
    pub clean: Option<CleanHook>,
}

impl NormalizeOptions {
    pub fn with_path_generalizer(mut self, generalizer: PathGeneralizer) -> Self {
        self.path_generalizer = Some(generalizer);
        self
    }

    pub fn with_clean(mut self, clean: CleanHook) -> Self {
        self.clean = Some(clean);
        self
    }
}

/// Hash every point, attach `_meta {index, origin, test}` and order pipelines canonically.
///
/// With `repeated`, values that differ from the same point of the repeated run are replaced
/// with `ANY` before hashing.
pub fn normalize(
    pipelines: Pipelines,
    repeated: Option<&Pipelines>,
    options: &NormalizeOptions,
) -> Pipelines {
    let mut keyed: Vec<(Vec<Value>, String, Vec<RawPoint>)> = pipelines
        .into_iter()
        .map(|(test, points)| {
            let counterpart = repeated.and_then(|repeated| repeated.get(&test));
            let mut sort_key = Vec::new();
            let points = points
                .into_iter()
                .enumerate()
                .map(|(position, point)| {
                    let repeated_point = counterpart.and_then(|points| points.get(position)).cloned();
                    let point = normalize_point(point, repeated_point, &test, options);
                    if let Some(Value::Array(index)) = point
                        .get(keys::META)
                        .and_then(|meta| meta.get(META_INDEX))
                    {
                        sort_key.extend(index.iter().cloned());
                    }
                    point
                })
                .collect();
            (sort_key, test, points)
        })
        .collect();
    keyed.sort_by(|(left, ..), (right, ..)| compare_index(left, right));
    keyed
        .into_iter()
        .map(|(_, test, points)| (test, points))
        .collect()
}

fn normalize_point(
    mut point: RawPoint,
    repeated: Option<RawPoint>,
    test: &str,
    options: &NormalizeOptions,
) -> RawPoint {
    prepare(&mut point, test);
    let origin = point.clone();
    finish_cleaning(&mut point, options);

    if let Some(mut repeated) = repeated {
        prepare(&mut repeated, test);
        finish_cleaning(&mut repeated, options);
        let mut snapshot = Value::Object(point);
        generalize_by_double_run(&mut snapshot, &Value::Object(repeated));
        point = match snapshot {
            Value::Object(map) => map,
            _ => RawPoint::new(),
        };
    }

    let index = index_parts(&point);
    let hash = point_hash(&index);
    let mut origin = origin;
    origin.insert(keys::HASH.to_string(), Value::String(hash.clone()));
    point.insert(keys::HASH.to_string(), Value::String(hash));

    let mut meta = Map::new();
    meta.insert(META_INDEX.to_string(), Value::Array(index));
    meta.insert(META_ORIGIN.to_string(), Value::Object(origin));
    meta.insert(META_TEST.to_string(), Value::String(test.to_string()));
    point.insert(keys::META.to_string(), Value::Object(meta));
    point
}

fn prepare(point: &mut RawPoint, test: &str) {
    if let Some(status) = point.get_mut(keys::STATUS) {
        if status.is_null() {
            *status = Value::from(0);
        }
    }
    let meta = point
        .entry(keys::META.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    if let Value::Object(meta) = meta {
        meta.insert(META_TEST.to_string(), Value::String(test.to_string()));
    }
}

fn finish_cleaning(point: &mut RawPoint, options: &NormalizeOptions) {
    if let Some(generalizer) = &options.path_generalizer {
        generalizer.set_pattern(point);
    }
    if let Some(clean) = &options.clean {
        clean(point);
    }
    if let Some(Value::Object(meta)) = point.get_mut(keys::META) {
        meta.shift_remove(TRACE_KEY);
    }
}

/// Fields identifying a point, in hashing order: kind, routing, service, pattern or path,
/// method, status, content and, for payload-driven kinds, data.
pub fn index_parts(point: &RawPoint) -> Vec<Value> {
    let mut index = Vec::new();
    let kind = point.get(keys::POINT).and_then(Value::as_str).unwrap_or_default();
    for key in [
        keys::POINT,
        keys::EXCHANGE,
        keys::ROUTING_KEY,
        keys::SERVICE,
        keys::PATTERN,
        keys::METHOD,
        keys::STATUS,
    ] {
        match point.get(key) {
            Some(value) => index.push(value.clone()),
            None if key == keys::PATTERN => {
                if let Some(path) = point.get(keys::PATH) {
                    index.push(path.clone());
                }
            }
            None => {}
        }
    }
    if let Some(content) = point.get(keys::CONTENT) {
        index.push(Value::String(content.to_string()));
    }
    if PAYLOAD_KINDS.contains(&kind) {
        let data = point.get(keys::DATA).cloned().unwrap_or(Value::Null);
        index.push(Value::String(data.to_string()));
    }
    index
}

/// Hex digest over the JSON form of the index, truncated to 40 characters.
pub fn point_hash(index: &[Value]) -> String {
    let encoded = Value::Array(index.to_vec()).to_string();
    let mut hash = hex::encode(Sha256::digest(encoded.as_bytes()));
    hash.truncate(HASH_LEN);
    hash
}

fn compare_index(left: &[Value], right: &[Value]) -> Ordering {
    for (a, b) in left.iter().zip(right) {
        let ordering = compare_value(a, b);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

/// Numbers before strings; anything else compares by its JSON text.
fn compare_value(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.total_cmp(&b)
        }
        (Value::Number(_), _) => Ordering::Less,
        (_, Value::Number(_)) => Ordering::Greater,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (a, b) => a.to_string().cmp(&b.to_string()),
    }
}
