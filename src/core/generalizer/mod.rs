//! Generalization of captured values: wildcard markers for values that vary between runs,
//! path-token detection and recovery from values that cannot be serialized.

use crate::core::points::RawPoint;
use apiflows_types::{keys, ANY};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

/// Default path-token heuristics: 32-character opaque ids and 10-digit numbers.
pub const DEFAULT_TOKEN_PATTERNS: [&str; 2] = [r"^\w{32}$", r"^\d{10}$"];
pub const DEFAULT_TOKEN_NAME: &str = "token";

pub fn any() -> Value {
    Value::String(ANY.to_string())
}

pub fn is_any(value: &Value) -> bool {
    matches!(value, Value::String(text) if text == ANY)
}

/// Structural equality where `ANY` anywhere in `expected` matches any actual value.
pub fn matches_expected(expected: &Value, actual: &Value) -> bool {
    if is_any(expected) {
        return true;
    }
    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => {
            expected.len() == actual.len()
                && expected.iter().all(|(key, value)| {
                    actual
                        .get(key)
                        .map(|other| matches_expected(value, other))
                        .unwrap_or(false)
                })
        }
        (Value::Array(expected), Value::Array(actual)) => {
            expected.len() == actual.len()
                && expected
                    .iter()
                    .zip(actual)
                    .all(|(value, other)| matches_expected(value, other))
        }
        _ => expected == actual,
    }
}

/// Every key of `expected` is present in `actual` with a matching value.
pub fn is_subset(expected: &Map<String, Value>, actual: &Map<String, Value>) -> bool {
    expected.iter().all(|(key, value)| {
        actual
            .get(key)
            .map(|other| matches_expected(value, other))
            .unwrap_or(false)
    })
}

/// Serialize a captured value; anything that fails becomes `ANY`.
pub fn capture_value<T: Serialize + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!("captured value is not serializable, stored as ANY: {}", err);
            any()
        }
    }
}

/// Field-wise [`capture_value`], so one bad field does not discard the whole record.
pub fn clean_not_serializable<'a, T, I>(fields: I) -> RawPoint
where
    T: Serialize + 'a,
    I: IntoIterator<Item = (&'a str, &'a T)>,
{
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), capture_value(value)))
        .collect()
}

/// Heuristic detection of opaque tokens in literal paths.
#[derive(Debug, Clone)]
pub struct PathGeneralizer {
    patterns: Vec<Regex>,
    token_name: String,
}

impl Default for PathGeneralizer {
    fn default() -> Self {
        let patterns = DEFAULT_TOKEN_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect();
        Self {
            patterns,
            token_name: DEFAULT_TOKEN_NAME.to_string(),
        }
    }
}

impl PathGeneralizer {
    pub fn new<S: AsRef<str>>(patterns: &[S], token_name: &str) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|pattern| Regex::new(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            token_name: token_name.to_string(),
        })
    }

    /// Template for `path` with every token segment replaced, or `None` when nothing matched.
    pub fn generalize(&self, path: &str) -> Option<String> {
        let placeholder = format!("{{{}}}", self.token_name);
        let mut changed = false;
        let segments: Vec<&str> = path
            .split('/')
            .map(|segment| {
                if !segment.is_empty() && self.patterns.iter().any(|re| re.is_match(segment)) {
                    changed = true;
                    placeholder.as_str()
                } else {
                    segment
                }
            })
            .collect();
        changed.then(|| segments.join("/"))
    }

    /// Replace `path` with `pattern` on a raw point when the path carries tokens.
    pub fn set_pattern(&self, point: &mut RawPoint) {
        if point.contains_key(keys::PATTERN) {
            return;
        }
        let Some(Value::String(path)) = point.get(keys::PATH) else {
            return;
        };
        if let Some(pattern) = self.generalize(path) {
            point.insert(keys::PATTERN.to_string(), Value::String(pattern));
            point.shift_remove(keys::PATH);
        }
    }
}

/// Replace every location where `snapshot` and `repeated` disagree with `ANY`.
///
/// `_meta` blocks are not compared. Arrays of different length are replaced whole; keys
/// present on one side only become `ANY` in `snapshot`. Returns the replaced locations.
pub fn generalize_by_double_run(snapshot: &mut Value, repeated: &Value) -> Vec<String> {
    let mut replaced = Vec::new();
    diff_into(snapshot, repeated, "root", &mut replaced);
    for location in &replaced {
        tracing::warn!(location = %location, "value differs between runs, replaced with ANY");
    }
    replaced
}

fn diff_into(snapshot: &mut Value, repeated: &Value, location: &str, replaced: &mut Vec<String>) {
    if is_any(snapshot) {
        return;
    }
    match (&mut *snapshot, repeated) {
        (Value::Object(left), Value::Object(right)) => {
            for (key, value) in left.iter_mut() {
                if key == keys::META {
                    continue;
                }
                let child = format!("{}['{}']", location, key);
                match right.get(key) {
                    Some(other) => diff_into(value, other, &child, replaced),
                    None => {
                        *value = any();
                        replaced.push(child);
                    }
                }
            }
            for key in right.keys() {
                if key != keys::META && !left.contains_key(key) {
                    left.insert(key.clone(), any());
                    replaced.push(format!("{}['{}']", location, key));
                }
            }
        }
        (Value::Array(left), Value::Array(right)) if left.len() == right.len() => {
            for (index, (value, other)) in left.iter_mut().zip(right).enumerate() {
                diff_into(value, other, &format!("{}[{}]", location, index), replaced);
            }
        }
        (left, right) => {
            if *left != *right {
                *left = any();
                replaced.push(location.to_string());
            }
        }
    }
}

/// Mark the value at `path` as `ANY`, or remove it. A `*` segment fans out over every key;
/// arrays met on the way fan out over their items.
pub fn set_any(data: &mut Value, path: &[&str], remove: bool) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    match data {
        Value::Array(items) => {
            for item in items {
                set_any(item, path, remove);
            }
        }
        Value::Object(map) if *head == "*" => {
            if rest.is_empty() {
                if remove {
                    map.clear();
                } else {
                    map.values_mut().for_each(|value| *value = any());
                }
            } else {
                for value in map.values_mut() {
                    set_any(value, rest, remove);
                }
            }
        }
        Value::Object(map) => {
            if rest.is_empty() {
                if remove {
                    map.shift_remove(*head);
                } else if let Some(value) = map.get_mut(*head) {
                    *value = any();
                }
            } else if let Some(child) = map.get_mut(*head) {
                set_any(child, rest, remove);
            }
        }
        _ => {}
    }
}
