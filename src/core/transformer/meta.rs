use super::{FlowItem, FlowTree};
use crate::core::points::RawPoint;
use apiflows_types::keys;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Original point values keyed by `POINT.<hash>`, with the tests each point appears in.
pub type PointRegistry = IndexMap<String, RawPoint>;

const META_ORIGIN: &str = "origin";
const META_TEST: &str = "test";
const META_TESTS: &str = "tests";

/// Strip `_meta` from every point of the tree and collect the origins into a registry.
///
/// Points sharing a hash are registered once; later occurrences only append their test name.
pub fn remove_meta(tree: &mut FlowTree) -> PointRegistry {
    let mut registry = PointRegistry::new();
    collect(tree, &mut registry);
    registry
}

fn collect(tree: &mut FlowTree, registry: &mut PointRegistry) {
    for items in tree.values_mut() {
        for item in items.iter_mut() {
            match item {
                FlowItem::Branches(branches) => collect(branches, registry),
                FlowItem::Point(point) => register(point, registry),
            }
        }
    }
}

fn register(point: &mut RawPoint, registry: &mut PointRegistry) {
    let mut origin = match point.shift_remove(keys::META) {
        Some(Value::Object(mut meta)) => match meta.shift_remove(META_ORIGIN) {
            Some(Value::Object(origin)) => origin,
            _ => point.clone(),
        },
        _ => point.clone(),
    };
    let hash = point
        .get(keys::HASH)
        .and_then(Value::as_str)
        .unwrap_or_default();
    let key = format!("POINT.{}", hash);

    let mut origin_meta = take_meta(&mut origin);
    if let Some(pattern) = point.get(keys::PATTERN) {
        origin_meta.insert(keys::PATTERN.to_string(), pattern.clone());
    }
    let test = origin_meta.get(META_TEST).cloned().unwrap_or(Value::Null);

    if let Some(existing) = registry.get_mut(&key) {
        let mut meta = take_meta(existing);
        if let Some(Value::Array(tests)) = meta.get_mut(META_TESTS) {
            tests.push(test);
        }
        existing.insert(keys::META.to_string(), Value::Object(meta));
        return;
    }

    origin_meta
        .entry(META_TESTS.to_string())
        .or_insert_with(|| Value::Array(vec![test]));
    origin.insert(keys::META.to_string(), Value::Object(origin_meta));
    registry.insert(key, origin);
}

fn take_meta(point: &mut RawPoint) -> Map<String, Value> {
    match point.shift_remove(keys::META) {
        Some(Value::Object(meta)) => meta,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transformer::{fold, normalize, NormalizeOptions, Pipelines};
    use serde_json::json;

    fn pipelines() -> Pipelines {
        let api = json!({"_point": "api", "method": "get", "path": "/", "status": 200});
        let ok = json!({"_point": "external_api", "_service": "github", "method": "get", "path": "/user", "status": 200});
        let failed = json!({"_point": "external_api", "_service": "github", "method": "get", "path": "/user", "status": 500});
        let mut pipelines = Pipelines::new();
        pipelines.insert(
            "TEST.1".into(),
            vec![api.as_object().cloned().unwrap(), ok.as_object().cloned().unwrap()],
        );
        pipelines.insert(
            "TEST.2".into(),
            vec![api.as_object().cloned().unwrap(), failed.as_object().cloned().unwrap()],
        );
        pipelines
    }

    #[test]
    fn strips_meta_and_registers_each_hash_once() {
        let normalized = normalize(pipelines(), None, &NormalizeOptions::default());
        let mut tree = fold(&normalized);
        let registry = remove_meta(&mut tree);

        assert_eq!(registry.len(), 3);
        for point in super::super::tree_points(&tree) {
            assert!(point.get("_meta").is_none());
            let key = format!("POINT.{}", point["hash"].as_str().unwrap());
            assert!(registry.contains_key(&key));
        }
    }

    #[test]
    fn shared_points_list_every_test() {
        let normalized = normalize(pipelines(), None, &NormalizeOptions::default());
        let api_hash = normalized["TEST.1"][0]["hash"].as_str().unwrap().to_string();
        let mut tree = fold(&normalized);
        let registry = remove_meta(&mut tree);

        // The shared api point sits once in the tree; both tests reach it through the fold.
        let shared = &registry[&format!("POINT.{}", api_hash)];
        assert_eq!(shared["_meta"]["tests"], json!(["TEST.1"]));
        assert_eq!(shared["path"], json!("/"));
    }

    #[test]
    fn duplicated_points_append_their_tests() {
        let point = json!({"_point": "api", "path": "/", "hash": "abc", "_meta": {"origin": {"_point": "api", "path": "/", "_meta": {"test": "TEST.1"}}}});
        let other = json!({"_point": "api", "path": "/", "hash": "abc", "_meta": {"origin": {"_point": "api", "path": "/", "_meta": {"test": "TEST.2"}}}});
        let mut tree = FlowTree::new();
        tree.insert(
            "WORKFLOW-w1".into(),
            vec![FlowItem::Point(point.as_object().cloned().unwrap())],
        );
        tree.insert(
            "WORKFLOW-w2".into(),
            vec![FlowItem::Point(other.as_object().cloned().unwrap())],
        );
        let registry = remove_meta(&mut tree);
        assert_eq!(registry["POINT.abc"]["_meta"]["tests"], json!(["TEST.1", "TEST.2"]));
    }

    #[test]
    fn pattern_is_copied_into_origin_meta() {
        let point = json!({"_point": "external_api", "pattern": "/u/{id}", "hash": "h", "_meta": {"origin": {"_point": "external_api", "path": "/u/1", "_meta": {"test": "T"}}}});
        let mut tree = FlowTree::new();
        tree.insert(
            "WORKFLOW-w1".into(),
            vec![FlowItem::Point(point.as_object().cloned().unwrap())],
        );
        let registry = remove_meta(&mut tree);
        assert_eq!(registry["POINT.h"]["_meta"]["pattern"], json!("/u/{id}"));
        assert_eq!(registry["POINT.h"]["path"], json!("/u/1"));
    }
}
