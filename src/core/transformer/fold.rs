use super::{FlowItem, FlowTree, Pipelines};
use crate::core::points::RawPoint;
use apiflows_types::keys;
use indexmap::IndexMap;
use serde_json::Value;

const BRANCH_PREFIX: &str = "WORKFLOW-w";
const META_BRANCH: &str = "branch";

#[derive(Debug, Default)]
struct TrieNode {
    points: Vec<RawPoint>,
    children: IndexMap<String, TrieNode>,
    /// A pipeline ends at this node.
    terminal: bool,
}

impl TrieNode {
    fn collapse_chains(&mut self) {
        for child in self.children.values_mut() {
            child.collapse_chains();
            while child.children.len() == 1 && !child.terminal {
                let Some((_, grandchild)) = child.children.pop() else {
                    break;
                };
                child.points.extend(grandchild.points);
                child.children = grandchild.children;
                child.terminal = grandchild.terminal;
            }
        }
    }
}

/// Fold pipelines into a branching tree sharing common prefixes.
///
/// Points are the same edge when their content without `_meta` is equal. Single-child chains
/// are merged and every point is tagged with its dotted branch path. A pipeline that is a strict
/// prefix of another ends in an empty branch.
pub fn fold(pipelines: &Pipelines) -> FlowTree {
    let mut root = TrieNode::default();
    for points in pipelines.values() {
        let mut cursor = &mut root;
        for point in points {
            cursor = cursor
                .children
                .entry(edge_key(point))
                .or_insert_with(|| TrieNode {
                    points: vec![point.clone()],
                    ..Default::default()
                });
        }
        cursor.terminal = true;
    }
    root.collapse_chains();
    label(root.children, &[])
}

fn label(children: IndexMap<String, TrieNode>, parent: &[usize]) -> FlowTree {
    let mut tree = FlowTree::new();
    for (position, (_, node)) in children.into_iter().enumerate() {
        let mut path = parent.to_vec();
        path.push(position + 1);
        let dotted = path
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(".");

        let mut items: Vec<FlowItem> = node
            .points
            .into_iter()
            .map(|mut point| {
                tag_branch(&mut point, &dotted);
                FlowItem::Point(point)
            })
            .collect();

        if !node.children.is_empty() {
            let mut continuations = IndexMap::new();
            if node.terminal {
                continuations.insert(String::new(), TrieNode::default());
            }
            continuations.extend(node.children);
            items.push(FlowItem::Branches(label(continuations, &path)));
        }
        tree.insert(format!("{}{}", BRANCH_PREFIX, dotted), items);
    }
    tree
}

fn tag_branch(point: &mut RawPoint, dotted: &str) {
    let meta = point
        .entry(keys::META.to_string())
        .or_insert_with(|| Value::Object(Default::default()));
    if let Value::Object(meta) = meta {
        meta.insert(META_BRANCH.to_string(), Value::String(dotted.to_string()));
    }
}

/// Canonical text of a point without `_meta`; object keys are sorted.
fn edge_key(point: &RawPoint) -> String {
    let mut stripped = point.clone();
    stripped.shift_remove(keys::META);
    canonical(&Value::Object(stripped))
}

fn canonical(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let body = entries
                .into_iter()
                .map(|(key, value)| format!("{}:{}", Value::String(key.clone()), canonical(value)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", body)
        }
        Value::Array(items) => {
            let body = items.iter().map(canonical).collect::<Vec<_>>().join(",");
            format!("[{}]", body)
        }
        other => other.to_string(),
    }
}

/// Root-to-leaf label paths of the tree in traversal order.
pub fn get_flows(tree: &FlowTree) -> Vec<Vec<String>> {
    let mut flows = Vec::new();
    for (label, items) in tree {
        let mut has_branches = false;
        for item in items {
            if let FlowItem::Branches(branches) = item {
                has_branches = true;
                let sub_flows = get_flows(branches);
                if sub_flows.is_empty() {
                    flows.push(vec![label.clone()]);
                }
                for sub_flow in sub_flows {
                    let mut flow = vec![label.clone()];
                    flow.extend(sub_flow);
                    flows.push(flow);
                }
            }
        }
        if !has_branches {
            flows.push(vec![label.clone()]);
        }
    }
    flows
}

/// Concatenate the points along one flow. `None` when the flow does not start in the tree.
pub fn load_flow(tree: &FlowTree, flow: &[String]) -> Option<Vec<RawPoint>> {
    let first = flow.first()?;
    let items = tree.get(first)?;
    let mut pipeline = Vec::new();
    collapse(items, flow, 1, &mut pipeline);
    Some(pipeline)
}

fn collapse(items: &[FlowItem], flow: &[String], depth: usize, pipeline: &mut Vec<RawPoint>) {
    for item in items {
        match item {
            FlowItem::Point(point) => pipeline.push(point.clone()),
            FlowItem::Branches(branches) => {
                let next = flow.get(depth).and_then(|label| branches.get(label));
                if let Some(next) = next {
                    collapse(next, flow, depth + 1, pipeline);
                }
            }
        }
    }
}

/// Flatten a tree into `TEST.001`, `TEST.002`, ... in traversal order.
pub fn unfold(tree: &FlowTree) -> Pipelines {
    get_flows(tree)
        .iter()
        .enumerate()
        .filter_map(|(position, flow)| {
            load_flow(tree, flow).map(|pipeline| (format!("TEST.{:03}", position + 1), pipeline))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(kind: &str, path: &str) -> RawPoint {
        json!({"_point": kind, "method": "get", "path": path})
            .as_object()
            .cloned()
            .unwrap()
    }

    fn strip_meta(pipeline: &[RawPoint]) -> Vec<RawPoint> {
        pipeline
            .iter()
            .map(|point| {
                let mut point = point.clone();
                point.shift_remove("_meta");
                point
            })
            .collect()
    }

    fn sample() -> Pipelines {
        let mut pipelines = Pipelines::new();
        pipelines.insert(
            "a".into(),
            vec![point("api", "/"), point("external_api", "/x"), point("assert", "ok")],
        );
        pipelines.insert(
            "b".into(),
            vec![point("api", "/"), point("external_api", "/y")],
        );
        pipelines
    }

    #[test]
    fn shares_prefix_and_collapses_chains() {
        let tree = fold(&sample());
        assert_eq!(tree.len(), 1);
        let items = &tree["WORKFLOW-w1"];
        assert_eq!(items.len(), 2);
        let FlowItem::Branches(branches) = &items[1] else {
            panic!("expected branches");
        };
        let labels: Vec<&String> = branches.keys().collect();
        assert_eq!(labels, vec!["WORKFLOW-w1.1", "WORKFLOW-w1.2"]);
        assert_eq!(branches["WORKFLOW-w1.1"].len(), 2);
        assert_eq!(
            branches["WORKFLOW-w1.1"][1].as_point().unwrap()["_meta"]["branch"],
            json!("1.1")
        );
    }

    #[test]
    fn unfold_inverts_fold() {
        let input = sample();
        let output = unfold(&fold(&input));
        let mut expected: Vec<Vec<RawPoint>> = input.values().cloned().collect();
        let mut actual: Vec<Vec<RawPoint>> = output.values().map(|p| strip_meta(p)).collect();
        expected.sort_by_key(|pipeline| serde_json::to_string(pipeline).unwrap());
        actual.sort_by_key(|pipeline| serde_json::to_string(pipeline).unwrap());
        assert_eq!(actual, expected);
        let names: Vec<&String> = output.keys().collect();
        assert_eq!(names, vec!["TEST.001", "TEST.002"]);
    }

    #[test]
    fn prefix_pipeline_survives_round_trip() {
        let mut input = Pipelines::new();
        input.insert("long".into(), vec![point("api", "/"), point("external_api", "/x")]);
        input.insert("short".into(), vec![point("api", "/")]);
        let tree = fold(&input);
        let output = unfold(&tree);
        assert_eq!(output.len(), 2);
        let lengths: Vec<usize> = output.values().map(Vec::len).collect();
        assert_eq!(lengths, vec![1, 2]);
    }

    #[test]
    fn edge_key_ignores_key_order_and_meta() {
        let a = json!({"_point": "api", "path": "/", "_meta": {"test": "a"}});
        let b = json!({"path": "/", "_point": "api", "_meta": {"test": "b"}});
        assert_eq!(
            edge_key(a.as_object().unwrap()),
            edge_key(b.as_object().unwrap())
        );
    }

    #[test]
    fn empty_input_folds_to_empty_tree() {
        assert!(fold(&Pipelines::new()).is_empty());
        assert!(unfold(&FlowTree::new()).is_empty());
    }
}
