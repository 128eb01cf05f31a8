//! Captured pipeline transforms: normalization, folding into a branching tree and back,
//! metadata stripping and expansion of a tree into runnable tests.

pub mod expand;
pub mod fold;
pub mod meta;
pub mod normalize;

pub use expand::{build_pipeline, expand_tests, ExpandOptions, ExpandedTest, TestMeta};
pub use fold::{fold, get_flows, load_flow, unfold};
pub use meta::{remove_meta, PointRegistry};
pub use normalize::{index_parts, normalize, point_hash, NormalizeOptions};

use crate::core::points::RawPoint;
use apiflows_types::keys;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Named linear pipelines in their canonical order.
pub type Pipelines = IndexMap<String, Vec<RawPoint>>;

/// Folded pipelines: branch label to the points of that branch, optionally followed by the
/// continuations that diverge after it.
pub type FlowTree = IndexMap<String, Vec<FlowItem>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlowItem {
    Point(RawPoint),
    Branches(FlowTree),
}

impl FlowItem {
    pub fn as_point(&self) -> Option<&RawPoint> {
        match self {
            FlowItem::Point(point) => Some(point),
            FlowItem::Branches(_) => None,
        }
    }

    fn from_map(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        if map.contains_key(keys::POINT) {
            return Ok(FlowItem::Point(map));
        }
        let mut tree = FlowTree::new();
        for (label, items) in map {
            tree.insert(label, serde_json::from_value::<Vec<FlowItem>>(items)?);
        }
        Ok(FlowItem::Branches(tree))
    }
}

/// A mapping carrying `_point` is a point, any other mapping holds branches.
impl<'de> Deserialize<'de> for FlowItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        FlowItem::from_map(map).map_err(serde::de::Error::custom)
    }
}

/// Every point of the tree in traversal order.
pub fn tree_points(tree: &FlowTree) -> Vec<&RawPoint> {
    let mut points = Vec::new();
    for items in tree.values() {
        for item in items {
            match item {
                FlowItem::Point(point) => points.push(point),
                FlowItem::Branches(branches) => points.extend(tree_points(branches)),
            }
        }
    }
    points
}
