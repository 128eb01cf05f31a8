use apiflows::core::snapshot::{load_pipelines, load_tree};
use apiflows::core::transformer::{FlowItem, FlowTree};
use apiflows::utils::serialization::{
    FileSerializer, FileUtils, JsonSerializer, Serializer, YamlSerializer,
};
use std::fs;
use tempfile::TempDir;

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
struct TestData {
    name: String,
    value: i32,
    items: Vec<String>,
}

impl TestData {
    fn new(name: &str, value: i32) -> Self {
        TestData {
            name: name.to_string(),
            value,
            items: vec!["item1".to_string(), "item2".to_string()],
        }
    }
}

const SNAPSHOT: &str = r#"
WORKFLOW-w1:
- _point: api
  method: get
  path: /profile
- WORKFLOW-w1.1:
  - _point: external_api
    _service: github
    method: get
    path: /user
    status: 200
  WORKFLOW-w1.2:
  - _point: external_api
    _service: github
    method: get
    path: /user
    status: 500
"#;

#[test]
fn test_json_serializer_roundtrip() {
    let serializer = JsonSerializer;
    let data = TestData::new("test", 42);

    let serialized = serializer.serialize(&data).unwrap();
    let json_str = String::from_utf8(serialized.clone()).unwrap();
    assert!(json_str.contains("\"name\": \"test\""));

    let deserialized: TestData = serializer.deserialize(&serialized).unwrap();
    assert_eq!(data, deserialized);
}

#[test]
fn test_yaml_serializer_is_block_style() {
    let serializer = YamlSerializer;
    let data = TestData::new("stub", 7);

    let serialized = String::from_utf8(serializer.serialize(&data).unwrap()).unwrap();
    assert!(serialized.contains("name: stub\n"));
    assert!(serialized.contains("- item1\n"));

    let deserialized: TestData = serializer.deserialize(serialized.as_bytes()).unwrap();
    assert_eq!(data, deserialized);
}

#[test]
fn test_yaml_serializer_invalid_input() {
    let result: anyhow::Result<TestData> = YamlSerializer.deserialize(b"name: [unclosed");
    assert!(result.is_err());
}

#[test]
fn test_file_utils_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("deeper").join("data.yaml");
    let data = TestData::new("nested", 3);

    FileUtils.save_to_file(&path, &data, &YamlSerializer).unwrap();
    assert!(path.exists());

    let loaded: TestData = FileUtils.load_from_file(&path, &YamlSerializer).unwrap();
    assert_eq!(data, loaded);
}

#[test]
fn test_file_utils_missing_file_mentions_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.json");

    let error = FileUtils
        .load_from_file::<TestData, _>(&path, &JsonSerializer)
        .unwrap_err();
    assert!(format!("{:#}", error).contains("absent.json"));
}

#[test]
fn test_snapshot_tree_distinguishes_points_from_branches() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("feature.apiflows.yaml");
    fs::write(&path, SNAPSHOT).unwrap();

    let tree: FlowTree = load_tree(&path).unwrap();
    let items = &tree["WORKFLOW-w1"];
    assert_eq!(items.len(), 2);
    assert!(items[0].as_point().is_some());
    match &items[1] {
        FlowItem::Branches(branches) => {
            assert_eq!(
                branches.keys().collect::<Vec<_>>(),
                vec!["WORKFLOW-w1.1", "WORKFLOW-w1.2"]
            );
        }
        FlowItem::Point(_) => panic!("expected branches"),
    }

    let rewritten = String::from_utf8(YamlSerializer.serialize(&tree).unwrap()).unwrap();
    let reparsed: FlowTree = serde_yaml::from_str(&rewritten).unwrap();
    assert_eq!(tree, reparsed);
}

#[test]
fn test_snapshot_load_errors_carry_code() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.yaml");
    fs::write(&path, "TEST.001: {not: a list}").unwrap();

    let error = load_pipelines(&path).unwrap_err();
    assert_eq!(error.code, "SNAP-001");
    assert!(error.message.contains("broken.yaml"));
}
