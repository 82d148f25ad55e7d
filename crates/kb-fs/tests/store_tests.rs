use kb_fs::{ConfigStore, Error};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde::{Deserialize, Serialize};
use std::fs;
use tempfile::TempDir;

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Doc {
    name: String,
    count: u32,
}

#[rstest]
#[case("doc.json", r#"{"name": "a", "count": 2}"#)]
#[case("doc.toml", "name = \"a\"\ncount = 2\n")]
#[case("doc.yaml", "name: a\ncount: 2\n")]
fn test_load_detects_format(#[case] file: &str, #[case] content: &str) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join(file);
    fs::write(&path, content).unwrap();

    let doc: Doc = ConfigStore::new().load(&path).unwrap();

    assert_eq!(
        doc,
        Doc {
            name: "a".into(),
            count: 2
        }
    );
}

#[test]
fn test_unsupported_extension() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("doc.ini");
    fs::write(&path, "x").unwrap();

    let result: Result<Doc, _> = ConfigStore::new().load(&path);
    assert!(matches!(result, Err(Error::UnsupportedFormat { .. })));
}

#[test]
fn test_parse_error_names_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    let err = ConfigStore::new().load::<Doc>(&path).unwrap_err();
    assert!(err.to_string().contains("broken.json"));
}

#[test]
fn test_save_then_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested/dir/doc.json");
    let doc = Doc {
        name: "saved".into(),
        count: 7,
    };

    ConfigStore::new().save(&path, &doc).unwrap();

    let loaded: Doc = ConfigStore::new().load(&path).unwrap();
    assert_eq!(loaded, doc);
}

#[test]
fn test_missing_file_is_not_found() {
    let temp = TempDir::new().unwrap();
    let err = ConfigStore::new()
        .load::<Doc>(&temp.path().join("missing.json"))
        .unwrap_err();
    assert!(err.is_not_found());
}
