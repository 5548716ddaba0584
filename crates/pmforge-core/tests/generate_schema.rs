//! Integration test that writes collection.schema.json
//!
//! Run with: cargo test -p pmforge-core --test generate_schema

use pmforge_core::collection::generate_schema;

#[test]
fn write_schema_file() {
    let schema = generate_schema();

    let dir = tempfile::tempdir().unwrap();
    let schema_path = dir.path().join("collection.schema.json");
    std::fs::write(&schema_path, &schema).expect("failed to write schema file");

    let content = std::fs::read_to_string(&schema_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(
        parsed.get("title").and_then(|v| v.as_str()),
        Some("Collection")
    );
    let defs = parsed
        .get("$defs")
        .and_then(|d| d.as_object())
        .expect("schema should carry definitions");
    for name in ["Item", "Request", "Url", "Event", "Script", "ResponseTemplate"] {
        assert!(defs.contains_key(name), "missing definition {name}");
    }
}
