//! End-to-end conversion of the petstore fixture
//!
//! Run with: cargo test -p pmforge-engine --test convert_petstore

use std::path::{Path, PathBuf};

use pmforge_core::collection::{Collection, Item, Listen};
use pmforge_core::config::{Settings, SynthesisSettings, TestConfig};
use pmforge_engine::{ConvertError, Converter, MemoryFetcher, Resolver, SchemaDocument};
use serde_json::json;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn seeded() -> SynthesisSettings {
    SynthesisSettings {
        seed: Some(2024),
        ..SynthesisSettings::default()
    }
}

fn petstore() -> Converter {
    let document = SchemaDocument::load(&fixture("petstore.yaml")).unwrap();
    Converter::new(document).with_synthesis(seeded())
}

fn configured() -> Collection {
    let config = TestConfig::load(&fixture("test-config.yaml")).unwrap();
    petstore()
        .with_test_config(config)
        .with_host("http://localhost:3000")
        .convert()
        .unwrap()
}

fn test_script_names(item: &Item) -> String {
    item.script(Listen::Test)
        .map(|s| s.name.clone())
        .unwrap_or_default()
}

#[test]
fn routes_are_ordered_by_resource_and_verb() {
    let collection = petstore().convert().unwrap();
    let names: Vec<&str> = collection.item.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "POST /pets",
            "PUT /pets/{petId}",
            "Show pet",
            "GET /pets",
            "GET /stores({storeId})/pets",
            "DELETE /pets/{petId}",
        ]
    );
}

#[test]
fn declared_example_becomes_url_variable() {
    let collection = petstore().convert().unwrap();
    let show = collection.item("Show pet").unwrap();
    assert_eq!(show.request.url.path, vec!["pets", ":petId"]);
    assert_eq!(show.request.url.path_variable("petId"), Some(&json!("1")));
    assert_eq!(show.request.url.raw(), "{{baseUrl}}/pets/:petId");
}

#[test]
fn compound_segment_variable_becomes_global() {
    let collection = petstore().convert().unwrap();
    let stores = collection.item("GET /stores({storeId})/pets").unwrap();
    assert_eq!(stores.request.url.path, vec!["stores{{storeId}}", "pets"]);
    assert!(stores.request.url.variable.is_empty());
    assert_eq!(
        collection.variable("storeId").map(|v| v.value.as_str()),
        Some("s-9")
    );
}

#[test]
fn only_first_success_response_is_asserted() {
    let collection = petstore().convert().unwrap();
    let list = collection.item("GET /pets").unwrap();
    let script = list.script(Listen::Test).unwrap();
    let source = script.source();
    assert!(source.contains("to.have.status(200)"));
    assert!(!source.contains("to.have.status(201)"));
    assert!(!source.contains("to.have.status(400)"));
    assert_eq!(source.matches("pm.test(\"Status code").count(), 1);

    let limit = list.request.url.query[0].value.as_i64().unwrap();
    assert!((1..=50).contains(&limit));
    assert_eq!(list.request.url.query.len(), 1);
}

#[test]
fn default_response_template_maps_to_500() {
    let collection = petstore().convert().unwrap();
    let show = collection.item("Show pet").unwrap();
    let default = show.response.iter().find(|r| r.name == "Unexpected error").unwrap();
    assert_eq!(default.code, 500);
    assert_eq!(default.status, "Internal Server Error");
    assert_eq!(default.body, "Unexpected error");
}

#[test]
fn request_body_prefers_examples_over_synthesis() {
    let collection = petstore().convert().unwrap();
    let put = collection.item("PUT /pets/{petId}").unwrap();
    let payload = put.request.body.as_ref().unwrap().payload().unwrap();
    assert_eq!(payload["name"], "doggie");
    assert!(payload["tag"].is_string());
    assert!(payload["age"].as_i64().unwrap() >= 1);
    assert!(
        put.request
            .header
            .iter()
            .any(|h| h.key == "Content-Type" && h.value == "application/json")
    );
}

#[test]
fn test_config_drives_values_expectations_and_globals() {
    let collection = configured();

    let post = collection.item("POST /pets").unwrap();
    let payload = post.request.body.as_ref().unwrap().payload().unwrap();
    assert_eq!(payload["name"], "Rex");
    assert_eq!(payload["tag"], "dog");
    let tests = test_script_names(post);
    assert!(tests.contains("POST /pets Test Code is 201"));
    assert!(tests.contains("POST /pets responds in less than 500ms"));
    assert!(tests.contains("Set response of POST /pets: JSON_RESPONSE[\"id\"] to petId"));
    assert_eq!(
        post.script(Listen::Prerequest).map(|s| s.name.as_str()),
        Some("[prerequest] Debug petId")
    );

    let show = collection.item("Show pet").unwrap();
    let tests = test_script_names(show);
    assert!(tests.contains("GET /pets/{petId} Test Code is 200"));
    assert!(tests.contains("GET /pets/{petId} Mimetype is application/json"));
    assert!(tests.contains("GET /pets/{petId} Header X-Rate-Limit is 100"));
    assert!(!tests.contains("responds in less than"));
    assert!(
        show.request
            .header
            .iter()
            .any(|h| h.key == "Accept" && h.value == "application/json")
    );

    let delete = collection.item("DELETE /pets/{petId}").unwrap();
    let tests = test_script_names(delete);
    assert!(!tests.contains("Test Code"));
    assert!(tests.contains("inserted from test config"));
}

#[test]
fn collection_entry_and_promotions_reach_the_collection() {
    let collection = configured();
    assert_eq!(
        collection.variable("baseUrl").map(|v| v.value.as_str()),
        Some("http://localhost:3000")
    );
    assert_eq!(
        collection.variable("apiKey").map(|v| v.value.as_str()),
        Some("secret")
    );

    let prerequest = collection
        .event
        .iter()
        .find(|e| e.listen == Listen::Prerequest)
        .unwrap();
    let source = prerequest.script.source();
    assert!(source.contains("X-Api-Key"));
    assert!(source.contains(r#"console.log("[collection_prerequest] GLOBAL(petId):", pm.globals.get("petId"));"#));
}

#[test]
fn disabling_fake_data_leaves_parameters_unfilled() {
    let config = TestConfig::from_value(json!({
        "GET /pets": {"expect": {"fake_data": false}}
    }))
    .unwrap();
    let collection = petstore().with_test_config(config).convert().unwrap();
    let list = collection.item("GET /pets").unwrap();
    assert!(list.request.url.query.is_empty());
}

#[test]
fn repeated_conversions_share_references_without_tripping_depth() {
    let mut converter = petstore();
    let first = converter.convert().unwrap();
    for _ in 0..3 {
        let next = converter.convert().unwrap();
        assert_eq!(next.item.len(), first.item.len());
        assert_eq!(next.info.postman_id, first.info.postman_id);
    }
}

#[test]
fn plan_reports_resource_conflict() {
    let plan = petstore().plan().unwrap();
    assert_eq!(plan.title, "Petstore 1.0.0");
    assert_eq!(plan.routes.len(), 6);
    assert_eq!(plan.conflicts.len(), 1);
    assert_eq!(plan.conflicts[0].resource, "pets");
    assert_eq!(
        plan.conflicts[0].bases,
        vec!["/pets".to_string(), "/stores({storeId})/pets".to_string()]
    );
}

// ── Inline documents ──

fn ambiguous() -> SchemaDocument {
    SchemaDocument::from_value(json!({
        "info": {"title": "Ambiguous", "version": "1"},
        "paths": {
            "/a/{x}/b/{y}": {
                "get": {
                    "parameters": [{"name": "z", "in": "path", "required": true, "schema": {"type": "string"}}],
                    "responses": {"200": {"description": "ok"}}
                }
            }
        }
    }))
}

#[test]
fn unplaceable_path_parameter_is_strict_error() {
    let err = Converter::new(ambiguous()).convert().unwrap_err();
    match err {
        ConvertError::Ambiguous { route, name, candidates } => {
            assert_eq!(route, "GET /a/{x}/b/{y}");
            assert_eq!(name, "z");
            assert_eq!(candidates, vec!["x", "y"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unplaceable_path_parameter_is_lenient_warning() {
    let collection = Converter::new(ambiguous())
        .with_strict(false)
        .with_synthesis(seeded())
        .convert()
        .unwrap();
    let item = &collection.item[0];
    let keys: Vec<&str> = item.request.url.variable.iter().map(|v| v.key.as_str()).collect();
    assert_eq!(keys, vec!["x", "y"]);
}

#[test]
fn cookie_parameters_are_rejected() {
    let document = SchemaDocument::from_value(json!({
        "paths": {"/me": {"get": {
            "parameters": [{"name": "session", "in": "cookie", "required": true}],
            "responses": {"200": {"description": "ok"}}
        }}}
    }));
    let err = Converter::new(document).convert().unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedLocation { .. }));
}

#[test]
fn remote_schema_reference_is_fetched() {
    let fetcher = MemoryFetcher::default().with_document(
        "https://schemas.example.com/common.json",
        r#"{"Kind": {"type": "string", "enum": ["cat", "dog"]}}"#,
    );
    let document = SchemaDocument::from_value(json!({
        "paths": {"/animals": {"get": {
            "parameters": [{
                "name": "kind", "in": "query", "required": true,
                "schema": {"$ref": "https://schemas.example.com/common.json#/Kind"}
            }],
            "responses": {"200": {"description": "ok"}}
        }}}
    }));
    let collection = Converter::new(document)
        .with_fetcher(Box::new(fetcher))
        .with_synthesis(seeded())
        .convert()
        .unwrap();
    let kind = &collection.item[0].request.url.query[0];
    assert_eq!(kind.key, "kind");
    assert!(kind.value == json!("cat") || kind.value == json!("dog"));
}

#[test]
fn resolution_is_idempotent_and_leaves_document_untouched() {
    let document = SchemaDocument::load(&fixture("petstore.yaml")).unwrap();
    let before = document.value().clone();
    let mut resolver = Resolver::new(&Settings::default().resolver);
    let a = resolver.resolve("#/components/schemas/NewPet", &document).unwrap();
    let b = resolver.resolve("#/components/schemas/NewPet", &document).unwrap();
    assert_eq!(a, b);
    assert_eq!(a["required"], json!(["name"]));
    assert_eq!(document.value(), &before);
}

#[test]
fn settings_drive_converter() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.json");
    let settings = Settings {
        spec: fixture("petstore.yaml").display().to_string(),
        test_config: Some(fixture("test-config.yaml")),
        host: Some("https://api.test".into()),
        output,
        strict: true,
        verbose: true,
        synthesis: seeded(),
        ..Settings::default()
    };
    let collection = Converter::from_settings(&settings).unwrap().convert().unwrap();
    assert_eq!(
        collection.variable("baseUrl").map(|v| v.value.as_str()),
        Some("https://api.test")
    );
    assert!(collection.variable("apiKey").is_some());
}
