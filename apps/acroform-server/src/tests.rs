//! Integration tests for the fill server API
//!
//! Each test writes a generated template to a temp dir and drives the
//! router through axum-test.

use std::path::PathBuf;
use std::sync::Arc;

use acroform_core::fixtures::FixtureBuilder;
use acroform_core::{survey_document, FieldMap};
use axum_test::TestServer;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use crate::api::{output_filename, MISSING_FIELDS_HEADER};
use crate::{app, AppState};

fn template_bytes() -> Vec<u8> {
    FixtureBuilder::new(1)
        .text_field("dni", 1, [100.0, 700.0, 300.0, 720.0], None)
        .text_field("nombre", 1, [100.0, 670.0, 300.0, 690.0], None)
        .checkbox("sexo_f", 1, [100.0, 640.0, 112.0, 652.0], false)
        .checkbox("sexo_m", 1, [120.0, 640.0, 132.0, 652.0], false)
        .choice_field("plan", 1, [100.0, 600.0, 300.0, 620.0], &["A", "B"], None)
        .build()
}

fn write_template(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("consulta.pdf");
    std::fs::write(&path, template_bytes()).unwrap();
    path
}

fn field_map() -> FieldMap {
    FieldMap::from_json(
        r#"[
            { "field": "dni", "source": "paciente.dni", "transform": "digits" },
            { "field": "sexo_f", "source": "paciente.sexo", "transform": "upper", "equals": "F" },
            { "field": "sexo_m", "source": "paciente.sexo", "transform": "upper", "equals": "M" }
        ]"#,
    )
    .unwrap()
}

/// Create a test server with the full router
fn create_test_server(state: AppState) -> TestServer {
    TestServer::new(app(state)).unwrap()
}

fn state_for(template: PathBuf) -> AppState {
    AppState {
        template,
        field_map: None,
        catalog: None,
    }
}

fn page_text(bytes: &[u8]) -> String {
    let doc = lopdf::Document::load_mem(bytes).unwrap();
    doc.objects
        .values()
        .filter_map(|object| object.as_stream().ok())
        .map(|stream| String::from_utf8_lossy(&stream.content).into_owned())
        .collect()
}

#[tokio::test]
async fn test_health_returns_200() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(state_for(write_template(&dir)));

    let response = server.get("/health").await;
    response.assert_status_ok();

    let json = response.json::<serde_json::Value>();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "acroform-server");
}

#[tokio::test]
async fn test_fill_returns_flattened_pdf() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(state_for(write_template(&dir)));

    let response = server
        .post("/api/fill")
        .json(&json!({
            "fields": { "dni": "12345678", "sexo_f": true, "desconocido": "x" }
        }))
        .await;
    response.assert_status_ok();

    let headers = response.headers();
    assert_eq!(headers["content-type"], "application/pdf");
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=\"consulta-filled.pdf\""
    );
    assert_eq!(headers[MISSING_FIELDS_HEADER], "desconocido");

    let bytes = response.as_bytes().to_vec();
    assert!(bytes.starts_with(b"%PDF"));
    assert!(page_text(&bytes).contains("(12345678) Tj"));
    assert!(survey_document(&bytes).unwrap().catalog.is_empty());
}

#[tokio::test]
async fn test_fill_without_missing_fields_omits_header() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(state_for(write_template(&dir)));

    let response = server
        .post("/api/fill")
        .json(&json!({ "fields": { "nombre": "Ana" }, "filename": "turno 14/03" }))
        .await;
    response.assert_status_ok();

    let headers = response.headers();
    assert!(headers.get(MISSING_FIELDS_HEADER).is_none());
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=\"turno_14_03.pdf\""
    );
}

#[tokio::test]
async fn test_fill_with_unreadable_template_is_500() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.pdf");
    std::fs::write(&path, b"not a pdf").unwrap();
    let server = create_test_server(state_for(path));

    let response = server
        .post("/api/fill")
        .json(&json!({ "fields": { "dni": "1" } }))
        .expect_failure()
        .await;
    assert_eq!(response.status_code(), 500);

    let json = response.json::<serde_json::Value>();
    assert_eq!(json["success"], false);
    assert_eq!(json["code"], "TEMPLATE_UNREADABLE");
}

#[tokio::test]
async fn test_fill_with_missing_template_file_is_500() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(state_for(dir.path().join("absent.pdf")));

    let response = server
        .post("/api/fill")
        .json(&json!({ "fields": {} }))
        .expect_failure()
        .await;
    assert_eq!(response.status_code(), 500);
    assert_eq!(
        response.json::<serde_json::Value>()["code"],
        "TEMPLATE_UNREADABLE"
    );
}

#[tokio::test]
async fn test_mapped_fill_requires_field_map() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(state_for(write_template(&dir)));

    let response = server
        .post("/api/fill/mapped")
        .json(&json!({ "paciente": { "dni": "1" } }))
        .expect_failure()
        .await;
    assert_eq!(response.status_code(), 404);
    assert_eq!(response.json::<serde_json::Value>()["code"], "NO_FIELD_MAP");
}

#[tokio::test]
async fn test_mapped_fill_applies_rules() {
    let dir = TempDir::new().unwrap();
    let mut state = state_for(write_template(&dir));
    state.field_map = Some(Arc::new(field_map()));
    let server = create_test_server(state);

    let response = server
        .post("/api/fill/mapped")
        .json(&json!({
            "paciente": { "dni": "12.345.678", "sexo": "f" },
            "filename": "ana"
        }))
        .await;
    response.assert_status_ok();

    let headers = response.headers();
    assert!(headers.get(MISSING_FIELDS_HEADER).is_none());
    assert_eq!(
        headers["content-disposition"],
        "attachment; filename=\"ana.pdf\""
    );
    assert!(page_text(response.as_bytes()).contains("(12345678) Tj"));
}

#[tokio::test]
async fn test_mapped_fill_rejects_non_object_body() {
    let dir = TempDir::new().unwrap();
    let mut state = state_for(write_template(&dir));
    state.field_map = Some(Arc::new(field_map()));
    let server = create_test_server(state);

    let response = server
        .post("/api/fill/mapped")
        .json(&json!(["dni"]))
        .expect_failure()
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(
        response.json::<serde_json::Value>()["code"],
        "INVALID_REQUEST"
    );
}

#[tokio::test]
async fn test_catalog_enables_choice_fields() {
    let dir = TempDir::new().unwrap();
    let template = write_template(&dir);
    let catalog = survey_document(&template_bytes()).unwrap().catalog;

    let plain = create_test_server(state_for(template.clone()));
    let response = plain
        .post("/api/fill")
        .json(&json!({ "fields": { "plan": "B" } }))
        .await;
    assert_eq!(response.headers()[MISSING_FIELDS_HEADER], "plan");

    let mut state = state_for(template);
    state.catalog = Some(Arc::new(catalog));
    let dispatched = create_test_server(state);
    let response = dispatched
        .post("/api/fill")
        .json(&json!({ "fields": { "plan": "B" } }))
        .await;
    response.assert_status_ok();
    assert!(response.headers().get(MISSING_FIELDS_HEADER).is_none());
}

#[tokio::test]
async fn test_list_fields() {
    let dir = TempDir::new().unwrap();
    let server = create_test_server(state_for(write_template(&dir)));

    let response = server.get("/api/fields").await;
    response.assert_status_ok();

    let json = response.json::<serde_json::Value>();
    assert_eq!(json["success"], true);
    assert_eq!(json["template"], "consulta.pdf");
    assert_eq!(json["count"], 5);
    assert_eq!(
        json["fields"],
        json!(["dni", "nombre", "plan", "sexo_f", "sexo_m"])
    );
}

#[test]
fn test_output_filename_sanitizes_hint() {
    let template = PathBuf::from("/srv/forms/alta.pdf");
    assert_eq!(output_filename(None, &template), "alta-filled.pdf");
    assert_eq!(output_filename(Some("  "), &template), "alta-filled.pdf");
    assert_eq!(output_filename(Some("x.PDF"), &template), "x.PDF");
    assert_eq!(
        output_filename(Some("../etc/passwd"), &template),
        ".._etc_passwd.pdf"
    );
}

