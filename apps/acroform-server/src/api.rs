//! API handlers for the form server
//!
//! Provides REST endpoints for:
//! - Filling the configured template from a flat payload
//! - Filling it from a nested business body through the field map
//! - Listing the template's field names

use std::path::Path;

use acroform_core::{inject, inject_with_catalog, list_field_names, FillPayload, InjectionResult};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::AppState;

/// Header listing payload names that matched no template field
pub const MISSING_FIELDS_HEADER: &str = "x-missing-fields";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "acroform-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Field list response
#[derive(Serialize)]
pub struct FieldListResponse {
    pub success: bool,
    pub template: String,
    pub fields: Vec<String>,
    pub count: usize,
}

/// Handler: GET /api/fields
pub async fn handle_list_fields(
    State(state): State<AppState>,
) -> Result<Json<FieldListResponse>, ServerError> {
    let template = read_template(&state.template).await?;
    let fields = tokio::task::spawn_blocking(move || list_field_names(&template))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    let count = fields.len();
    Ok(Json(FieldListResponse {
        success: true,
        template: template_label(&state.template),
        fields,
        count,
    }))
}

/// Fill request body
#[derive(Deserialize)]
pub struct FillRequest {
    /// Flat field name → value payload
    pub fields: FillPayload,

    /// Output filename hint
    #[serde(default)]
    pub filename: Option<String>,
}

/// Handler: POST /api/fill
pub async fn handle_fill(
    State(state): State<AppState>,
    Json(req): Json<FillRequest>,
) -> Result<Response, ServerError> {
    info!("Fill request with {} fields", req.fields.len());
    fill(&state, req.fields, req.filename).await
}

/// Handler: POST /api/fill/mapped
pub async fn handle_fill_mapped(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ServerError> {
    let field_map = state.field_map.as_ref().ok_or(ServerError::NoFieldMap)?;
    if !body.is_object() {
        return Err(ServerError::InvalidRequest(
            "Body must be a JSON object".to_string(),
        ));
    }

    let payload = field_map.apply(&body);
    let filename = body
        .get("filename")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    info!("Mapped fill request produced {} fields", payload.len());
    debug!("Mapped payload: {:?}", payload);

    fill(&state, payload, filename).await
}

async fn fill(
    state: &AppState,
    payload: FillPayload,
    filename: Option<String>,
) -> Result<Response, ServerError> {
    let template = read_template(&state.template).await?;
    let catalog = state.catalog.clone();

    let result: InjectionResult = tokio::task::spawn_blocking(move || match catalog.as_deref() {
        Some(catalog) => inject_with_catalog(&template, &payload, catalog),
        None => inject(&template, &payload),
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))??;

    if !result.missing_fields.is_empty() {
        warn!(
            "Payload fields not found in template: {}",
            result.missing_fields.join(", ")
        );
    }

    let filename = output_filename(filename.as_deref(), &state.template);
    Ok(pdf_response(result, &filename))
}

async fn read_template(path: &Path) -> Result<Vec<u8>, ServerError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ServerError::TemplateUnreadable(format!("{}: {}", path.display(), e)))
}

fn pdf_response(result: InjectionResult, filename: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if !result.missing_fields.is_empty() {
        match HeaderValue::from_str(&result.missing_fields.join(",")) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(MISSING_FIELDS_HEADER), value);
            }
            Err(_) => warn!("Missing field names are not valid header text"),
        }
    }

    (StatusCode::OK, headers, result.bytes).into_response()
}

fn template_label(template: &Path) -> String {
    template
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| template.display().to_string())
}

/// Sanitized attachment name: the hint if given, else `<template>-filled.pdf`
pub fn output_filename(hint: Option<&str>, template: &Path) -> String {
    let base = match hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hint) => hint.to_string(),
        None => {
            let stem = template
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());
            format!("{}-filled", stem)
        }
    };

    let mut name: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        name.push_str(".pdf");
    }
    name
}
