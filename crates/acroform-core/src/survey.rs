//! Field Surveyor
//!
//! Walks every interactive field of a document and records one catalog
//! entry per named field: kind, page, current value and the geometry of its
//! first widget.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::document::FormDocument;
use crate::error::FormError;
use crate::geometry::Geometry;
use crate::model::{FieldCatalog, FieldDescriptor, SkipReason, SkippedField};

/// A named input document for a multi-document survey
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Catalog fragment for one document plus the fields left out of it
#[derive(Debug, Clone, Default)]
pub struct SurveyOutcome {
    pub catalog: FieldCatalog,
    pub skipped: Vec<SkippedField>,
}

/// A document whose survey failed as a whole
#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub source: String,
    pub error: String,
}

/// Merged result of surveying several documents
#[derive(Debug, Clone, Default)]
pub struct MultiSurvey {
    pub catalog: FieldCatalog,
    /// `(source, field)` pairs left out of the catalog
    pub skipped: Vec<(String, SkippedField)>,
    pub failures: Vec<DocumentFailure>,
}

/// Survey a single document.
///
/// Fields with a blank name or without widgets are skipped and reported in
/// [`SurveyOutcome::skipped`]. An unparseable document is an error; callers
/// should treat it as a document with zero fields.
pub fn survey_document(bytes: &[u8]) -> Result<SurveyOutcome, FormError> {
    let form = FormDocument::load(bytes)?;
    let mut outcome = SurveyOutcome::default();

    for field in form.fields() {
        if field.name.trim().is_empty() {
            warn!("Skipping field {:?} with an empty name", field.id);
            outcome.skipped.push(SkippedField {
                name: field.name.clone(),
                reason: SkipReason::EmptyName,
            });
            continue;
        }

        let Some(&widget) = field.widgets.first() else {
            warn!("Skipping field '{}': no widget to place", field.name);
            outcome.skipped.push(SkippedField {
                name: field.name.clone(),
                reason: SkipReason::NoWidget,
            });
            continue;
        };

        // A widget without a usable /Rect is placed at the origin
        let rect = form.widget_rect(widget).unwrap_or_else(|| {
            debug!("Widget of '{}' has no /Rect", field.name);
            [0.0; 4]
        });

        let descriptor = FieldDescriptor {
            occurrence: 0,
            page: form.page_of(widget),
            field_type: field.kind,
            value: form.read_value(field),
            geometry: Geometry::from_rect(rect),
            source_pdf: None,
        };
        debug!(
            "Field '{}' ({}) on page {}",
            field.name, descriptor.field_type, descriptor.page
        );
        outcome.catalog.push(field.name.clone(), descriptor);
    }

    info!(
        "Surveyed {} fields ({} skipped)",
        outcome.catalog.field_count(),
        outcome.skipped.len()
    );
    Ok(outcome)
}

/// Survey several documents in parallel and merge them in input order.
///
/// Descriptors are tagged with their source name and occurrences are
/// renumbered across documents. Documents that fail to parse contribute no
/// fields and are listed in [`MultiSurvey::failures`].
pub fn survey_many(documents: &[SourceDocument]) -> MultiSurvey {
    let results: Vec<(&SourceDocument, Result<SurveyOutcome, FormError>)> = documents
        .par_iter()
        .map(|doc| (doc, survey_document(&doc.bytes)))
        .collect();

    let mut survey = MultiSurvey::default();
    let mut fragments = Vec::with_capacity(results.len());

    for (doc, result) in results {
        match result {
            Ok(mut outcome) => {
                outcome.catalog.tag_source(&doc.name);
                survey.skipped.extend(
                    outcome
                        .skipped
                        .into_iter()
                        .map(|skipped| (doc.name.clone(), skipped)),
                );
                fragments.push(outcome.catalog);
            }
            Err(e) => {
                warn!("Survey of '{}' failed: {}", doc.name, e);
                survey.failures.push(DocumentFailure {
                    source: doc.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    survey.catalog = FieldCatalog::merge(fragments);
    survey
}

/// Sorted, de-duplicated names of every named field in a template.
///
/// Unlike the catalog this includes fields without widgets, which the
/// injector can still write to.
pub fn list_field_names(bytes: &[u8]) -> Result<Vec<String>, FormError> {
    let form = FormDocument::load(bytes)?;
    let names: BTreeSet<&str> = form
        .fields()
        .iter()
        .map(|field| field.name.as_str())
        .filter(|name| !name.trim().is_empty())
        .collect();
    Ok(names.into_iter().map(str::to_string).collect())
}
