//! AcroForm survey and fill pipeline
//!
//! This crate reads and writes PDF form fields using lopdf.
//!
//! Two stages share only the catalog file format:
//! - `survey_document` / `survey_many`: extract a [`FieldCatalog`] with each
//!   field's kind, page, value and widget geometry (points and millimetres)
//! - `inject` / `inject_with_catalog`: write a flat [`FillPayload`] into a
//!   template and flatten it into a static document

pub mod appearance;
pub mod document;
pub mod error;
pub mod geometry;
pub mod inject;
pub mod mapping;
pub mod model;
pub mod survey;
pub mod text;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use document::{FlattenedDocument, FormDocument, FormField};
pub use error::{FieldError, FormError};
pub use geometry::{Geometry, PT_TO_MM};
pub use inject::{inject, inject_with_catalog};
pub use mapping::{FieldMap, MapRule, Transform};
pub use model::{
    FieldCatalog, FieldDescriptor, FieldKind, FieldValue, FillPayload, FillValue,
    InjectionResult, SkipReason, SkippedField,
};
pub use survey::{
    list_field_names, survey_document, survey_many, DocumentFailure, MultiSurvey,
    SourceDocument, SurveyOutcome,
};
