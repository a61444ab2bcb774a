//! Catalog and payload types shared by the surveyor and the injector

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FormError;
use crate::geometry::Geometry;

/// Interactive field kind, derived from the inheritable `/FT` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Checkbox,
    Choice,
}

impl FieldKind {
    /// Classify a `/FT` name. Unknown or missing types are treated as text.
    pub fn from_field_type(ft: Option<&[u8]>) -> Self {
        match ft {
            Some(b"Btn") => FieldKind::Checkbox,
            Some(b"Ch") => FieldKind::Choice,
            _ => FieldKind::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Choice => "choice",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current value of a field at survey time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
}

/// One occurrence of a named field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub occurrence: u32,
    pub page: u32,
    pub field_type: FieldKind,
    pub value: Option<FieldValue>,
    #[serde(flatten)]
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_pdf: Option<String>,
}

/// Name → ordered occurrences, serialized with keys sorted by name.
///
/// Occurrence numbers within a name are contiguous from 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldCatalog {
    entries: BTreeMap<String, Vec<FieldDescriptor>>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor under `name`, assigning the next occurrence number
    pub fn push(&mut self, name: impl Into<String>, mut descriptor: FieldDescriptor) {
        let group = self.entries.entry(name.into()).or_default();
        descriptor.occurrence = group.len() as u32 + 1;
        group.push(descriptor);
    }

    /// Merge fragments in the given order, renumbering occurrences per name
    pub fn merge<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = FieldCatalog>,
    {
        let mut merged = FieldCatalog::new();
        for fragment in fragments {
            for (name, descriptors) in fragment.entries {
                for descriptor in descriptors {
                    merged.push(name.clone(), descriptor);
                }
            }
        }
        merged
    }

    /// Tag every descriptor with the document it came from
    pub fn tag_source(&mut self, source: &str) {
        for descriptor in self.entries.values_mut().flatten() {
            descriptor.source_pdf = Some(source.to_string());
        }
    }

    pub fn get(&self, name: &str) -> Option<&[FieldDescriptor]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Kind of the first occurrence of `name`
    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.get(name)
            .and_then(|group| group.first())
            .map(|d| d.field_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FieldDescriptor])> {
        self.entries
            .iter()
            .map(|(name, group)| (name.as_str(), group.as_slice()))
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of descriptors across all names
    pub fn field_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn from_json(json: &str) -> Result<Self, FormError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, FormError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FormError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write the catalog, replacing any previous file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FormError> {
        let mut json = self.to_json_pretty()?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// A value to inject into a named field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Flag(bool),
    Number(serde_json::Number),
    Text(String),
    Unset,
}

impl FillValue {
    /// String form written into text and choice fields. `Unset` clears the field.
    pub fn as_text(&self) -> String {
        match self {
            FillValue::Text(s) => s.clone(),
            FillValue::Flag(b) => b.to_string(),
            FillValue::Number(n) => n.to_string(),
            FillValue::Unset => String::new(),
        }
    }

    /// Only a boolean `true` checks a box
    pub fn is_strict_true(&self) -> bool {
        matches!(self, FillValue::Flag(true))
    }
}

impl From<&str> for FillValue {
    fn from(value: &str) -> Self {
        FillValue::Text(value.to_string())
    }
}

impl From<String> for FillValue {
    fn from(value: String) -> Self {
        FillValue::Text(value)
    }
}

impl From<bool> for FillValue {
    fn from(value: bool) -> Self {
        FillValue::Flag(value)
    }
}

/// Flat field name → value mapping consumed by the injector
pub type FillPayload = BTreeMap<String, FillValue>;

/// Flattened output plus payload names that matched no field
#[derive(Debug, Clone)]
pub struct InjectionResult {
    pub bytes: Vec<u8>,
    pub missing_fields: Vec<String>,
}

/// Why a field was left out of the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyName,
    NoWidget,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyName => write!(f, "empty name"),
            SkipReason::NoWidget => write!(f, "no widget"),
        }
    }
}

/// Diagnostic for a field that could not be catalogued
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedField {
    pub name: String,
    pub reason: SkipReason,
}
