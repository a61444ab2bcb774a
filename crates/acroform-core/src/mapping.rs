//! Declarative mapping from a nested business body to a flat payload
//!
//! The injector never normalizes values. A [`FieldMap`] does that step ahead
//! of it: each rule picks a value by dotted path, applies a transform and
//! either copies it into a template field or compares it with a literal to
//! drive one box of an option group.
//!
//! ```json
//! [
//!   { "field": "dni", "source": "paciente.dni", "transform": "digits" },
//!   { "field": "sexo_f", "source": "paciente.sexo", "transform": "upper", "equals": "F" }
//! ]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FormError;
use crate::model::{FillPayload, FillValue};

/// Normalization applied to a source value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    #[default]
    None,
    Trim,
    Digits,
    Upper,
}

impl Transform {
    fn apply(&self, value: &str) -> String {
        match self {
            Transform::None => value.to_string(),
            Transform::Trim => value.trim().to_string(),
            Transform::Digits => value.chars().filter(char::is_ascii_digit).collect(),
            Transform::Upper => value.trim().to_uppercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapRule {
    /// Template field name
    pub field: String,
    /// Dotted path into the request body (`paciente.dni`, `items.0.code`)
    pub source: String,
    #[serde(default)]
    pub transform: Transform,
    /// When set, the rule yields `true` if the transformed value equals it
    #[serde(default)]
    pub equals: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap {
    rules: Vec<MapRule>,
}

impl FieldMap {
    pub fn new(rules: Vec<MapRule>) -> Self {
        Self { rules }
    }

    pub fn from_json(json: &str) -> Result<Self, FormError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FormError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn rules(&self) -> &[MapRule] {
        &self.rules
    }

    /// Build a flat payload. Unresolvable paths yield `Unset`.
    ///
    /// When several rules target the same field the last one wins.
    pub fn apply(&self, body: &Value) -> FillPayload {
        let mut payload = FillPayload::new();
        for rule in &self.rules {
            let raw = lookup(body, &rule.source).and_then(scalar_text);
            let value = match (&rule.equals, raw) {
                (Some(expected), Some(raw)) => {
                    FillValue::Flag(rule.transform.apply(&raw) == *expected)
                }
                (Some(_), None) => FillValue::Flag(false),
                (None, Some(raw)) => match lookup(body, &rule.source) {
                    Some(Value::Bool(b)) => FillValue::Flag(*b),
                    _ => FillValue::Text(rule.transform.apply(&raw)),
                },
                (None, None) => FillValue::Unset,
            };
            payload.insert(rule.field.clone(), value);
        }
        payload
    }
}

fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(body, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
