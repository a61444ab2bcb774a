//! Field Injector
//!
//! Writes a flat payload into a template's fields and flattens the result.
//! Every call parses the template afresh; no document handle outlives a
//! call.

use tracing::{debug, info};

use crate::document::FormDocument;
use crate::error::{FieldError, FormError};
use crate::model::{FieldCatalog, FieldKind, FillPayload, FillValue, InjectionResult};

/// How a payload entry is matched to a field setter
#[derive(Debug, Clone, Copy)]
enum Dispatch<'a> {
    /// Try text, then checkbox
    Trial,
    /// Use the kind recorded in a prior survey; unknown names fall back to `Trial`
    Catalog(&'a FieldCatalog),
}

/// Fill `template` with `payload`, trying each name as text then checkbox.
///
/// Names that match no text or checkbox field are reported in
/// [`InjectionResult::missing_fields`]. Fails only when the template cannot
/// be parsed or the output cannot be serialized.
pub fn inject(template: &[u8], payload: &FillPayload) -> Result<InjectionResult, FormError> {
    run(template, payload, Dispatch::Trial)
}

/// Fill `template` using the field kinds recorded in `catalog`.
///
/// Choice fields can only be filled this way. Names absent from the catalog
/// fall back to trying text then checkbox.
pub fn inject_with_catalog(
    template: &[u8],
    payload: &FillPayload,
    catalog: &FieldCatalog,
) -> Result<InjectionResult, FormError> {
    run(template, payload, Dispatch::Catalog(catalog))
}

fn run(
    template: &[u8],
    payload: &FillPayload,
    dispatch: Dispatch<'_>,
) -> Result<InjectionResult, FormError> {
    let mut form = FormDocument::load(template)?;
    let mut missing_fields = Vec::new();

    for (name, value) in payload {
        let outcome = match dispatch {
            Dispatch::Catalog(catalog) => match catalog.kind_of(name) {
                Some(kind) => write_kind(&mut form, name, kind, value),
                None => fill_by_trial(&mut form, name, value),
            },
            Dispatch::Trial => fill_by_trial(&mut form, name, value),
        };

        if let Err(e) = outcome {
            debug!("Payload field not placed: {}", e);
            missing_fields.push(name.clone());
        }
    }

    let bytes = form.flatten().into_bytes()?;
    info!(
        "Injected {} of {} payload fields ({} bytes)",
        payload.len() - missing_fields.len(),
        payload.len(),
        bytes.len()
    );

    Ok(InjectionResult {
        bytes,
        missing_fields,
    })
}

fn fill_by_trial(
    form: &mut FormDocument,
    name: &str,
    value: &FillValue,
) -> Result<(), FieldError> {
    form.set_text(name, &value.as_text())
        .or_else(|_| form.set_checked(name, value.is_strict_true()))
}

fn write_kind(
    form: &mut FormDocument,
    name: &str,
    kind: FieldKind,
    value: &FillValue,
) -> Result<(), FieldError> {
    match kind {
        FieldKind::Text => form.set_text(name, &value.as_text()),
        FieldKind::Checkbox => form.set_checked(name, value.is_strict_true()),
        FieldKind::Choice => form.set_choice(name, &value.as_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::FixtureBuilder;
    use crate::model::FieldValue;
    use crate::survey::survey_document;
    use lopdf::Document;
    use pretty_assertions::assert_eq;

    fn clinic_template() -> Vec<u8> {
        FixtureBuilder::new(1)
            .text_field("dni", 1, [100.0, 700.0, 300.0, 720.0], None)
            .text_field("nombre", 1, [100.0, 670.0, 300.0, 690.0], Some("previo"))
            .checkbox("sexo_f", 1, [100.0, 640.0, 112.0, 652.0], false)
            .checkbox("sexo_m", 1, [120.0, 640.0, 132.0, 652.0], true)
            .choice_field("plan", 1, [100.0, 600.0, 300.0, 620.0], &["A", "B"], None)
            .build()
    }

    fn payload(json: &str) -> FillPayload {
        serde_json::from_str(json).unwrap()
    }

    fn flattened_content(bytes: &[u8]) -> String {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = doc.get_pages()[&1];
        let mut out = String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned();
        for object in doc.objects.values() {
            if let Ok(stream) = object.as_stream() {
                out.push_str(&String::from_utf8_lossy(&stream.content));
            }
        }
        out
    }

    #[test]
    fn test_missing_fields_are_payload_minus_template() {
        let result = inject(
            &clinic_template(),
            &payload(r#"{"dni":"12345678","unknown-field":"x"}"#),
        )
        .unwrap();

        assert_eq!(result.missing_fields, vec!["unknown-field".to_string()]);
        assert!(flattened_content(&result.bytes).contains("(12345678) Tj"));
    }

    #[test]
    fn test_flattened_output_has_no_fields() {
        let result = inject(&clinic_template(), &payload(r#"{"dni":"1"}"#)).unwrap();
        let outcome = survey_document(&result.bytes).unwrap();
        assert!(outcome.catalog.is_empty());
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn test_injection_is_idempotent_on_template() {
        let template = clinic_template();
        let body = payload(r#"{"dni":"12345678","sexo_f":true,"nombre":"Ana Núñez"}"#);
        let first = inject(&template, &body).unwrap();
        let second = inject(&template, &body).unwrap();
        assert_eq!(first.bytes, second.bytes);
        assert!(first.missing_fields.is_empty());
    }

    /// Survey a document after in-memory edits, before flattening
    fn survey_after_edit(form: FormDocument) -> FieldCatalog {
        survey_document(&form.into_editable_bytes()).unwrap().catalog
    }

    #[test]
    fn test_checkbox_coercion_is_strict() {
        let template = clinic_template();
        let cases = [
            (r#"{"sexo_f":true}"#, true),
            (r#"{"sexo_f":false}"#, false),
            (r#"{"sexo_f":null}"#, false),
            (r#"{"sexo_f":"true"}"#, false),
        ];
        for (body, expected) in cases {
            let mut form = FormDocument::load(&template).unwrap();
            fill_by_trial(&mut form, "sexo_f", &payload(body)["sexo_f"]).unwrap();
            let catalog = survey_after_edit(form);
            assert_eq!(
                catalog.get("sexo_f").unwrap()[0].value,
                Some(FieldValue::Flag(expected)),
                "payload {}",
                body
            );
        }
    }

    #[test]
    fn test_string_true_does_not_check_box_through_inject() {
        let result = inject(&clinic_template(), &payload(r#"{"sexo_f":"true"}"#)).unwrap();
        assert!(result.missing_fields.is_empty());
    }

    #[test]
    fn test_absent_checkbox_stays_as_template() {
        let template = clinic_template();
        let mut form = FormDocument::load(&template).unwrap();
        fill_by_trial(&mut form, "dni", &FillValue::from("1")).unwrap();
        let catalog = survey_after_edit(form);
        assert_eq!(
            catalog.get("sexo_m").unwrap()[0].value,
            Some(FieldValue::Flag(true))
        );
        assert_eq!(
            catalog.get("dni").unwrap()[0].value,
            Some(FieldValue::Text("1".into()))
        );
    }

    #[test]
    fn test_null_clears_text_field() {
        let mut form = FormDocument::load(&clinic_template()).unwrap();
        fill_by_trial(&mut form, "nombre", &FillValue::Unset).unwrap();
        let catalog = survey_after_edit(form);
        assert_eq!(
            catalog.get("nombre").unwrap()[0].value,
            Some(FieldValue::Text(String::new()))
        );
    }

    #[test]
    fn test_trial_cannot_fill_choice_but_catalog_can() {
        let template = clinic_template();
        let body = payload(r#"{"plan":"B"}"#);

        let tried = inject(&template, &body).unwrap();
        assert_eq!(tried.missing_fields, vec!["plan".to_string()]);

        let catalog = survey_document(&template).unwrap().catalog;
        let dispatched = inject_with_catalog(&template, &body, &catalog).unwrap();
        assert!(dispatched.missing_fields.is_empty());
        assert!(flattened_content(&dispatched.bytes).contains("(B) Tj"));
    }

    #[test]
    fn test_catalog_dispatch_falls_back_to_trial() {
        let template = clinic_template();
        let catalog = FieldCatalog::new();
        let result = inject_with_catalog(
            &template,
            &payload(r#"{"dni":"9","sexo_m":false,"otro":"x"}"#),
            &catalog,
        )
        .unwrap();
        assert_eq!(result.missing_fields, vec!["otro".to_string()]);
    }

    #[test]
    fn test_prefilled_values_survive_flattening() {
        let result = inject(&clinic_template(), &payload(r#"{"dni":"1"}"#)).unwrap();
        let content = flattened_content(&result.bytes);
        assert!(content.contains("(1) Tj"));
        assert!(content.contains("(previo) Tj"));
    }

    #[test]
    fn test_owner_password_only_template_is_filled() {
        let template = FixtureBuilder::new(1)
            .text_field("dni", 1, [100.0, 700.0, 300.0, 720.0], Some("30123456"))
            .owner_password_only()
            .build();

        let result = inject(&template, &payload(r#"{"dni":"9"}"#)).unwrap();
        assert!(result.missing_fields.is_empty());
        assert!(flattened_content(&result.bytes).contains("(9) Tj"));
    }

    #[test]
    fn test_unreadable_template_is_fatal() {
        let result = inject(b"garbage", &payload(r#"{"dni":"1"}"#));
        assert!(matches!(result, Err(FormError::Unreadable(_))));
    }
}
