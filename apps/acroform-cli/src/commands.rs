//! Subcommand implementations

use std::path::{Path, PathBuf};

use acroform_core::{
    inject, inject_with_catalog, list_field_names, survey_document, survey_many, DocumentFailure,
    FieldCatalog, FieldMap, FillPayload, SourceDocument,
};
use anyhow::{bail, Context, Result};
use tracing::{info, warn};

pub struct FillArgs {
    pub template: PathBuf,
    pub payload: PathBuf,
    pub catalog: Option<PathBuf>,
    pub field_map: Option<PathBuf>,
    pub output: PathBuf,
}

pub fn survey(pdfs: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let catalog = survey_paths(pdfs)?;
    match output {
        Some(path) => {
            catalog
                .save(path)
                .with_context(|| format!("writing catalog {}", path.display()))?;
            info!(
                "Wrote {} field names to {}",
                catalog.len(),
                path.display()
            );
        }
        None => println!("{}", catalog.to_json_pretty()?),
    }
    Ok(())
}

/// Survey one document untagged, or several merged and tagged by file name.
///
/// Fails only when every document failed.
fn survey_paths(pdfs: &[PathBuf]) -> Result<FieldCatalog> {
    if let [pdf] = pdfs {
        let bytes = read(pdf)?;
        let outcome =
            survey_document(&bytes).with_context(|| format!("surveying {}", pdf.display()))?;
        for skipped in &outcome.skipped {
            warn!("{}: skipped '{}' ({})", pdf.display(), skipped.name, skipped.reason);
        }
        return Ok(outcome.catalog);
    }

    let mut failures = Vec::new();
    let mut documents = Vec::with_capacity(pdfs.len());
    for pdf in pdfs {
        match std::fs::read(pdf) {
            Ok(bytes) => documents.push(SourceDocument::new(source_name(pdf), bytes)),
            Err(e) => failures.push(DocumentFailure {
                source: source_name(pdf),
                error: e.to_string(),
            }),
        }
    }

    let survey = survey_many(&documents);
    failures.extend(survey.failures);

    for failure in &failures {
        eprintln!("{}: {}", failure.source, failure.error);
    }
    for (source, skipped) in &survey.skipped {
        warn!("{}: skipped '{}' ({})", source, skipped.name, skipped.reason);
    }
    if failures.len() == pdfs.len() {
        bail!("all {} documents failed", pdfs.len());
    }

    info!(
        "Surveyed {} of {} documents",
        pdfs.len() - failures.len(),
        pdfs.len()
    );
    Ok(survey.catalog)
}

pub fn fields(pdf: &Path) -> Result<()> {
    let bytes = read(pdf)?;
    for name in list_field_names(&bytes)? {
        println!("{}", name);
    }
    Ok(())
}

pub fn fill(args: &FillArgs) -> Result<()> {
    let template = read(&args.template)?;
    let payload = load_payload(&args.payload, args.field_map.as_deref())?;

    let result = match &args.catalog {
        Some(path) => {
            let catalog = FieldCatalog::load(path)
                .with_context(|| format!("loading catalog {}", path.display()))?;
            inject_with_catalog(&template, &payload, &catalog)?
        }
        None => inject(&template, &payload)?,
    };

    if !result.missing_fields.is_empty() {
        warn!(
            "Fields not found in template: {}",
            result.missing_fields.join(", ")
        );
    }

    std::fs::write(&args.output, &result.bytes)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        "Wrote {} ({} bytes)",
        args.output.display(),
        result.bytes.len()
    );
    Ok(())
}

fn load_payload(path: &Path, field_map: Option<&Path>) -> Result<FillPayload> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading payload {}", path.display()))?;

    match field_map {
        Some(map_path) => {
            let map = FieldMap::load(map_path)
                .with_context(|| format!("loading field map {}", map_path.display()))?;
            let body: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("parsing payload {}", path.display()))?;
            Ok(map.apply(&body))
        }
        None => serde_json::from_str(&text)
            .with_context(|| format!("payload {} is not a flat field map", path.display())),
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use acroform_core::fixtures::FixtureBuilder;
    use acroform_core::FieldValue;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn form_with(name: &str) -> Vec<u8> {
        FixtureBuilder::new(1)
            .text_field(name, 1, [100.0, 700.0, 300.0, 720.0], None)
            .build()
    }

    #[test]
    fn test_survey_merges_and_tags_documents() {
        let dir = TempDir::new().unwrap();
        let pdfs = vec![
            write(&dir, "doc1.pdf", &form_with("X")),
            write(&dir, "doc2.pdf", &form_with("X")),
        ];
        let output = dir.path().join("catalog.json");

        survey(&pdfs, Some(&output)).unwrap();

        let catalog = FieldCatalog::load(&output).unwrap();
        let x = catalog.get("X").unwrap();
        assert_eq!(x.len(), 2);
        assert_eq!((x[0].occurrence, x[0].source_pdf.as_deref()), (1, Some("doc1.pdf")));
        assert_eq!((x[1].occurrence, x[1].source_pdf.as_deref()), (2, Some("doc2.pdf")));
    }

    #[test]
    fn test_survey_of_single_document_is_untagged() {
        let dir = TempDir::new().unwrap();
        let pdfs = vec![write(&dir, "solo.pdf", &form_with("dni"))];

        let catalog = survey_paths(&pdfs).unwrap();
        assert_eq!(catalog.get("dni").unwrap()[0].source_pdf, None);
    }

    #[test]
    fn test_survey_tolerates_partial_failure() {
        let dir = TempDir::new().unwrap();
        let pdfs = vec![
            write(&dir, "bad.pdf", b"not a pdf"),
            dir.path().join("absent.pdf"),
            write(&dir, "good.pdf", &form_with("dni")),
        ];

        let catalog = survey_paths(&pdfs).unwrap();
        assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["dni"]);
    }

    #[test]
    fn test_survey_fails_when_every_document_fails() {
        let dir = TempDir::new().unwrap();
        let pdfs = vec![
            write(&dir, "a.pdf", b"junk"),
            write(&dir, "b.pdf", b"junk"),
        ];
        assert!(survey_paths(&pdfs).is_err());
    }

    #[test]
    fn test_fill_with_field_map() {
        let dir = TempDir::new().unwrap();
        let template = write(&dir, "t.pdf", &form_with("dni"));
        let payload = write(&dir, "body.json", br#"{"paciente":{"dni":"12.345.678"}}"#);
        let field_map = write(
            &dir,
            "map.json",
            br#"[{"field":"dni","source":"paciente.dni","transform":"digits"}]"#,
        );
        let output = dir.path().join("out.pdf");

        fill(&FillArgs {
            template,
            payload,
            catalog: None,
            field_map: Some(field_map),
            output: output.clone(),
        })
        .unwrap();

        let filled = std::fs::read(&output).unwrap();
        assert!(survey_document(&filled).unwrap().catalog.is_empty());
    }

    #[test]
    fn test_flat_payload_is_parsed_directly() {
        let dir = TempDir::new().unwrap();
        let payload = write(&dir, "p.json", br#"{"dni":"1","ok":true,"nada":null}"#);

        let parsed = load_payload(&payload, None).unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(parsed["ok"].is_strict_true());
        assert_eq!(parsed["dni"].as_text(), "1");
    }

    #[test]
    fn test_nested_payload_without_map_is_rejected() {
        let dir = TempDir::new().unwrap();
        let payload = write(&dir, "p.json", br#"{"paciente":{"dni":"1"}}"#);
        assert!(load_payload(&payload, None).is_err());
    }

    #[test]
    fn test_surveyed_value_reflects_template() {
        let dir = TempDir::new().unwrap();
        let pdf = FixtureBuilder::new(1)
            .text_field("nombre", 1, [10.0, 10.0, 110.0, 30.0], Some("Ana"))
            .build();
        let pdfs = vec![write(&dir, "t.pdf", &pdf)];

        let catalog = survey_paths(&pdfs).unwrap();
        assert_eq!(
            catalog.get("nombre").unwrap()[0].value,
            Some(FieldValue::Text("Ana".into()))
        );
    }
}
