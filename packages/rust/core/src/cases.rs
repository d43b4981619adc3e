//! Reference-case splitting.
//!
//! The clinical-cases source is one large text where each case starts
//! with a `Case <number>` heading and contains `Discussion` and
//! `Diagnoses`/`Diagnosis` sections. Cases missing either section
//! boundary are skipped with a warning; numbering still counts them.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use ddxbuilder_shared::{DdxBuilderError, ReferenceCase, Result};

static CASE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Case \d+.*").expect("valid case heading pattern"));

/// Split a clinical-cases text into reference cases.
pub fn split_cases(text: &str) -> Vec<ReferenceCase> {
    let chunks: Vec<&str> = CASE_HEADING.split(text).collect();
    let mut cases = Vec::new();

    // chunk 0 is the front matter before the first case heading
    for (idx, chunk) in chunks.iter().enumerate().skip(1) {
        let case_number = idx as u32;
        let clean = chunk.replace('\n', " ");

        let Some(discussion_idx) = clean.find("Discussion") else {
            tracing::warn!(case_number, "no Discussion section, skipping case");
            continue;
        };
        let Some(diagnosis_idx) = clean.find("Diagnoses").or_else(|| clean.find("Diagnosis"))
        else {
            tracing::warn!(case_number, "no Diagnoses/Diagnosis section, skipping case");
            continue;
        };
        if diagnosis_idx < discussion_idx {
            tracing::warn!(case_number, "diagnosis section precedes discussion, skipping case");
            continue;
        }

        cases.push(ReferenceCase {
            case_number,
            introduction: clean[..discussion_idx].trim().to_string(),
            discussion: clean[discussion_idx..diagnosis_idx].trim().to_string(),
            diagnosis: clean[diagnosis_idx..].trim().to_string(),
        });
    }

    tracing::debug!(cases = cases.len(), "split reference cases");

    cases
}

/// Read and split a clinical-cases file.
pub fn load_cases(path: &Path) -> Result<Vec<ReferenceCase>> {
    let text = std::fs::read_to_string(path).map_err(|e| DdxBuilderError::io(path, e))?;
    Ok(split_cases(&text))
}
