//! Knowledge fusion: join classification leaves with corpus segments.

use ddxbuilder_shared::{ClassificationEntity, FusedKnowledgeRecord, TextSegment};

/// Inner-join entities and segments on code, synthesizing one narrative
/// prompt per pair. When a code joins several segments, the record with
/// the longest prompt survives (the first one on exact ties).
pub fn fuse(
    entities: &[ClassificationEntity],
    segments: &[TextSegment],
) -> Vec<FusedKnowledgeRecord> {
    let mut records: Vec<FusedKnowledgeRecord> = Vec::new();

    for entity in entities {
        for segment in segments.iter().filter(|s| s.anchor_code == entity.code) {
            let candidate = FusedKnowledgeRecord {
                code: entity.code.clone(),
                title: entity.title.clone(),
                prompt: synthesize_prompt(entity, &segment.body),
                raw_body: segment.body.clone(),
            };

            match records.iter_mut().find(|r| r.code == candidate.code) {
                Some(existing) => {
                    if candidate.prompt.chars().count() > existing.prompt.chars().count() {
                        *existing = candidate;
                    }
                }
                None => records.push(candidate),
            }
        }
    }

    tracing::debug!(records = records.len(), "fused entities with segments");

    records
}

/// Build the single-line narrative prompt for one entity/body pair.
///
/// Clause order is fixed; the name/code/symptoms header is omitted
/// wholesale when the entity has no definition.
fn synthesize_prompt(entity: &ClassificationEntity, body: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(definition) = &entity.definition {
        parts.push(format!(
            "Disorder Name: {} Disorder Code: {} Disorder symptoms: {}",
            entity.title, entity.code, definition
        ));
    }
    if !entity.inclusions.is_empty() {
        let inclusions = entity.inclusions.join("; ");
        parts.push(format!(
            "If you have {inclusions} other inclusions could be: {inclusions}"
        ));
    }
    if !entity.exclusions.is_empty() {
        parts.push(format!(
            "If you diagnose this disease exclude: {}",
            entity.exclusions.join("; ")
        ));
    }
    if let Some(criteria) = &entity.diagnostic_criteria {
        parts.push(format!(
            "The Diagnostic Criteria for this disorder: {criteria}"
        ));
    }
    parts.push(body.to_string());

    normalize_line(&parts.join(" "))
}

/// Strip quote characters and collapse all whitespace runs (including
/// line breaks) to single spaces.
fn normalize_line(raw: &str) -> String {
    let cleaned = raw.replace(['"', '\u{201c}', '\u{201d}'], "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(code: &str, definition: Option<&str>) -> ClassificationEntity {
        ClassificationEntity {
            code: code.into(),
            title: format!("Disorder {code}"),
            definition: definition.map(str::to_string),
            long_definition: None,
            inclusions: vec![],
            exclusions: vec![],
            diagnostic_criteria: None,
        }
    }

    fn segment(code: &str, body: &str) -> TextSegment {
        TextSegment {
            anchor_code: code.into(),
            body: body.into(),
        }
    }

    #[test]
    fn inner_join_drops_one_sided_codes() {
        let entities = [entity("6A00", Some("def")), entity("6A01", Some("def"))];
        let segments = [segment("6A01", "body"), segment("6B99", "orphan body")];

        let records = fuse(&entities, &segments);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].code, "6A01");
    }

    #[test]
    fn header_omitted_without_definition() {
        let entities = [entity("6A00", None)];
        let segments = [segment("6A00", "segment body text")];

        let records = fuse(&entities, &segments);

        assert!(!records[0].prompt.contains("Disorder Name"));
        assert!(records[0].prompt.contains("segment body text"));
    }

    #[test]
    fn prompt_clauses_in_fixed_order() {
        let e = ClassificationEntity {
            code: "6B00".into(),
            title: "Generalised anxiety disorder".into(),
            definition: Some("marked symptoms of anxiety".into()),
            long_definition: None,
            inclusions: vec!["Anxiety neurosis".into()],
            exclusions: vec!["Anxious distress".into()],
            diagnostic_criteria: Some("persistent for several months".into()),
        };
        let records = fuse(&[e], &[segment("6B00", "full body")]);
        let prompt = &records[0].prompt;

        let name = prompt.find("Disorder Name:").expect("header");
        let inc = prompt.find("If you have").expect("inclusions");
        let exc = prompt.find("If you diagnose").expect("exclusions");
        let crit = prompt.find("The Diagnostic Criteria").expect("criteria");
        let body = prompt.find("full body").expect("body");
        assert!(name < inc && inc < exc && exc < crit && crit < body);

        assert!(prompt.contains(
            "If you have Anxiety neurosis other inclusions could be: Anxiety neurosis"
        ));
    }

    #[test]
    fn longest_prompt_wins_per_code() {
        let entities = [entity("6A00", Some("def"))];
        let segments = [
            segment("6A00", "short"),
            segment("6A00", "a much longer segment body that wins"),
            segment("6A00", "mid-length body"),
        ];

        let records = fuse(&entities, &segments);

        assert_eq!(records.len(), 1);
        assert!(records[0].raw_body.contains("that wins"));
    }

    #[test]
    fn first_wins_on_exact_tie() {
        let entities = [entity("6A00", Some("def"))];
        let segments = [segment("6A00", "body one"), segment("6A00", "body two")];

        let records = fuse(&entities, &segments);

        assert_eq!(records[0].raw_body, "body one");
    }

    #[test]
    fn prompt_is_single_plain_line() {
        let entities = [entity("6A00", Some("line one\nline two"))];
        let segments = [segment("6A00", "body with \"quotes\"\nand breaks")];

        let records = fuse(&entities, &segments);

        assert!(!records[0].prompt.contains('\n'));
        assert!(!records[0].prompt.contains('"'));
        assert!(records[0].prompt.contains("line one line two"));
    }
}
