//! Stateless diagnosis traversal over the flattened decision corpus.
//!
//! The engine holds no per-caller state: every request carries the full
//! answer history, which is replayed from level 0 before the next step
//! is computed. Concurrent requests share only the immutable corpus.

use ddxbuilder_shared::{
    ClassificationEntity, DecisionNode, DiagnosisRequest, DiagnosisResponse, FusedKnowledgeRecord,
    NodeKind, ReferenceCase, TraversalOptions,
};

use crate::similarity::sequence_ratio;

// ---------------------------------------------------------------------------
// DiagnosisCorpus
// ---------------------------------------------------------------------------

/// The complete read-only knowledge base a serving process traverses.
/// Loaded once; replaced wholesale on reload, never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct DiagnosisCorpus {
    /// Classification leaves, for inclusion-label lookups.
    pub entities: Vec<ClassificationEntity>,
    /// Fused knowledge records, one per code.
    pub records: Vec<FusedKnowledgeRecord>,
    /// Flattened decision nodes across all tree documents.
    pub nodes: Vec<DecisionNode>,
    /// Reference cases for the similar-case lookup.
    pub cases: Vec<ReferenceCase>,
}

impl DiagnosisCorpus {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.nodes.is_empty() && self.cases.is_empty()
    }

    /// Fused records related to a diagnosis name: the name appears in the
    /// record's code or in one of the matching leaf's inclusion labels.
    /// Case-insensitive; an empty name matches nothing.
    pub fn related_records(&self, name: &str) -> Vec<FusedKnowledgeRecord> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        self.records
            .iter()
            .filter(|record| {
                record.code.to_lowercase().contains(&needle)
                    || self.entities.iter().any(|entity| {
                        entity.code == record.code
                            && entity
                                .inclusions
                                .iter()
                                .any(|label| label.to_lowercase().contains(&needle))
                    })
            })
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// TraversalEngine
// ---------------------------------------------------------------------------

/// Computes the next question or terminal diagnosis for one request.
pub struct TraversalEngine<'a> {
    corpus: &'a DiagnosisCorpus,
    options: TraversalOptions,
}

impl<'a> TraversalEngine<'a> {
    pub fn new(corpus: &'a DiagnosisCorpus, options: TraversalOptions) -> Self {
        Self { corpus, options }
    }

    /// Resolve one diagnosis request. Never fails: lookups that find
    /// nothing degrade to a [`DiagnosisResponse::FinalDiagnosis`] with
    /// empty diagnostic fields.
    pub fn diagnose(&self, request: &DiagnosisRequest) -> DiagnosisResponse {
        let candidate = request.candidate_text.clone();

        if let Some(record) = self.exact_code_match(&candidate) {
            tracing::debug!(code = %record.code, "exact code match, skipping traversal");
            return DiagnosisResponse::TerminalMatch {
                candidate,
                record: record.clone(),
            };
        }

        if let Some((case, similarity)) = self.most_similar_case(&candidate) {
            tracing::debug!(
                case_number = case.case_number,
                similarity,
                "similar reference case met threshold"
            );
            let diagnosis = case.diagnosis.clone();
            let related_records = self.corpus.related_records(&diagnosis);
            return DiagnosisResponse::SimilarCase {
                candidate,
                case: case.clone(),
                similarity,
                diagnosis,
                related_records,
            };
        }

        let scoped = self.scoped_nodes(&candidate);
        let current_level = replay(&scoped, &request.previous_answers);

        if let Some((question, level)) = next_question(&scoped, current_level, None) {
            return DiagnosisResponse::NextQuestion {
                candidate,
                question,
                level,
            };
        }

        // Traversal halted: the terminal diagnosis, if any, sits one
        // level below the last reached level.
        let diagnosis = scoped
            .iter()
            .find(|node| node.level == current_level + 1)
            .map(|node| node.value.clone());
        let related_records = self.corpus.related_records(&candidate);

        DiagnosisResponse::FinalDiagnosis {
            candidate,
            diagnosis,
            decision_path: scoped,
            related_records,
        }
    }

    /// A known code appearing verbatim in the candidate text ends the
    /// request immediately. The longest (most specific) matching code wins.
    fn exact_code_match(&self, candidate: &str) -> Option<&FusedKnowledgeRecord> {
        let mut best: Option<&FusedKnowledgeRecord> = None;

        for record in &self.corpus.records {
            if record.code.is_empty() || !candidate.contains(&record.code) {
                continue;
            }
            if best.is_none_or(|b| record.code.len() > b.code.len()) {
                best = Some(record);
            }
        }

        best
    }

    /// Best reference case by introduction-text similarity, accepted only
    /// at or above the configured threshold. Earlier cases win exact ties.
    fn most_similar_case(&self, candidate: &str) -> Option<(&ReferenceCase, f64)> {
        let mut best: Option<(&ReferenceCase, f64)> = None;

        for case in &self.corpus.cases {
            let ratio = sequence_ratio(candidate, &case.introduction);
            if ratio >= self.options.similarity_threshold
                && best.is_none_or(|(_, b)| ratio > b)
            {
                best = Some((case, ratio));
            }
        }

        best
    }

    /// Decision nodes whose root label contains the candidate text,
    /// case-insensitive, ordered by level (document order within a level).
    fn scoped_nodes(&self, candidate: &str) -> Vec<DecisionNode> {
        let needle = candidate.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut nodes: Vec<DecisionNode> = self
            .corpus
            .nodes
            .iter()
            .filter(|node| node.root_label.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        nodes.sort_by_key(|node| node.level);
        nodes
    }
}

// ---------------------------------------------------------------------------
// Transition step
// ---------------------------------------------------------------------------

/// Fold the answer history into the level reached. Unrecognized answers
/// are skipped; an exhausted branch stops the fold at the last level
/// regardless of remaining history.
fn replay(scoped: &[DecisionNode], answers: &[String]) -> u32 {
    let mut current_level = 0;

    for answer in answers {
        let Some(kind) = NodeKind::parse_answer(answer) else {
            tracing::debug!(answer = %answer, "ignoring unrecognized answer during replay");
            continue;
        };
        match next_question(scoped, current_level, Some(kind)) {
            Some((_, level)) => current_level = level,
            None => break,
        }
    }

    current_level
}

/// Scan level `current_level + 1` for a reachable question. With a
/// previous answer, only nodes of that kind are eligible; the first
/// `condition`-kind node in document order is returned.
fn next_question(
    nodes: &[DecisionNode],
    current_level: u32,
    previous: Option<NodeKind>,
) -> Option<(String, u32)> {
    let next_level = current_level + 1;

    nodes
        .iter()
        .filter(|node| node.level == next_level)
        .filter(|node| previous.is_none_or(|p| node.kind == p))
        .find(|node| node.kind == NodeKind::Condition)
        .map(|node| (node.value.clone(), next_level))
}
