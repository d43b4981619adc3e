//! Core domain types for the ddxbuilder knowledge pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// IngestJobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for ingest job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IngestJobId(pub Uuid);

impl IngestJobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for IngestJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IngestJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for IngestJobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// ClassificationEntity
// ---------------------------------------------------------------------------

/// One leaf of the classification hierarchy, as emitted by the crawler.
///
/// A record exists only for true leaves: nodes with no child references whose
/// `classKind` marks them as a terminal classification entry. Immutable after
/// creation; a new crawl supersedes the whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationEntity {
    /// Unique stable classification code (e.g. `6A00.0`). Never empty.
    pub code: String,
    /// Display title.
    pub title: String,
    /// Short definition text, when the source carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    /// Extended definition text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_definition: Option<String>,
    /// Inclusion labels, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inclusions: Vec<String>,
    /// Exclusion labels, in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<String>,
    /// Free-text diagnostic criteria, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_criteria: Option<String>,
}

// ---------------------------------------------------------------------------
// PageText / TextSegment
// ---------------------------------------------------------------------------

/// One page of the supplementary text corpus, in extraction order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-based page number in the source document.
    pub page_number: u32,
    /// Raw extracted text for this page.
    pub content: String,
}

/// A contiguous span of the supplementary corpus keyed by its anchor code.
///
/// Rebuilt wholesale on every corpus re-ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    /// The anchor code that opened this segment (matches the code pattern).
    pub anchor_code: String,
    /// All text between this anchor and the next, whitespace-normalized and
    /// concatenated across page boundaries. Excludes the anchor tokens.
    pub body: String,
}

// ---------------------------------------------------------------------------
// FusedKnowledgeRecord
// ---------------------------------------------------------------------------

/// The result of joining a classification leaf with its matching text segment.
///
/// Exactly one record survives per code after fusion (longest prompt wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedKnowledgeRecord {
    /// Classification code shared by the leaf and the segment.
    pub code: String,
    /// Leaf title.
    pub title: String,
    /// Derived single-line narrative prompt.
    pub prompt: String,
    /// The raw segment body backing the prompt.
    pub raw_body: String,
}

// ---------------------------------------------------------------------------
// DecisionNode
// ---------------------------------------------------------------------------

/// Branch kind of a flattened decision node, inferred once at ingestion from
/// the original branch key's lexical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Yes,
    No,
    Condition,
}

impl NodeKind {
    /// Infer the kind from a branch key: contains "yes" → `Yes`, contains
    /// "no" → `No`, anything else → `Condition`. Case-insensitive.
    pub fn infer(key: &str) -> Self {
        let lower = key.to_lowercase();
        if lower.contains("yes") {
            Self::Yes
        } else if lower.contains("no") {
            Self::No
        } else {
            Self::Condition
        }
    }

    /// Parse a caller-supplied answer, accepting only the literal strings
    /// `"yes"` and `"no"` (case-insensitive).
    pub fn parse_answer(answer: &str) -> Option<Self> {
        match answer.trim().to_lowercase().as_str() {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            _ => None,
        }
    }

    /// Stable lowercase name, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Condition => "condition",
        }
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "condition" => Ok(Self::Condition),
            other => Err(format!("unknown node kind: {other}")),
        }
    }
}

/// One flattened element of a decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionNode {
    /// Top-level clinical topic this node belongs to.
    pub root_label: String,
    /// Depth from the tree root; strictly increases with nesting.
    pub level: u32,
    /// Inferred branch kind.
    pub kind: NodeKind,
    /// Leaf payload: a question or a terminal diagnosis label.
    pub value: String,
    /// The branch key one level up; absent at the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_label: Option<String>,
}

// ---------------------------------------------------------------------------
// ReferenceCase
// ---------------------------------------------------------------------------

/// A reference clinical case with its recorded diagnosis, used by the
/// similar-case short-circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCase {
    /// Ordinal case number in the source text.
    pub case_number: u32,
    /// Case presentation text.
    pub introduction: String,
    /// Clinical discussion section.
    pub discussion: String,
    /// Recorded diagnosis section.
    pub diagnosis: String,
}

// ---------------------------------------------------------------------------
// Diagnosis request / response
// ---------------------------------------------------------------------------

/// One diagnosis request. Stateless server, stateful protocol: the caller
/// resends the full answer history on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisRequest {
    /// Free-text candidate: a case description or an upstream initial
    /// diagnosis, possibly containing a classification code verbatim.
    pub candidate_text: String,
    /// Prior answers in dialogue order, each the literal string `"yes"` or
    /// `"no"`. Unrecognized entries are ignored during replay.
    #[serde(default)]
    pub previous_answers: Vec<String>,
}

/// The response to a diagnosis request. Always well-formed: lookup failures
/// degrade to [`DiagnosisResponse::FinalDiagnosis`] with empty fields rather
/// than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DiagnosisResponse {
    /// The candidate text contained a known code verbatim; traversal skipped.
    TerminalMatch {
        candidate: String,
        record: FusedKnowledgeRecord,
    },
    /// A reference case met the similarity threshold; its recorded diagnosis
    /// is returned instead of traversing.
    SimilarCase {
        candidate: String,
        case: ReferenceCase,
        similarity: f64,
        diagnosis: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        related_records: Vec<FusedKnowledgeRecord>,
    },
    /// Traversal found a reachable question at the next level.
    NextQuestion {
        candidate: String,
        question: String,
        level: u32,
    },
    /// Traversal halted: the terminal diagnosis one level below, if any,
    /// with the full scoped decision path for inspection.
    FinalDiagnosis {
        candidate: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diagnosis: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        decision_path: Vec<DecisionNode>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        related_records: Vec<FusedKnowledgeRecord>,
    },
}
