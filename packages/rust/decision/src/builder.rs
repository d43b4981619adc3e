//! Decision-tree flattening.
//!
//! Source trees are nested JSON documents where object keys are branch
//! labels ("yes", "no", or a clinical condition) and leaf values are
//! questions or terminal diagnoses. Flattening turns each document into
//! a leveled node list suitable for traversal.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use ddxbuilder_shared::{DdxBuilderError, DecisionNode, NodeKind, Result};

/// Root label used when the file name carries no recognizable topic.
pub const UNKNOWN_ROOT_LABEL: &str = "N/A";

/// Extracts the clinical topic from a tree file name, e.g.
/// `Decision Tree for Depressive Disorders 12.json`.
static TREE_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Decision Tree for (.*?) \d+").expect("valid filename pattern"));

/// Derive the root label for a decision tree from its file name.
pub fn root_label_from_filename(file_name: &str) -> String {
    TREE_FILENAME
        .captures(file_name)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_ROOT_LABEL.to_string())
}

/// Flatten one decision-tree document into leveled nodes.
///
/// Scalar values under an object key become nodes at the enclosing
/// level, with `kind` inferred from the key and `parent_label` set to
/// the branch key one level up. Nested objects and arrays recurse with
/// the level incremented. Document key order is preserved.
pub fn flatten(document: &Value, root_label: &str) -> Vec<DecisionNode> {
    let mut nodes = Vec::new();
    walk(document, 0, None, root_label, &mut nodes);
    nodes
}

fn walk(
    value: &Value,
    level: u32,
    parent_label: Option<&str>,
    root_label: &str,
    out: &mut Vec<DecisionNode>,
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if child.is_object() || child.is_array() {
                    walk(child, level + 1, Some(key), root_label, out);
                } else {
                    out.push(DecisionNode {
                        root_label: root_label.to_string(),
                        level,
                        kind: NodeKind::infer(key),
                        value: scalar_text(child),
                        parent_label: parent_label.map(str::to_string),
                    });
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, level + 1, parent_label, root_label, out);
            }
        }
        // A bare scalar document has no branch key to hang a node on.
        _ => {}
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Load and flatten every `.json` decision tree under `dir`.
///
/// Files are processed in name order. Unreadable or malformed documents
/// are logged and skipped; the batch continues.
pub fn load_corpus(dir: &Path) -> Result<Vec<DecisionNode>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| DdxBuilderError::io(dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut nodes = Vec::new();

    for path in &paths {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let root_label = root_label_from_filename(file_name);

        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable decision tree");
                continue;
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(document) => {
                let flat = flatten(&document, &root_label);
                tracing::debug!(
                    path = %path.display(),
                    root_label = %root_label,
                    nodes = flat.len(),
                    "flattened decision tree"
                );
                nodes.extend(flat);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping malformed decision tree");
            }
        }
    }

    tracing::info!(files = paths.len(), nodes = nodes.len(), "loaded decision corpus");

    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_branches_with_levels() {
        let doc = json!({
            "Q1": {
                "yes": "diagnosisA",
                "no": {
                    "Q2": { "yes": "diagnosisB" }
                }
            }
        });

        let nodes = flatten(&doc, "Topic");

        assert_eq!(nodes.len(), 2);

        assert_eq!(nodes[0].level, 1);
        assert_eq!(nodes[0].kind, NodeKind::Yes);
        assert_eq!(nodes[0].value, "diagnosisA");
        assert_eq!(nodes[0].parent_label.as_deref(), Some("Q1"));

        assert_eq!(nodes[1].level, 3);
        assert_eq!(nodes[1].kind, NodeKind::Yes);
        assert_eq!(nodes[1].value, "diagnosisB");
        assert_eq!(nodes[1].parent_label.as_deref(), Some("Q2"));
    }

    #[test]
    fn condition_kind_for_non_branch_keys() {
        let doc = json!({ "Does the patient report low mood?": "ask about duration" });
        let nodes = flatten(&doc, "Topic");

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].level, 0);
        assert_eq!(nodes[0].kind, NodeKind::Condition);
        assert_eq!(nodes[0].parent_label, None);
    }

    #[test]
    fn arrays_recurse_preserving_parent() {
        let doc = json!({
            "Q1": [
                { "yes": "diagnosisA" },
                { "no": "diagnosisB" }
            ]
        });

        let nodes = flatten(&doc, "Topic");

        assert_eq!(nodes.len(), 2);
        // object at level 1 -> array items at level 2
        assert_eq!(nodes[0].level, 2);
        assert_eq!(nodes[0].parent_label.as_deref(), Some("Q1"));
        assert_eq!(nodes[1].kind, NodeKind::No);
    }

    #[test]
    fn non_string_scalars_stringified() {
        let doc = json!({ "yes": 3 });
        let nodes = flatten(&doc, "Topic");
        assert_eq!(nodes[0].value, "3");
    }

    #[test]
    fn root_label_extraction() {
        assert_eq!(
            root_label_from_filename("Decision Tree for Depressive Disorders 12.json"),
            "Depressive Disorders"
        );
        assert_eq!(root_label_from_filename("notes.json"), UNKNOWN_ROOT_LABEL);
    }

    #[test]
    fn malformed_document_skipped_not_fatal() {
        let dir = std::env::temp_dir().join(format!(
            "ddxbuilder-decision-corpus-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");

        std::fs::write(
            dir.join("Decision Tree for Anxiety Disorders 3.json"),
            r#"{"Q1": {"yes": "diagnosisA"}}"#,
        )
        .expect("write tree");
        std::fs::write(dir.join("Decision Tree for Broken 1.json"), "{not json")
            .expect("write broken tree");

        let nodes = load_corpus(&dir).expect("load corpus");
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].root_label, "Anxiety Disorders");
    }
}
