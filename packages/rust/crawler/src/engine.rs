//! Recursive classification-hierarchy crawler.
//!
//! Walks a remote tree-shaped classification catalog depth-first from a root
//! node descriptor, emitting one [`ClassificationEntity`] per true leaf.
//! Per-node fetch failures are logged and skipped; the crawl never fails as a
//! whole because of a single node.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};

use ddxbuilder_shared::{ClassificationEntity, CrawlConfig, DdxBuilderError, Result};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("ddxbuilder/", env!("CARGO_PKG_VERSION"));

/// Path marker separating the release prefix from the node identifier in
/// child references.
const NODE_ID_MARKER: &str = "/mms/";

// ---------------------------------------------------------------------------
// CrawlSummary
// ---------------------------------------------------------------------------

/// Summary of a completed hierarchy crawl.
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    /// Number of nodes fetched successfully.
    pub nodes_visited: usize,
    /// Number of nodes that failed to fetch or parse (subtree skipped).
    pub nodes_failed: usize,
    /// Number of leaf entities emitted.
    pub leaves_emitted: usize,
    /// Total duration of the crawl.
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// Remote node model
// ---------------------------------------------------------------------------

/// A language-tagged value as returned by the classification API.
#[derive(Debug, Deserialize)]
struct LangValue {
    #[serde(rename = "@value", default)]
    value: String,
}

/// An inclusion/exclusion entry carrying a labelled value.
#[derive(Debug, Deserialize)]
struct LabelledEntry {
    #[serde(default)]
    label: Option<LangValue>,
}

/// One node descriptor from the remote hierarchy.
#[derive(Debug, Deserialize)]
struct NodeDescriptor {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    title: Option<LangValue>,
    #[serde(default)]
    definition: Option<LangValue>,
    #[serde(rename = "longdefinition", default)]
    long_definition: Option<LangValue>,
    #[serde(default)]
    inclusion: Vec<LabelledEntry>,
    #[serde(default)]
    exclusion: Vec<LabelledEntry>,
    #[serde(rename = "diagnosticCriteria", default)]
    diagnostic_criteria: Option<LangValue>,
    /// Child node URIs. Absence marks a potential leaf.
    #[serde(default)]
    child: Option<Vec<String>>,
    #[serde(rename = "classKind", default)]
    class_kind: Option<String>,
}

impl NodeDescriptor {
    /// A true leaf: a terminal classification entry with no child references.
    fn is_leaf_category(&self) -> bool {
        self.child.is_none() && self.class_kind.as_deref() == Some("category")
    }
}

// ---------------------------------------------------------------------------
// HierarchyCrawler
// ---------------------------------------------------------------------------

/// Depth-first crawler over the remote classification hierarchy.
pub struct HierarchyCrawler {
    config: CrawlConfig,
    client: Client,
}

/// Shared mutable state for one crawl pass. Appends to `entities` are
/// serialized behind the mutex; sibling subtrees only ever push here.
struct CrawlState {
    visited: Mutex<HashSet<String>>,
    entities: Mutex<Vec<ClassificationEntity>>,
    semaphore: Semaphore,
    nodes_visited: AtomicUsize,
    nodes_failed: AtomicUsize,
}

impl HierarchyCrawler {
    /// Create a new crawler with the given configuration.
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "Accept-Language",
            HeaderValue::from_str(&config.language)
                .map_err(|e| DdxBuilderError::config(format!("invalid language header: {e}")))?,
        );
        headers.insert(
            "API-Version",
            HeaderValue::from_str(&config.api_version)
                .map_err(|e| DdxBuilderError::config(format!("invalid API version header: {e}")))?,
        );

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DdxBuilderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Crawl the hierarchy starting at `root_uri`, returning one entity per
    /// true leaf. Output is sorted by code, so repeated crawls against the
    /// same source are identical regardless of fetch interleaving.
    #[instrument(skip_all, fields(root_uri = %root_uri))]
    pub async fn crawl(
        &self,
        root_uri: &str,
    ) -> Result<(CrawlSummary, Vec<ClassificationEntity>)> {
        let start = std::time::Instant::now();

        let state = Arc::new(CrawlState {
            visited: Mutex::new(HashSet::new()),
            entities: Mutex::new(Vec::new()),
            semaphore: Semaphore::new(self.config.concurrency as usize),
            nodes_visited: AtomicUsize::new(0),
            nodes_failed: AtomicUsize::new(0),
        });

        info!(concurrency = self.config.concurrency, "starting hierarchy crawl");

        self.visit(state.clone(), root_uri.to_string()).await;

        let mut entities = std::mem::take(&mut *state.entities.lock().await);
        entities.sort_by(|a, b| a.code.cmp(&b.code));

        let summary = CrawlSummary {
            nodes_visited: state.nodes_visited.load(Ordering::Relaxed),
            nodes_failed: state.nodes_failed.load(Ordering::Relaxed),
            leaves_emitted: entities.len(),
            duration: start.elapsed(),
        };

        info!(
            nodes_visited = summary.nodes_visited,
            nodes_failed = summary.nodes_failed,
            leaves_emitted = summary.leaves_emitted,
            duration_ms = summary.duration.as_millis(),
            "hierarchy crawl complete"
        );

        Ok((summary, entities))
    }

    /// Visit one node and, recursively, its subtree. Failures mark the node
    /// as failed and abandon the subtree without affecting siblings.
    fn visit(
        &self,
        state: Arc<CrawlState>,
        uri: String,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            // Defensive cycle guard: the contract says the hierarchy is
            // acyclic, but a buggy source must not hang the crawl.
            {
                let mut visited = state.visited.lock().await;
                if !visited.insert(uri.clone()) {
                    warn!(%uri, "node already visited, skipping (possible cycle)");
                    return;
                }
            }

            let node = {
                // Hold the permit only for the fetch itself; recursing while
                // holding it would exhaust the semaphore on deep trees.
                let _permit = state
                    .semaphore
                    .acquire()
                    .await
                    .expect("semaphore closed");
                match self.fetch_node(&uri).await {
                    Ok(node) => node,
                    Err(e) => {
                        warn!(%uri, error = %e, "node fetch failed, skipping subtree");
                        state.nodes_failed.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                }
            };

            state.nodes_visited.fetch_add(1, Ordering::Relaxed);

            if node.is_leaf_category() {
                match build_entity(&node) {
                    Some(entity) => {
                        debug!(code = %entity.code, "leaf entity emitted");
                        state.entities.lock().await.push(entity);
                    }
                    None => {
                        warn!(%uri, "leaf category without a code, skipping");
                        state.nodes_failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            if let Some(children) = &node.child {
                let futures: Vec<_> = children
                    .iter()
                    .map(|child| {
                        let child_uri = self.child_uri(child);
                        self.visit(state.clone(), child_uri)
                    })
                    .collect();
                futures::future::join_all(futures).await;
            }
        })
    }

    /// Fetch and decode one node descriptor.
    async fn fetch_node(&self, uri: &str) -> Result<NodeDescriptor> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| DdxBuilderError::Network(format!("{uri}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DdxBuilderError::Network(format!("{uri}: HTTP {status}")));
        }

        response
            .json::<NodeDescriptor>()
            .await
            .map_err(|e| DdxBuilderError::parse(format!("{uri}: {e}")))
    }

    /// Derive a child node URI: extract the trailing path segment from the
    /// child reference and substitute it into the configured URI template.
    fn child_uri(&self, child_ref: &str) -> String {
        let id = child_ref
            .rsplit(NODE_ID_MARKER)
            .next()
            .unwrap_or(child_ref);
        self.config.uri_template.replace("{id}", id)
    }
}

// ---------------------------------------------------------------------------
// Entity construction
// ---------------------------------------------------------------------------

/// Build a [`ClassificationEntity`] from a leaf node descriptor.
/// Returns `None` when the node carries no non-empty code.
fn build_entity(node: &NodeDescriptor) -> Option<ClassificationEntity> {
    let code = node.code.as_deref().map(sanitize)?;
    if code.is_empty() {
        return None;
    }

    Some(ClassificationEntity {
        code,
        title: node.title.as_ref().map(|t| sanitize(&t.value)).unwrap_or_default(),
        definition: lang_field(&node.definition),
        long_definition: lang_field(&node.long_definition),
        inclusions: labels(&node.inclusion),
        exclusions: labels(&node.exclusion),
        diagnostic_criteria: lang_field(&node.diagnostic_criteria),
    })
}

/// Extract a sanitized optional language-tagged value.
fn lang_field(value: &Option<LangValue>) -> Option<String> {
    value
        .as_ref()
        .map(|v| sanitize(&v.value))
        .filter(|s| !s.is_empty())
}

/// Extract sanitized labels from inclusion/exclusion entries, in source order.
fn labels(entries: &[LabelledEntry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|e| e.label.as_ref())
        .map(|l| sanitize(&l.value))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Substitute the internal field delimiter with a safe replacement character.
fn sanitize(value: &str) -> String {
    value.replace(';', "~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddxbuilder_shared::CrawlConfig;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server_uri: &str) -> CrawlConfig {
        CrawlConfig {
            root_uri: format!("{server_uri}/icd/release/11/2025-01/mms"),
            uri_template: format!("{server_uri}/icd/release/11/2025-01/mms/{{id}}"),
            language: "en".into(),
            api_version: "v2".into(),
            concurrency: 2,
            timeout_secs: 5,
        }
    }

    async fn mount_node(server: &MockServer, node_path: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(node_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    /// A three-level hierarchy: root → chapter → two leaves, plus a branch
    /// block that is not a category and must not be emitted.
    async fn mount_small_hierarchy(server: &MockServer) {
        mount_node(
            server,
            "/icd/release/11/2025-01/mms",
            serde_json::json!({
                "classKind": "chapter",
                "child": [
                    "http://id.example/icd/release/11/2025-01/mms/block-1",
                ],
            }),
        )
        .await;

        mount_node(
            server,
            "/icd/release/11/2025-01/mms/block-1",
            serde_json::json!({
                "classKind": "block",
                "title": { "@value": "Neurodevelopmental disorders" },
                "child": [
                    "http://id.example/icd/release/11/2025-01/mms/leaf-a",
                    "http://id.example/icd/release/11/2025-01/mms/leaf-b",
                ],
            }),
        )
        .await;

        mount_node(
            server,
            "/icd/release/11/2025-01/mms/leaf-a",
            serde_json::json!({
                "classKind": "category",
                "code": "6A00.0",
                "title": { "@value": "Disorder of intellectual development, mild" },
                "definition": { "@value": "Intellectual functioning 2-3 SD below the mean" },
                "inclusion": [
                    { "label": { "@value": "mild mental retardation" } },
                ],
                "exclusion": [],
            }),
        )
        .await;

        mount_node(
            server,
            "/icd/release/11/2025-01/mms/leaf-b",
            serde_json::json!({
                "classKind": "category",
                "code": "6A01",
                "title": { "@value": "Developmental speech sound disorder; articulation" },
                "diagnosticCriteria": { "@value": "Persistent errors in speech sound production" },
            }),
        )
        .await;
    }

    #[tokio::test]
    async fn crawl_emits_only_leaf_categories() {
        let server = MockServer::start().await;
        mount_small_hierarchy(&server).await;

        let crawler = HierarchyCrawler::new(test_config(&server.uri())).unwrap();
        let (summary, entities) = crawler
            .crawl(&format!("{}/icd/release/11/2025-01/mms", server.uri()))
            .await
            .unwrap();

        assert_eq!(summary.leaves_emitted, 2);
        assert_eq!(summary.nodes_visited, 4);
        assert_eq!(summary.nodes_failed, 0);

        let codes: Vec<&str> = entities.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["6A00.0", "6A01"]);

        let leaf_a = &entities[0];
        assert_eq!(leaf_a.inclusions, vec!["mild mental retardation"]);
        assert!(leaf_a.definition.as_deref().unwrap().contains("2-3 SD"));
    }

    #[tokio::test]
    async fn crawl_is_idempotent() {
        let server = MockServer::start().await;
        mount_small_hierarchy(&server).await;

        let crawler = HierarchyCrawler::new(test_config(&server.uri())).unwrap();
        let root = format!("{}/icd/release/11/2025-01/mms", server.uri());

        let (_, first) = crawler.crawl(&root).await.unwrap();
        let (_, second) = crawler.crawl(&root).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn delimiter_is_sanitized_in_all_fields() {
        let server = MockServer::start().await;
        mount_small_hierarchy(&server).await;

        let crawler = HierarchyCrawler::new(test_config(&server.uri())).unwrap();
        let (_, entities) = crawler
            .crawl(&format!("{}/icd/release/11/2025-01/mms", server.uri()))
            .await
            .unwrap();

        let leaf_b = entities.iter().find(|e| e.code == "6A01").unwrap();
        assert_eq!(
            leaf_b.title,
            "Developmental speech sound disorder~ articulation"
        );
    }

    #[tokio::test]
    async fn failed_node_skips_subtree_but_not_siblings() {
        let server = MockServer::start().await;

        mount_node(
            &server,
            "/icd/release/11/2025-01/mms",
            serde_json::json!({
                "classKind": "chapter",
                "child": [
                    "http://id.example/icd/release/11/2025-01/mms/broken",
                    "http://id.example/icd/release/11/2025-01/mms/ok",
                ],
            }),
        )
        .await;

        Mock::given(method("GET"))
            .and(path("/icd/release/11/2025-01/mms/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        mount_node(
            &server,
            "/icd/release/11/2025-01/mms/ok",
            serde_json::json!({
                "classKind": "category",
                "code": "6B00",
                "title": { "@value": "Generalised anxiety disorder" },
            }),
        )
        .await;

        let crawler = HierarchyCrawler::new(test_config(&server.uri())).unwrap();
        let (summary, entities) = crawler
            .crawl(&format!("{}/icd/release/11/2025-01/mms", server.uri()))
            .await
            .unwrap();

        assert_eq!(summary.nodes_failed, 1);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].code, "6B00");
    }

    #[tokio::test]
    async fn cyclic_reference_terminates() {
        let server = MockServer::start().await;

        // The child points back at the root node id.
        mount_node(
            &server,
            "/icd/release/11/2025-01/mms/self",
            serde_json::json!({
                "classKind": "block",
                "child": ["http://id.example/icd/release/11/2025-01/mms/self"],
            }),
        )
        .await;

        let crawler = HierarchyCrawler::new(test_config(&server.uri())).unwrap();
        let (summary, entities) = crawler
            .crawl(&format!("{}/icd/release/11/2025-01/mms/self", server.uri()))
            .await
            .unwrap();

        assert_eq!(summary.nodes_visited, 1);
        assert!(entities.is_empty());
    }

    #[tokio::test]
    async fn request_carries_negotiation_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/icd/release/11/2025-01/mms"))
            .and(header("Accept", "application/json"))
            .and(header("Accept-Language", "en"))
            .and(header("API-Version", "v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "classKind": "category",
                "code": "6A05",
                "title": { "@value": "ADHD" },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let crawler = HierarchyCrawler::new(test_config(&server.uri())).unwrap();
        let (_, entities) = crawler
            .crawl(&format!("{}/icd/release/11/2025-01/mms", server.uri()))
            .await
            .unwrap();
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn child_uri_extracts_trailing_segment() {
        let config = CrawlConfig {
            root_uri: "http://localhost/icd/release/11/2025-01/mms".into(),
            uri_template: "http://localhost/icd/release/11/2025-01/mms/{id}".into(),
            language: "en".into(),
            api_version: "v2".into(),
            concurrency: 1,
            timeout_secs: 5,
        };
        let crawler = HierarchyCrawler::new(config).unwrap();

        assert_eq!(
            crawler.child_uri("http://id.who.int/icd/release/11/2025-01/mms/1234567"),
            "http://localhost/icd/release/11/2025-01/mms/1234567"
        );
        // References without the marker pass through unchanged.
        assert_eq!(
            crawler.child_uri("9999"),
            "http://localhost/icd/release/11/2025-01/mms/9999"
        );
    }
}
