//! Phased ingest pipelines: remote hierarchy → entities; corpus text →
//! segments → fused records; decision trees → nodes; clinical cases →
//! reference cases. Each phase opens storage read-write, records an
//! ingest job, and reports progress through [`ProgressReporter`].

use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument};

use ddxbuilder_crawler::{CrawlSummary, HierarchyCrawler};
use ddxbuilder_shared::{CrawlConfig, IngestJobId, Result, SegmentOptions};
use ddxbuilder_storage::{Storage, UpsertOutcome};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting ingest status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called per processed item within a phase.
    fn item_processed(&self, detail: &str, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_processed(&self, _detail: &str, _current: usize, _total: usize) {}
}

// ---------------------------------------------------------------------------
// Shared stats
// ---------------------------------------------------------------------------

/// Write counts for an upsert-if-changed phase.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertStats {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Hierarchy ingest
// ---------------------------------------------------------------------------

/// Configuration for the hierarchy ingest phase.
#[derive(Debug, Clone)]
pub struct HierarchyIngest {
    /// Path to the knowledge database.
    pub db_path: PathBuf,
    /// Crawl configuration (root URI, template, headers, limits).
    pub crawl: CrawlConfig,
}

/// Result of the hierarchy ingest phase.
#[derive(Debug)]
pub struct HierarchyIngestResult {
    pub job_id: IngestJobId,
    pub summary: CrawlSummary,
    pub stats: UpsertStats,
    pub elapsed: std::time::Duration,
}

/// Crawl the remote classification hierarchy and upsert its leaves.
#[instrument(skip_all, fields(root_uri = %config.crawl.root_uri))]
pub async fn ingest_hierarchy(
    config: &HierarchyIngest,
    progress: &dyn ProgressReporter,
) -> Result<HierarchyIngestResult> {
    let start = Instant::now();

    progress.phase("Opening knowledge database");
    let storage = Storage::open(&config.db_path).await?;
    let job_id = storage.insert_ingest_job("hierarchy").await?;

    progress.phase("Crawling classification hierarchy");
    let crawler = HierarchyCrawler::new(config.crawl.clone())?;
    let (summary, entities) = crawler.crawl(&config.crawl.root_uri).await?;

    progress.phase("Storing classification entities");
    let mut stats = UpsertStats::default();
    let total = entities.len();
    for (i, entity) in entities.iter().enumerate() {
        stats.record(storage.upsert_entity(entity).await?);
        progress.item_processed(&entity.code, i + 1, total);
    }

    storage
        .finish_ingest_job(&job_id, &stats_json(&stats)?)
        .await?;

    let result = HierarchyIngestResult {
        job_id,
        summary,
        stats,
        elapsed: start.elapsed(),
    };

    info!(
        job_id = %result.job_id,
        leaves = result.summary.leaves_emitted,
        inserted = result.stats.inserted,
        updated = result.stats.updated,
        unchanged = result.stats.unchanged,
        elapsed_ms = result.elapsed.as_millis(),
        "hierarchy ingest complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Corpus ingest
// ---------------------------------------------------------------------------

/// Configuration for the corpus ingest phase.
#[derive(Debug, Clone)]
pub struct CorpusIngest {
    /// Path to the knowledge database.
    pub db_path: PathBuf,
    /// Form-feed-paginated corpus text file.
    pub corpus_file: PathBuf,
    /// Anchor-code pattern.
    pub anchor_pattern: String,
    /// First page of the extraction window (1-based, inclusive).
    pub start_page: u32,
    /// Last page of the extraction window (inclusive).
    pub end_page: u32,
    /// Segmentation options.
    pub options: SegmentOptions,
}

/// Result of the corpus ingest phase.
#[derive(Debug)]
pub struct CorpusIngestResult {
    pub job_id: IngestJobId,
    pub pages: usize,
    pub segments: usize,
    pub fused: UpsertStats,
    pub elapsed: std::time::Duration,
}

/// Segment the corpus text and fuse it with the stored entities.
#[instrument(skip_all, fields(corpus_file = %config.corpus_file.display()))]
pub async fn ingest_corpus(
    config: &CorpusIngest,
    progress: &dyn ProgressReporter,
) -> Result<CorpusIngestResult> {
    let start = Instant::now();

    progress.phase("Opening knowledge database");
    let storage = Storage::open(&config.db_path).await?;
    let job_id = storage.insert_ingest_job("corpus").await?;

    progress.phase("Loading corpus pages");
    let mut pages =
        ddxbuilder_segmenter::load_pages(&config.corpus_file, config.start_page, config.end_page)?;
    ddxbuilder_segmenter::overrides::apply_page_overrides(&mut pages);

    progress.phase("Segmenting on anchor codes");
    let anchor = ddxbuilder_segmenter::compile_anchor_pattern(&config.anchor_pattern)?;
    let segments = ddxbuilder_segmenter::segment(&pages, &anchor, &config.options);
    storage.replace_segments(&segments).await?;

    progress.phase("Fusing entities with segments");
    let entities = storage.list_entities().await?;
    let records = crate::fuse::fuse(&entities, &segments);

    let mut fused = UpsertStats::default();
    let total = records.len();
    for (i, record) in records.iter().enumerate() {
        fused.record(storage.upsert_fused_record(record).await?);
        progress.item_processed(&record.code, i + 1, total);
    }

    storage
        .finish_ingest_job(&job_id, &stats_json(&fused)?)
        .await?;

    let result = CorpusIngestResult {
        job_id,
        pages: pages.len(),
        segments: segments.len(),
        fused,
        elapsed: start.elapsed(),
    };

    info!(
        job_id = %result.job_id,
        pages = result.pages,
        segments = result.segments,
        fused_inserted = result.fused.inserted,
        elapsed_ms = result.elapsed.as_millis(),
        "corpus ingest complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Decision-tree ingest
// ---------------------------------------------------------------------------

/// Configuration for the decision-tree ingest phase.
#[derive(Debug, Clone)]
pub struct TreeIngest {
    /// Path to the knowledge database.
    pub db_path: PathBuf,
    /// Directory of decision-tree JSON documents.
    pub trees_dir: PathBuf,
}

/// Result of the decision-tree ingest phase.
#[derive(Debug)]
pub struct TreeIngestResult {
    pub job_id: IngestJobId,
    pub nodes: usize,
    pub elapsed: std::time::Duration,
}

/// Flatten all decision trees and replace the stored node set.
#[instrument(skip_all, fields(trees_dir = %config.trees_dir.display()))]
pub async fn ingest_trees(
    config: &TreeIngest,
    progress: &dyn ProgressReporter,
) -> Result<TreeIngestResult> {
    let start = Instant::now();

    progress.phase("Opening knowledge database");
    let storage = Storage::open(&config.db_path).await?;
    let job_id = storage.insert_ingest_job("trees").await?;

    progress.phase("Flattening decision trees");
    let nodes = ddxbuilder_decision::load_corpus(&config.trees_dir)?;
    storage.replace_decision_nodes(&nodes).await?;

    storage
        .finish_ingest_job(&job_id, &format!(r#"{{"nodes": {}}}"#, nodes.len()))
        .await?;

    let result = TreeIngestResult {
        job_id,
        nodes: nodes.len(),
        elapsed: start.elapsed(),
    };

    info!(
        job_id = %result.job_id,
        nodes = result.nodes,
        elapsed_ms = result.elapsed.as_millis(),
        "decision-tree ingest complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Reference-case ingest
// ---------------------------------------------------------------------------

/// Configuration for the reference-case ingest phase.
#[derive(Debug, Clone)]
pub struct CaseIngest {
    /// Path to the knowledge database.
    pub db_path: PathBuf,
    /// Clinical-cases text file.
    pub cases_file: PathBuf,
}

/// Result of the reference-case ingest phase.
#[derive(Debug)]
pub struct CaseIngestResult {
    pub job_id: IngestJobId,
    pub cases: usize,
    pub stats: UpsertStats,
    pub elapsed: std::time::Duration,
}

/// Split the clinical-cases text and upsert the resulting cases.
#[instrument(skip_all, fields(cases_file = %config.cases_file.display()))]
pub async fn ingest_cases(
    config: &CaseIngest,
    progress: &dyn ProgressReporter,
) -> Result<CaseIngestResult> {
    let start = Instant::now();

    progress.phase("Opening knowledge database");
    let storage = Storage::open(&config.db_path).await?;
    let job_id = storage.insert_ingest_job("cases").await?;

    progress.phase("Splitting clinical cases");
    let cases = crate::cases::load_cases(&config.cases_file)?;

    progress.phase("Storing reference cases");
    let mut stats = UpsertStats::default();
    let total = cases.len();
    for (i, case) in cases.iter().enumerate() {
        stats.record(storage.upsert_reference_case(case).await?);
        progress.item_processed(&format!("case {}", case.case_number), i + 1, total);
    }

    storage
        .finish_ingest_job(&job_id, &stats_json(&stats)?)
        .await?;

    let result = CaseIngestResult {
        job_id,
        cases: cases.len(),
        stats,
        elapsed: start.elapsed(),
    };

    info!(
        job_id = %result.job_id,
        cases = result.cases,
        elapsed_ms = result.elapsed.as_millis(),
        "reference-case ingest complete"
    );

    Ok(result)
}

fn stats_json(stats: &UpsertStats) -> Result<String> {
    serde_json::to_string(stats)
        .map_err(|e| ddxbuilder_shared::DdxBuilderError::parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ddx_pipeline_{}_{name}", Uuid::now_v7()))
    }

    #[tokio::test]
    async fn tree_ingest_roundtrip() {
        let trees_dir = temp_path("trees");
        std::fs::create_dir_all(&trees_dir).expect("create trees dir");
        std::fs::write(
            trees_dir.join("Decision Tree for Depressive Disorders 1.json"),
            r#"{"Q1": {"yes": "diagnosisA", "no": "diagnosisB"}}"#,
        )
        .expect("write tree");

        let config = TreeIngest {
            db_path: temp_path("trees.db"),
            trees_dir: trees_dir.clone(),
        };

        let result = ingest_trees(&config, &SilentProgress).await.expect("ingest");
        assert_eq!(result.nodes, 2);

        let storage = Storage::open_readonly(&config.db_path).await.expect("open");
        let nodes = storage.list_decision_nodes().await.expect("list");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].root_label, "Depressive Disorders");

        std::fs::remove_dir_all(&trees_dir).ok();
    }

    #[tokio::test]
    async fn case_ingest_is_upsert_if_changed() {
        let cases_file = temp_path("cases.txt");
        std::fs::write(
            &cases_file,
            "Case 1 X\nIntro text. Discussion Talk. Diagnosis The answer.",
        )
        .expect("write cases");

        let config = CaseIngest {
            db_path: temp_path("cases.db"),
            cases_file: cases_file.clone(),
        };

        let first = ingest_cases(&config, &SilentProgress).await.expect("first");
        assert_eq!(first.stats.inserted, 1);

        let second = ingest_cases(&config, &SilentProgress).await.expect("second");
        assert_eq!(second.stats.unchanged, 1);
        assert_eq!(second.stats.inserted, 0);

        std::fs::remove_file(&cases_file).ok();
    }
}
