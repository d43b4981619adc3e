//! Diagnosis service: owns the in-memory corpus and answers requests.
//!
//! The corpus is loaded once from storage and treated as immutable for
//! the lifetime of the service; [`DiagnosisService::reload`] swaps in a
//! freshly loaded corpus wholesale.

use std::path::Path;

use tracing::{info, instrument};

use ddxbuilder_decision::{DiagnosisCorpus, TraversalEngine};
use ddxbuilder_shared::{DiagnosisRequest, DiagnosisResponse, Result, TraversalOptions};
use ddxbuilder_storage::Storage;

/// A loaded, ready-to-serve diagnosis corpus with its traversal options.
pub struct DiagnosisService {
    corpus: DiagnosisCorpus,
    options: TraversalOptions,
}

impl DiagnosisService {
    /// Load the full corpus from the database at `db_path` (read-only).
    #[instrument(skip_all, fields(db_path = %db_path.display()))]
    pub async fn load(db_path: &Path, options: TraversalOptions) -> Result<Self> {
        let storage = Storage::open_readonly(db_path).await?;
        let corpus = load_corpus(&storage).await?;

        info!(
            entities = corpus.entities.len(),
            records = corpus.records.len(),
            nodes = corpus.nodes.len(),
            cases = corpus.cases.len(),
            "diagnosis corpus loaded"
        );

        Ok(Self { corpus, options })
    }

    /// Replace the in-memory corpus with a freshly loaded one.
    pub async fn reload(&mut self, db_path: &Path) -> Result<()> {
        let storage = Storage::open_readonly(db_path).await?;
        self.corpus = load_corpus(&storage).await?;
        info!("diagnosis corpus reloaded");
        Ok(())
    }

    /// Answer one diagnosis request.
    pub fn diagnose(&self, request: &DiagnosisRequest) -> DiagnosisResponse {
        TraversalEngine::new(&self.corpus, self.options.clone()).diagnose(request)
    }

    /// The currently loaded corpus.
    pub fn corpus(&self) -> &DiagnosisCorpus {
        &self.corpus
    }
}

async fn load_corpus(storage: &Storage) -> Result<DiagnosisCorpus> {
    Ok(DiagnosisCorpus {
        entities: storage.list_entities().await?,
        records: storage.list_fused_records().await?,
        nodes: storage.list_decision_nodes().await?,
        cases: storage.list_reference_cases().await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddxbuilder_shared::FusedKnowledgeRecord;
    use uuid::Uuid;

    #[tokio::test]
    async fn service_loads_and_diagnoses_from_storage() {
        let db_path = std::env::temp_dir().join(format!("ddx_service_{}.db", Uuid::now_v7()));

        let storage = Storage::open(&db_path).await.expect("open rw");
        storage
            .upsert_fused_record(&FusedKnowledgeRecord {
                code: "6A02".into(),
                title: "Autism spectrum disorder".into(),
                prompt: "Disorder Name: Autism spectrum disorder".into(),
                raw_body: "body".into(),
            })
            .await
            .expect("upsert record");
        drop(storage);

        let service = DiagnosisService::load(
            &db_path,
            TraversalOptions {
                similarity_threshold: 0.7,
            },
        )
        .await
        .expect("load service");

        let response = service.diagnose(&DiagnosisRequest {
            candidate_text: "likely 6A02 presentation".into(),
            previous_answers: vec![],
        });

        match response {
            DiagnosisResponse::TerminalMatch { record, .. } => assert_eq!(record.code, "6A02"),
            other => panic!("expected terminal match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reload_swaps_corpus_wholesale() {
        let db_path = std::env::temp_dir().join(format!("ddx_service_{}.db", Uuid::now_v7()));

        {
            let storage = Storage::open(&db_path).await.expect("open rw");
            storage
                .upsert_fused_record(&FusedKnowledgeRecord {
                    code: "6A00".into(),
                    title: "t".into(),
                    prompt: "p".into(),
                    raw_body: "b".into(),
                })
                .await
                .expect("upsert");
        }

        let mut service = DiagnosisService::load(
            &db_path,
            TraversalOptions {
                similarity_threshold: 0.7,
            },
        )
        .await
        .expect("load");
        assert_eq!(service.corpus().records.len(), 1);

        {
            let storage = Storage::open(&db_path).await.expect("reopen rw");
            storage
                .upsert_fused_record(&FusedKnowledgeRecord {
                    code: "6A01".into(),
                    title: "t".into(),
                    prompt: "p".into(),
                    raw_body: "b".into(),
                })
                .await
                .expect("upsert second");
        }

        service.reload(&db_path).await.expect("reload");
        assert_eq!(service.corpus().records.len(), 2);
    }
}
