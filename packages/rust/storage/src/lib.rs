//! libSQL storage layer for the ddxbuilder knowledge base.
//!
//! The [`Storage`] struct wraps a libSQL database holding classification
//! entities, corpus segments, fused knowledge records, flattened decision
//! nodes, reference cases, and ingest job history.
//!
//! **Access rules:**
//! - Ingest pipeline: read-write (sole writer) via [`Storage::open`]
//! - Diagnosis service: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};

use ddxbuilder_shared::{
    ClassificationEntity, DdxBuilderError, DecisionNode, FusedKnowledgeRecord, IngestJobId,
    NodeKind, ReferenceCase, Result, TextSegment,
};

/// Delimiter for stored inclusion/exclusion label lists. Crawled text is
/// sanitized so labels can never contain it.
const LABEL_DELIMITER: char = ';';

/// Outcome of an upsert-if-changed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the key; a new row was written.
    Inserted,
    /// A row existed with different content; it was rewritten.
    Updated,
    /// A row existed with identical content; nothing was written.
    Unchanged,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DdxBuilderError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for the diagnosis service).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DdxBuilderError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DdxBuilderError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Entity operations
    // -----------------------------------------------------------------------

    /// Upsert a classification entity, writing only if the stored row
    /// differs field-by-field from `entity`.
    pub async fn upsert_entity(&self, entity: &ClassificationEntity) -> Result<UpsertOutcome> {
        self.check_writable()?;
        let existing = self.get_entity(&entity.code).await?;
        let now = Utc::now().to_rfc3339();

        match existing {
            Some(current) if current == *entity => Ok(UpsertOutcome::Unchanged),
            Some(_) => {
                self.conn
                    .execute(
                        "UPDATE entities SET title = ?1, definition = ?2, long_definition = ?3,
                           inclusions = ?4, exclusions = ?5, diagnostic_criteria = ?6, updated_at = ?7
                         WHERE code = ?8",
                        params![
                            entity.title.as_str(),
                            entity.definition.as_deref(),
                            entity.long_definition.as_deref(),
                            join_labels(&entity.inclusions),
                            join_labels(&entity.exclusions),
                            entity.diagnostic_criteria.as_deref(),
                            now.as_str(),
                            entity.code.as_str(),
                        ],
                    )
                    .await
                    .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO entities (code, title, definition, long_definition,
                           inclusions, exclusions, diagnostic_criteria, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            entity.code.as_str(),
                            entity.title.as_str(),
                            entity.definition.as_deref(),
                            entity.long_definition.as_deref(),
                            join_labels(&entity.inclusions),
                            join_labels(&entity.exclusions),
                            entity.diagnostic_criteria.as_deref(),
                            now.as_str(),
                        ],
                    )
                    .await
                    .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Get an entity by code.
    pub async fn get_entity(&self, code: &str) -> Result<Option<ClassificationEntity>> {
        let mut rows = self
            .conn
            .query(
                "SELECT code, title, definition, long_definition, inclusions, exclusions,
                   diagnostic_criteria
                 FROM entities WHERE code = ?1",
                params![code],
            )
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_entity(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DdxBuilderError::Storage(e.to_string())),
        }
    }

    /// List all entities, ordered by code.
    pub async fn list_entities(&self) -> Result<Vec<ClassificationEntity>> {
        let mut rows = self
            .conn
            .query(
                "SELECT code, title, definition, long_definition, inclusions, exclusions,
                   diagnostic_criteria
                 FROM entities ORDER BY code",
                params![],
            )
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_entity(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Segment operations
    // -----------------------------------------------------------------------

    /// Replace all stored segments with `segments`, preserving their order.
    pub async fn replace_segments(&self, segments: &[TextSegment]) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM segments", params![])
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        for (position, segment) in segments.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT INTO segments (position, anchor_code, body) VALUES (?1, ?2, ?3)",
                    params![
                        position as i64,
                        segment.anchor_code.as_str(),
                        segment.body.as_str()
                    ],
                )
                .await
                .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
        }

        tracing::debug!(segments = segments.len(), "replaced segment table");
        Ok(())
    }

    /// List all segments in document order.
    pub async fn list_segments(&self) -> Result<Vec<TextSegment>> {
        let mut rows = self
            .conn
            .query(
                "SELECT anchor_code, body FROM segments ORDER BY position",
                params![],
            )
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(TextSegment {
                anchor_code: row
                    .get::<String>(0)
                    .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
                body: row
                    .get::<String>(1)
                    .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Fused record operations
    // -----------------------------------------------------------------------

    /// Upsert a fused record, writing only if the stored row differs.
    pub async fn upsert_fused_record(&self, record: &FusedKnowledgeRecord) -> Result<UpsertOutcome> {
        self.check_writable()?;
        let existing = self.get_fused_record(&record.code).await?;
        let now = Utc::now().to_rfc3339();

        match existing {
            Some(current) if current == *record => Ok(UpsertOutcome::Unchanged),
            Some(_) => {
                self.conn
                    .execute(
                        "UPDATE fused_records SET title = ?1, prompt = ?2, raw_body = ?3, updated_at = ?4
                         WHERE code = ?5",
                        params![
                            record.title.as_str(),
                            record.prompt.as_str(),
                            record.raw_body.as_str(),
                            now.as_str(),
                            record.code.as_str(),
                        ],
                    )
                    .await
                    .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO fused_records (code, title, prompt, raw_body, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            record.code.as_str(),
                            record.title.as_str(),
                            record.prompt.as_str(),
                            record.raw_body.as_str(),
                            now.as_str(),
                        ],
                    )
                    .await
                    .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Get a fused record by code.
    pub async fn get_fused_record(&self, code: &str) -> Result<Option<FusedKnowledgeRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT code, title, prompt, raw_body FROM fused_records WHERE code = ?1",
                params![code],
            )
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_fused_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DdxBuilderError::Storage(e.to_string())),
        }
    }

    /// List all fused records, ordered by code.
    pub async fn list_fused_records(&self) -> Result<Vec<FusedKnowledgeRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT code, title, prompt, raw_body FROM fused_records ORDER BY code",
                params![],
            )
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_fused_record(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Decision node operations
    // -----------------------------------------------------------------------

    /// Replace all stored decision nodes with `nodes`, preserving their order.
    pub async fn replace_decision_nodes(&self, nodes: &[DecisionNode]) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM decision_nodes", params![])
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        for (position, node) in nodes.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT INTO decision_nodes (position, root_label, level, kind, value, parent_label)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        position as i64,
                        node.root_label.as_str(),
                        i64::from(node.level),
                        node.kind.as_str(),
                        node.value.as_str(),
                        node.parent_label.as_deref(),
                    ],
                )
                .await
                .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
        }

        tracing::debug!(nodes = nodes.len(), "replaced decision node table");
        Ok(())
    }

    /// List all decision nodes in document order.
    pub async fn list_decision_nodes(&self) -> Result<Vec<DecisionNode>> {
        let mut rows = self
            .conn
            .query(
                "SELECT root_label, level, kind, value, parent_label
                 FROM decision_nodes ORDER BY position",
                params![],
            )
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_decision_node(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Reference case operations
    // -----------------------------------------------------------------------

    /// Upsert a reference case by case number, writing only on difference.
    pub async fn upsert_reference_case(&self, case: &ReferenceCase) -> Result<UpsertOutcome> {
        self.check_writable()?;
        let existing = self.get_reference_case(case.case_number).await?;
        let now = Utc::now().to_rfc3339();

        match existing {
            Some(current) if current == *case => Ok(UpsertOutcome::Unchanged),
            Some(_) => {
                self.conn
                    .execute(
                        "UPDATE reference_cases SET introduction = ?1, discussion = ?2,
                           diagnosis = ?3, updated_at = ?4
                         WHERE case_number = ?5",
                        params![
                            case.introduction.as_str(),
                            case.discussion.as_str(),
                            case.diagnosis.as_str(),
                            now.as_str(),
                            i64::from(case.case_number),
                        ],
                    )
                    .await
                    .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO reference_cases (case_number, introduction, discussion, diagnosis, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            i64::from(case.case_number),
                            case.introduction.as_str(),
                            case.discussion.as_str(),
                            case.diagnosis.as_str(),
                            now.as_str(),
                        ],
                    )
                    .await
                    .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Get a reference case by case number.
    pub async fn get_reference_case(&self, case_number: u32) -> Result<Option<ReferenceCase>> {
        let mut rows = self
            .conn
            .query(
                "SELECT case_number, introduction, discussion, diagnosis
                 FROM reference_cases WHERE case_number = ?1",
                params![i64::from(case_number)],
            )
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_reference_case(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DdxBuilderError::Storage(e.to_string())),
        }
    }

    /// List all reference cases, ordered by case number.
    pub async fn list_reference_cases(&self) -> Result<Vec<ReferenceCase>> {
        let mut rows = self
            .conn
            .query(
                "SELECT case_number, introduction, discussion, diagnosis
                 FROM reference_cases ORDER BY case_number",
                params![],
            )
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_reference_case(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Ingest job operations
    // -----------------------------------------------------------------------

    /// Insert a new ingest job for `phase`. Returns the generated job ID.
    pub async fn insert_ingest_job(&self, phase: &str) -> Result<IngestJobId> {
        self.check_writable()?;
        let id = IngestJobId::new();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO ingest_jobs (id, phase, started_at) VALUES (?1, ?2, ?3)",
                params![id.to_string(), phase, now.as_str()],
            )
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Mark an ingest job finished, recording its stats.
    pub async fn finish_ingest_job(&self, job_id: &IngestJobId, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE ingest_jobs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, job_id.to_string()],
            )
            .await
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mappers / label encoding
// ---------------------------------------------------------------------------

fn join_labels(labels: &[String]) -> String {
    labels.join(&LABEL_DELIMITER.to_string())
}

fn split_labels(joined: &str) -> Vec<String> {
    joined
        .split(LABEL_DELIMITER)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

fn row_to_entity(row: &libsql::Row) -> Result<ClassificationEntity> {
    Ok(ClassificationEntity {
        code: row
            .get::<String>(0)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        title: row
            .get::<String>(1)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        definition: row.get::<String>(2).ok(),
        long_definition: row.get::<String>(3).ok(),
        inclusions: split_labels(
            &row.get::<String>(4)
                .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        ),
        exclusions: split_labels(
            &row.get::<String>(5)
                .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        ),
        diagnostic_criteria: row.get::<String>(6).ok(),
    })
}

fn row_to_fused_record(row: &libsql::Row) -> Result<FusedKnowledgeRecord> {
    Ok(FusedKnowledgeRecord {
        code: row
            .get::<String>(0)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        title: row
            .get::<String>(1)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        prompt: row
            .get::<String>(2)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        raw_body: row
            .get::<String>(3)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
    })
}

fn row_to_decision_node(row: &libsql::Row) -> Result<DecisionNode> {
    let kind_text: String = row
        .get(2)
        .map_err(|e| DdxBuilderError::Storage(e.to_string()))?;
    let kind: NodeKind = kind_text
        .parse()
        .map_err(|e: String| DdxBuilderError::Storage(e))?;

    Ok(DecisionNode {
        root_label: row
            .get::<String>(0)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        level: row
            .get::<i64>(1)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))? as u32,
        kind,
        value: row
            .get::<String>(3)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        parent_label: row.get::<String>(4).ok(),
    })
}

fn row_to_reference_case(row: &libsql::Row) -> Result<ReferenceCase> {
    Ok(ReferenceCase {
        case_number: row
            .get::<i64>(0)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))? as u32,
        introduction: row
            .get::<String>(1)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        discussion: row
            .get::<String>(2)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
        diagnosis: row
            .get::<String>(3)
            .map_err(|e| DdxBuilderError::Storage(e.to_string()))?,
    })
}
