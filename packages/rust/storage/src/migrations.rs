//! SQL migration definitions for the ddxbuilder knowledge database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description:
            "Initial schema: entities, segments, fused_records, decision_nodes, reference_cases, ingest_jobs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Classification hierarchy leaves. Inclusion/exclusion label lists are
-- stored semicolon-joined; crawled text is sanitized so the delimiter
-- cannot occur inside a label.
CREATE TABLE IF NOT EXISTS entities (
    code                TEXT PRIMARY KEY,
    title               TEXT NOT NULL,
    definition          TEXT,
    long_definition     TEXT,
    inclusions          TEXT NOT NULL DEFAULT '',
    exclusions          TEXT NOT NULL DEFAULT '',
    diagnostic_criteria TEXT,
    updated_at          TEXT NOT NULL
);

-- Anchor-code corpus segments, replaced wholesale per ingestion.
-- `position` preserves document order.
CREATE TABLE IF NOT EXISTS segments (
    position    INTEGER PRIMARY KEY,
    anchor_code TEXT NOT NULL,
    body        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_segments_anchor ON segments(anchor_code);

-- Fused knowledge records, one per code.
CREATE TABLE IF NOT EXISTS fused_records (
    code       TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    prompt     TEXT NOT NULL,
    raw_body   TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Flattened decision-tree nodes, replaced wholesale per ingestion.
-- `position` preserves document order, which traversal tie-breaks rely on.
CREATE TABLE IF NOT EXISTS decision_nodes (
    position     INTEGER PRIMARY KEY,
    root_label   TEXT NOT NULL,
    level        INTEGER NOT NULL,
    kind         TEXT NOT NULL,
    value        TEXT NOT NULL,
    parent_label TEXT
);

CREATE INDEX IF NOT EXISTS idx_decision_nodes_root ON decision_nodes(root_label);

-- Reference clinical cases for the similar-case lookup.
CREATE TABLE IF NOT EXISTS reference_cases (
    case_number  INTEGER PRIMARY KEY,
    introduction TEXT NOT NULL,
    discussion   TEXT NOT NULL,
    diagnosis    TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

-- Ingest job history
CREATE TABLE IF NOT EXISTS ingest_jobs (
    id          TEXT PRIMARY KEY,
    phase       TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
