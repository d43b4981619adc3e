//! Shared types, error model, and configuration for ddxbuilder.
//!
//! This crate is the foundation depended on by all other ddxbuilder crates.
//! It provides:
//! - [`DdxBuilderError`] — the unified error type
//! - Domain types ([`ClassificationEntity`], [`TextSegment`],
//!   [`FusedKnowledgeRecord`], [`DecisionNode`], [`ReferenceCase`], the
//!   diagnosis request/response shapes)
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CorpusConfig, CrawlConfig, DefaultsConfig, HierarchyConfig, SegmentOptions,
    TraversalOptions, TraversalPolicyConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{DdxBuilderError, Result};
pub use types::{
    ClassificationEntity, DecisionNode, DiagnosisRequest, DiagnosisResponse, FusedKnowledgeRecord,
    IngestJobId, NodeKind, PageText, ReferenceCase, TextSegment,
};
