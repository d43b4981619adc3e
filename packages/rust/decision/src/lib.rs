//! Decision-tree flattening and stateless diagnosis traversal.
//!
//! This crate provides:
//! - [`builder`] — flattens nested decision-tree documents into leveled
//!   [`DecisionNode`](ddxbuilder_shared::DecisionNode) lists
//! - [`similarity`] — the sequence ratio backing the similar-case lookup
//! - [`traversal`] — the stateless engine answering diagnosis requests

pub mod builder;
pub mod similarity;
pub mod traversal;

pub use builder::{flatten, load_corpus, root_label_from_filename};
pub use similarity::sequence_ratio;
pub use traversal::{DiagnosisCorpus, TraversalEngine};
