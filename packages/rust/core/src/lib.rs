//! Core orchestration and domain logic for ddxbuilder.
//!
//! This crate ties crawling, segmentation, fusion, and decision-tree
//! flattening into phased ingest pipelines, and hosts the diagnosis
//! service that answers requests against the stored corpus.

pub mod cases;
pub mod fuse;
pub mod pipeline;
pub mod service;
