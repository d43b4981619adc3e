//! Remote classification-hierarchy crawler.
//!
//! This crate provides:
//! - [`HierarchyCrawler`] — depth-first walker over a tree-shaped
//!   classification API, emitting one flat record per true leaf
//! - [`CrawlSummary`] — per-crawl statistics

pub mod engine;

pub use engine::{CrawlSummary, HierarchyCrawler};
