//! Application configuration for ddxbuilder.
//!
//! User config lives at `~/.ddxbuilder/ddxbuilder.toml`.
//! CLI flags override config file values, which override defaults.
//! Components receive explicit runtime config in their constructors — nothing
//! reads ambient global state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DdxBuilderError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ddxbuilder.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ddxbuilder";

// ---------------------------------------------------------------------------
// Config structs (matching ddxbuilder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Remote classification hierarchy source.
    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    /// Supplementary text corpus settings.
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Diagnosis traversal settings.
    #[serde(default)]
    pub traversal: TraversalPolicyConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the knowledge database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Maximum concurrent hierarchy fetches.
    #[serde(default = "default_crawl_concurrency")]
    pub crawl_concurrency: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            crawl_concurrency: default_crawl_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_db_path() -> String {
    "~/ddxbuilder/ddxbuilder.db".into()
}
fn default_crawl_concurrency() -> u32 {
    4
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[hierarchy]` section — the remote classification API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// URI of the hierarchy root node.
    #[serde(default = "default_root_uri")]
    pub root_uri: String,

    /// Per-node URI template; `{id}` is replaced with the child identifier
    /// extracted from each child reference.
    #[serde(default = "default_uri_template")]
    pub uri_template: String,

    /// `Accept-Language` request header.
    #[serde(default = "default_language")]
    pub language: String,

    /// `API-Version` request header.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            root_uri: default_root_uri(),
            uri_template: default_uri_template(),
            language: default_language(),
            api_version: default_api_version(),
        }
    }
}

fn default_root_uri() -> String {
    "http://localhost/icd/release/11/2025-01/mms".into()
}
fn default_uri_template() -> String {
    "http://localhost/icd/release/11/2025-01/mms/{id}?include=diagnosticCriteria".into()
}
fn default_language() -> String {
    "en".into()
}
fn default_api_version() -> String {
    "v2".into()
}

/// `[corpus]` section — the paginated diagnostic-text extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Regex matching anchor codes in free text.
    #[serde(default = "default_anchor_pattern")]
    pub anchor_pattern: String,

    /// Fragments shorter than this are discarded as noise.
    #[serde(default = "default_min_fragment_len")]
    pub min_fragment_len: usize,

    /// First page of the diagnostic-requirements window (1-based, inclusive).
    #[serde(default = "default_start_page")]
    pub start_page: u32,

    /// Last page of the window (inclusive).
    #[serde(default = "default_end_page")]
    pub end_page: u32,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            anchor_pattern: default_anchor_pattern(),
            min_fragment_len: default_min_fragment_len(),
            start_page: default_start_page(),
            end_page: default_end_page(),
        }
    }
}

fn default_anchor_pattern() -> String {
    r"6[A-E]\w{2}(\.\w)?".into()
}
fn default_min_fragment_len() -> usize {
    3
}
fn default_start_page() -> u32 {
    111
}
fn default_end_page() -> u32 {
    694
}

/// `[traversal]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalPolicyConfig {
    /// Minimum similarity ratio for the similar-case short-circuit.
    /// A case exactly at the threshold is accepted.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for TraversalPolicyConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.7
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration for the hierarchy crawler.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// URI of the hierarchy root node.
    pub root_uri: String,
    /// Per-node URI template with an `{id}` placeholder.
    pub uri_template: String,
    /// `Accept-Language` header value.
    pub language: String,
    /// `API-Version` header value.
    pub api_version: String,
    /// Maximum concurrent sibling-subtree fetches.
    pub concurrency: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            root_uri: config.hierarchy.root_uri.clone(),
            uri_template: config.hierarchy.uri_template.clone(),
            language: config.hierarchy.language.clone(),
            api_version: config.hierarchy.api_version.clone(),
            concurrency: config.defaults.crawl_concurrency,
            timeout_secs: config.defaults.timeout_secs,
        }
    }
}

/// Runtime segmentation options.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    /// Fragments shorter than this are discarded as noise.
    pub min_fragment_len: usize,
}

impl From<&AppConfig> for SegmentOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_fragment_len: config.corpus.min_fragment_len,
        }
    }
}

/// Runtime traversal options.
#[derive(Debug, Clone)]
pub struct TraversalOptions {
    /// Minimum similarity ratio for the similar-case short-circuit.
    pub similarity_threshold: f64,
}

impl From<&AppConfig> for TraversalOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            similarity_threshold: config.traversal.similarity_threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ddxbuilder/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DdxBuilderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ddxbuilder/ddxbuilder.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DdxBuilderError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DdxBuilderError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DdxBuilderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DdxBuilderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DdxBuilderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("root_uri"));
        assert!(toml_str.contains("anchor_pattern"));
        assert!(toml_str.contains("similarity_threshold"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.crawl_concurrency, 4);
        assert_eq!(parsed.corpus.min_fragment_len, 3);
        assert_eq!(parsed.corpus.start_page, 111);
        assert_eq!(parsed.traversal.similarity_threshold, 0.7);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[hierarchy]
root_uri = "http://icd-api.internal/icd/release/11/2025-01/mms"

[traversal]
similarity_threshold = 0.8
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert!(config.hierarchy.root_uri.contains("icd-api.internal"));
        assert_eq!(config.hierarchy.language, "en");
        assert_eq!(config.traversal.similarity_threshold, 0.8);
        assert_eq!(config.corpus.end_page, 694);
    }

    #[test]
    fn crawl_config_from_app_config() {
        let app = AppConfig::default();
        let crawl = CrawlConfig::from(&app);
        assert_eq!(crawl.concurrency, 4);
        assert_eq!(crawl.timeout_secs, 30);
        assert!(crawl.uri_template.contains("{id}"));
    }
}
