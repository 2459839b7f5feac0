//! Configuration management.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `CITATION_MASTER_*` environment variables (`__` separates sections, e.g.
//! `CITATION_MASTER_RETRIEVAL__MAX_CANDIDATES=5`).

mod file_config;

pub use file_config::{ConfigFile, ConfigFileError};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::CitationStyle;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "CITATION_MASTER";

/// Fallback environment variable for the oracle API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Relevance oracle settings
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Evidence retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Claim extraction settings
    #[serde(default)]
    pub claims: ClaimsConfig,

    /// Citation assignment and rendering settings
    #[serde(default)]
    pub citations: CitationsConfig,

    /// Library storage
    #[serde(default)]
    pub library: LibraryConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relevance oracle (chat-completions endpoint) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Whether to call the oracle at all; when false every run is degraded
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// API key; falls back to `OPENAI_API_KEY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Timeout for one HTTP attempt
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_rps")]
    pub requests_per_second: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Consecutive failures before the oracle is skipped for the rest of a run
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            requests_per_second: default_rps(),
            max_retries: default_max_retries(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl OracleConfig {
    /// Configured key, or the `OPENAI_API_KEY` environment variable
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Deadline for one guarded oracle call: every attempt plus the backoff
    /// between them. Waiting for a rate-limit permit is not included.
    pub fn call_deadline(&self) -> Duration {
        let attempts = self.max_retries + 1;
        self.timeout() * attempts + RETRY_BACKOFF_ALLOWANCE * self.max_retries
    }
}

/// Upper bound on the sleep between two oracle attempts
const RETRY_BACKOFF_ALLOWANCE: Duration = Duration::from_secs(2);

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_ms() -> u64 {
    8000
}

fn default_rps() -> u32 {
    5
}

fn default_max_retries() -> u32 {
    2
}

fn default_failure_threshold() -> usize {
    3
}

/// Evidence retrieval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Passages taken from the lexical index before oracle re-ranking
    #[serde(default = "default_shortlist")]
    pub shortlist_size: usize,

    /// Candidates below this relevance are discarded
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,

    /// Maximum candidates returned per claim
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Claims retrieved concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Keep only the best passage per work
    #[serde(default = "default_true")]
    pub one_per_work: bool,

    /// Confidence multiplier applied to lexical-only (degraded) candidates
    #[serde(default = "default_degraded_factor")]
    pub degraded_confidence_factor: f64,

    /// Lexical floor used instead of `min_relevance` when ranking without the
    /// oracle; TF-IDF cosines sit far below oracle relevance scores
    #[serde(default = "default_degraded_min_lexical")]
    pub degraded_min_lexical: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            shortlist_size: default_shortlist(),
            min_relevance: default_min_relevance(),
            max_candidates: default_max_candidates(),
            concurrency: default_concurrency(),
            one_per_work: true,
            degraded_confidence_factor: default_degraded_factor(),
            degraded_min_lexical: default_degraded_min_lexical(),
        }
    }
}

fn default_shortlist() -> usize {
    20
}

fn default_min_relevance() -> f64 {
    0.2
}

fn default_max_candidates() -> usize {
    3
}

fn default_concurrency() -> usize {
    4
}

fn default_degraded_factor() -> f64 {
    0.5
}

fn default_degraded_min_lexical() -> f64 {
    0.02
}

/// Claim extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimsConfig {
    /// Heuristic score at or above which a sentence needs support
    #[serde(default = "default_flag_threshold")]
    pub flag_threshold: f64,

    /// Heuristic score below which a sentence never needs support
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f64,

    /// Threshold applied to ambiguous sentences when the oracle is unavailable
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f64,

    /// Sentences shorter than this are penalized
    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

impl Default for ClaimsConfig {
    fn default() -> Self {
        Self {
            flag_threshold: default_flag_threshold(),
            reject_threshold: default_reject_threshold(),
            fallback_threshold: default_fallback_threshold(),
            min_words: default_min_words(),
        }
    }
}

fn default_flag_threshold() -> f64 {
    0.6
}

fn default_reject_threshold() -> f64 {
    0.35
}

fn default_fallback_threshold() -> f64 {
    0.5
}

fn default_min_words() -> usize {
    4
}

/// Citation assignment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationsConfig {
    #[serde(default)]
    pub style: CitationStyle,

    /// Minimum span overlap (IoU) for a citation to follow an edited claim
    #[serde(default = "default_reanchor_overlap")]
    pub reanchor_overlap: f64,

    /// Minimum text similarity for a citation to follow an edited claim
    #[serde(default = "default_reanchor_similarity")]
    pub reanchor_text_similarity: f64,

    /// Insert the supporting quote next to each citation
    #[serde(default)]
    pub include_quotes: bool,
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self {
            style: CitationStyle::default(),
            reanchor_overlap: default_reanchor_overlap(),
            reanchor_text_similarity: default_reanchor_similarity(),
            include_quotes: false,
        }
    }
}

fn default_reanchor_overlap() -> f64 {
    0.5
}

fn default_reanchor_similarity() -> f64 {
    0.6
}

/// Library storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// JSON file holding works and passages
    #[serde(default = "default_library_path")]
    pub path: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            path: default_library_path(),
        }
    }
}

fn default_library_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("citation-master")
        .join("library.json")
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" for structured output, anything else for text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from a file, with environment overrides
pub fn load_config(path: &Path) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(env_source())
        .build()?;

    settings.try_deserialize()
}

/// Get the configuration from defaults and environment variables only
pub fn get_config() -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder().add_source(env_source()).build()?;
    settings.try_deserialize()
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Locate a configuration file in the usual places.
///
/// Checks `./citation-master.toml`, then `<config dir>/citation-master/config.toml`.
pub fn find_config_file() -> Option<PathBuf> {
    default_config_paths().into_iter().find(|p| p.is_file())
}

/// Candidate configuration file locations, in lookup order
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("citation-master.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("citation-master").join("config.toml"));
    }
    paths
}
