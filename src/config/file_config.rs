//! Configuration file support for citation-master.
//!
//! # Configuration File Format
//!
//! ```toml
//! [oracle]
//! enabled = true
//! endpoint = "https://api.openai.com/v1/chat/completions"
//! model = "gpt-4o-mini"
//! timeout_ms = 8000
//! requests_per_second = 5
//! max_retries = 2
//! failure_threshold = 3
//!
//! [retrieval]
//! shortlist_size = 20
//! min_relevance = 0.2
//! max_candidates = 3
//! concurrency = 4
//!
//! [claims]
//! flag_threshold = 0.6
//! reject_threshold = 0.35
//!
//! [citations]
//! style = "apa"
//! include_quotes = false
//!
//! [library]
//! path = "~/.local/share/citation-master/library.json"
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    CitationsConfig, ClaimsConfig, Config, LibraryConfig, LoggingConfig, OracleConfig,
    RetrievalConfig,
};

/// Configuration file structure
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub claims: ClaimsConfig,

    #[serde(default)]
    pub citations: CitationsConfig,

    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigFileError::Parse(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigFileError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigFileError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigFileError::Io(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| ConfigFileError::Io(e.to_string()))
    }

    /// Convert into the runtime configuration
    pub fn into_config(self) -> Config {
        Config {
            oracle: self.oracle,
            retrieval: self.retrieval,
            claims: self.claims,
            citations: self.citations,
            library: self.library,
            logging: self.logging,
        }
    }
}

impl From<Config> for ConfigFile {
    fn from(config: Config) -> Self {
        Self {
            oracle: config.oracle,
            retrieval: config.retrieval,
            claims: config.claims,
            citations: config.citations,
            library: config.library,
            logging: config.logging,
        }
    }
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}
