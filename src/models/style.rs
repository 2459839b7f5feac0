//! Supported citation styles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when selecting a citation style
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StyleError {
    #[error("Unsupported citation style: '{0}' (expected apa, mla, chicago or ieee)")]
    UnsupportedStyle(String),
}

/// Citation styles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    #[default]
    Apa,
    Mla,
    Chicago,
    Ieee,
}

impl CitationStyle {
    /// All supported styles
    pub fn all() -> [CitationStyle; 4] {
        [Self::Apa, Self::Mla, Self::Chicago, Self::Ieee]
    }

    /// Numeric styles key citations by first appearance
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Ieee)
    }

    /// Heading placed above the reference list
    pub fn reference_header(&self) -> &'static str {
        match self {
            Self::Apa => "References",
            Self::Mla => "Works Cited",
            Self::Chicago => "Bibliography",
            Self::Ieee => "References",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apa => "apa",
            Self::Mla => "mla",
            Self::Chicago => "chicago",
            Self::Ieee => "ieee",
        }
    }
}

impl fmt::Display for CitationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Apa => "APA",
            Self::Mla => "MLA",
            Self::Chicago => "Chicago",
            Self::Ieee => "IEEE",
        };
        f.write_str(name)
    }
}

impl FromStr for CitationStyle {
    type Err = StyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apa" => Ok(Self::Apa),
            "mla" => Ok(Self::Mla),
            "chicago" => Ok(Self::Chicago),
            "ieee" => Ok(Self::Ieee),
            _ => Err(StyleError::UnsupportedStyle(s.to_string())),
        }
    }
}
