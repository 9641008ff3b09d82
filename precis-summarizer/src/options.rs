use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_LENGTH: u32 = 200;

/// Presentation mode requested from the completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    #[default]
    Concise,
    Detailed,
    #[serde(alias = "bulleted")]
    Bullet,
    Executive,
}

impl SummaryStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStyle::Concise => "concise",
            SummaryStyle::Detailed => "detailed",
            SummaryStyle::Bullet => "bullet",
            SummaryStyle::Executive => "executive",
        }
    }
}

impl fmt::Display for SummaryStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown summary style '{0}'")]
pub struct ParseStyleError(pub String);

impl FromStr for SummaryStyle {
    type Err = ParseStyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concise" => Ok(SummaryStyle::Concise),
            "detailed" => Ok(SummaryStyle::Detailed),
            "bullet" | "bulleted" => Ok(SummaryStyle::Bullet),
            "executive" => Ok(SummaryStyle::Executive),
            _ => Err(ParseStyleError(s.to_string())),
        }
    }
}

/// The option set that shapes a summary. Every field here feeds the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOptions {
    /// Upper bound on summary length, in words.
    pub max_length: u32,
    pub style: SummaryStyle,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            style: SummaryStyle::default(),
        }
    }
}

impl SummaryOptions {
    pub fn new(max_length: u32, style: SummaryStyle) -> Self {
        Self { max_length, style }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub text: String,
    pub original_word_count: usize,
    pub summary_word_count: usize,
    /// Summary length as a percentage of the original, two decimals.
    pub compression_ratio: f64,
}
