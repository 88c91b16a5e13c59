//! Market segment: the board a symbol is listed on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A market board whose universe the breadth score and the screens run over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketSegment {
    /// Main exchange board.
    Listed,
    /// Over-the-counter board.
    Otc,
}

impl MarketSegment {
    pub const ALL: [MarketSegment; 2] = [MarketSegment::Listed, MarketSegment::Otc];

    /// Stable lowercase key used in storage paths and CSV files.
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketSegment::Listed => "listed",
            MarketSegment::Otc => "otc",
        }
    }
}

impl fmt::Display for MarketSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown market segment '{0}' (expected 'listed' or 'otc')")]
pub struct SegmentParseError(pub String);

impl FromStr for MarketSegment {
    type Err = SegmentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "listed" | "main" => Ok(MarketSegment::Listed),
            "otc" => Ok(MarketSegment::Otc),
            other => Err(SegmentParseError(other.to_string())),
        }
    }
}
