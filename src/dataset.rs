//! Supported document collections

use crate::error::RetrievalError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named corpus. Every precomputed resource is keyed by dataset.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    /// ANTIQUE non-factoid question answering collection
    Antique,
    /// Webis Touché argument retrieval collection
    Webis,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::Antique, Dataset::Webis];

    pub fn name(&self) -> &'static str {
        match self {
            Dataset::Antique => "antique",
            Dataset::Webis => "webis",
        }
    }

    /// Document table in the document store
    pub fn default_table(&self) -> String {
        format!("cleaned_{}", self.name())
    }

    /// Identifier column in the document table
    pub fn default_id_column(&self) -> &'static str {
        match self {
            Dataset::Antique => "id",
            Dataset::Webis => "_id",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "antique" => Ok(Dataset::Antique),
            "webis" | "webis-touche2020" => Ok(Dataset::Webis),
            other => Err(RetrievalError::configuration(format!(
                "Unknown dataset '{}'. Supported: antique, webis",
                other
            ))),
        }
    }
}
