use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A downstream system a record must be synchronized to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// The search index cluster.
    Solr,
    /// The metrics database.
    Metrics,
}

impl Target {
    pub const ALL: [Target; 2] = [Target::Solr, Target::Metrics];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solr => "solr",
            Self::Metrics => "metrics",
        }
    }

    /// Field name of this target's processed timestamp.
    pub fn processed_field(&self) -> &'static str {
        match self {
            Self::Solr => "solr_processed",
            Self::Metrics => "metrics_processed",
        }
    }
}

impl FromStr for Target {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solr" => Ok(Self::Solr),
            "metrics" => Ok(Self::Metrics),
            other => Err(TypeError::InvalidTarget(other.to_string())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
