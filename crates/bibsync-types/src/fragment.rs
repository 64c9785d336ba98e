use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// One named category of payload contributing to a record.
///
/// The set is fixed: ingestion for any other kind is a programmer error and
/// fails fast with [`TypeError::InvalidFragmentKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FragmentKind {
    /// Core bibliographic metadata.
    #[serde(rename = "bib_data", alias = "metadata")]
    CoreMetadata,
    /// Non-bibliographic metadata (citations, reads, data links).
    #[serde(rename = "nonbib_data")]
    NonBibMetadata,
    /// Author identity claims.
    #[serde(rename = "orcid_claims")]
    IdentityClaims,
    /// Extracted full text.
    #[serde(rename = "fulltext")]
    FullText,
    /// Computed metrics row.
    #[serde(rename = "metrics")]
    Metrics,
}

impl FragmentKind {
    /// Every fragment kind, in view order.
    pub const ALL: [FragmentKind; 5] = [
        FragmentKind::CoreMetadata,
        FragmentKind::NonBibMetadata,
        FragmentKind::IdentityClaims,
        FragmentKind::FullText,
        FragmentKind::Metrics,
    ];

    /// Field name of the payload in a record view.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoreMetadata => "bib_data",
            Self::NonBibMetadata => "nonbib_data",
            Self::IdentityClaims => "orcid_claims",
            Self::FullText => "fulltext",
            Self::Metrics => "metrics",
        }
    }

    /// Field name of the fragment's last-updated timestamp.
    pub fn updated_field(&self) -> &'static str {
        match self {
            Self::CoreMetadata => "bib_data_updated",
            Self::NonBibMetadata => "nonbib_data_updated",
            Self::IdentityClaims => "orcid_claims_updated",
            Self::FullText => "fulltext_updated",
            Self::Metrics => "metrics_updated",
        }
    }
}

impl FromStr for FragmentKind {
    type Err = TypeError;

    /// Accepts every field name, plus `metadata` as a legacy spelling of
    /// `bib_data`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "metadata" {
            return Ok(Self::CoreMetadata);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TypeError::InvalidFragmentKind(s.to_string()))
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_kind() {
        for kind in FragmentKind::ALL {
            assert_eq!(kind.as_str().parse::<FragmentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "citations".parse::<FragmentKind>().unwrap_err();
        assert_eq!(err, TypeError::InvalidFragmentKind("citations".into()));
    }

    #[test]
    fn legacy_metadata_name_is_core_metadata() {
        let kind = "metadata".parse::<FragmentKind>().unwrap();
        assert_eq!(kind, FragmentKind::CoreMetadata);
        assert_eq!(kind.as_str(), "bib_data");

        let from_json: FragmentKind = serde_json::from_str("\"metadata\"").unwrap();
        assert_eq!(from_json, FragmentKind::CoreMetadata);
        assert_eq!(serde_json::to_string(&from_json).unwrap(), "\"bib_data\"");
    }

    #[test]
    fn updated_field_suffix() {
        for kind in FragmentKind::ALL {
            assert_eq!(kind.updated_field(), format!("{}_updated", kind.as_str()));
        }
    }

    #[test]
    fn serde_uses_field_names() {
        let json = serde_json::to_string(&FragmentKind::IdentityClaims).unwrap();
        assert_eq!(json, "\"orcid_claims\"");
    }
}
