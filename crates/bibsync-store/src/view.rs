//! Projected record views.
//!
//! A [`RecordView`] is the flat field map handed to readers and to the sync
//! collaborators. A [`Projection`] selects which fields it carries: fields
//! outside the projection are absent from the map, not `null`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use bibsync_types::{Completion, FragmentKind, RecordKey, Target, Timestamp};

use crate::error::StoreError;

/// A named field of the record view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordField {
    Id,
    Key,
    Fragment(FragmentKind),
    FragmentUpdated(FragmentKind),
    Created,
    Updated,
    Processed,
    TargetProcessed(Target),
    Status,
}

impl RecordField {
    /// Every field, in view order.
    pub fn all() -> Vec<RecordField> {
        let mut fields = vec![RecordField::Id, RecordField::Key];
        for kind in FragmentKind::ALL {
            fields.push(RecordField::Fragment(kind));
            fields.push(RecordField::FragmentUpdated(kind));
        }
        fields.extend([RecordField::Created, RecordField::Updated, RecordField::Processed]);
        fields.extend(Target::ALL.into_iter().map(RecordField::TargetProcessed));
        fields.push(RecordField::Status);
        fields
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Key => "key",
            Self::Fragment(kind) => kind.as_str(),
            Self::FragmentUpdated(kind) => kind.updated_field(),
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Processed => "processed",
            Self::TargetProcessed(target) => target.processed_field(),
            Self::Status => "status",
        }
    }

    /// Whether reading this field requires loading a fragment payload.
    pub fn is_payload(&self) -> bool {
        matches!(self, Self::Fragment(_))
    }
}

impl FromStr for RecordField {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| StoreError::UnknownField(s.to_string()))
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field subset to materialize in a view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    /// Only these fields. The record key is always included.
    Fields(BTreeSet<RecordField>),
}

impl Projection {
    pub fn fields(fields: impl IntoIterator<Item = RecordField>) -> Self {
        Self::Fields(fields.into_iter().collect())
    }

    /// Build a projection from field names, e.g. `["id", "bib_data"]`.
    pub fn load_only<I, S>(names: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = names
            .into_iter()
            .map(|name| name.as_ref().parse::<RecordField>())
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self::Fields(fields))
    }

    /// Everything except fragment payloads; the cheap shape for status checks.
    pub fn stamps_only() -> Self {
        Self::fields(RecordField::all().into_iter().filter(|f| !f.is_payload()))
    }

    pub fn includes(&self, field: &RecordField) -> bool {
        match self {
            Self::All => true,
            Self::Fields(_) if *field == RecordField::Key => true,
            Self::Fields(fields) => fields.contains(field),
        }
    }
}

/// Flat, projected view of a record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordView(Map<String, Value>);

impl RecordView {
    pub fn empty() -> Self {
        Self(Map::new())
    }

    pub(crate) fn insert(&mut self, field: &RecordField, value: Value) {
        self.0.insert(field.name().to_string(), value);
    }

    /// Raw field access. `None` when the field was not projected.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn id(&self) -> Option<u64> {
        self.0.get("id").and_then(Value::as_u64)
    }

    pub fn key(&self) -> Option<RecordKey> {
        self.0.get("key").and_then(Value::as_str).map(RecordKey::from)
    }

    /// Fragment payload, `None` if unprojected or never written.
    pub fn fragment(&self, kind: FragmentKind) -> Option<&Value> {
        self.0.get(kind.as_str()).filter(|v| !v.is_null())
    }

    pub fn fragment_updated(&self, kind: FragmentKind) -> Option<Timestamp> {
        self.timestamp(kind.updated_field())
    }

    pub fn updated(&self) -> Option<Timestamp> {
        self.timestamp("updated")
    }

    pub fn processed(&self) -> Option<Timestamp> {
        self.timestamp("processed")
    }

    pub fn target_processed(&self, target: Target) -> Option<Timestamp> {
        self.timestamp(target.processed_field())
    }

    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    /// Completion derived from whatever stamps the view carries.
    pub fn completion(&self) -> Completion {
        Completion::derive(
            self.target_processed(Target::Solr).is_some(),
            self.target_processed(Target::Metrics).is_some(),
            self.processed().is_some(),
            self.status(),
        )
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }

    fn timestamp(&self, name: &str) -> Option<Timestamp> {
        self.0
            .get(name)
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl From<Map<String, Value>> for RecordView {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use bibsync_types::MonotonicClock;
    use serde_json::json;

    fn sample() -> Record {
        let clock = MonotonicClock::new();
        let mut r = Record::new(7, RecordKey::from("abc"), clock.now());
        r.set_fragment(FragmentKind::CoreMetadata, json!({"bibcode": "abc"}), clock.now());
        r.set_fragment(FragmentKind::FullText, json!("foo bar"), clock.now());
        r
    }

    #[test]
    fn field_names_parse_back() {
        for field in RecordField::all() {
            assert_eq!(field.name().parse::<RecordField>().unwrap(), field);
        }
    }

    #[test]
    fn unknown_field_name() {
        let err = Projection::load_only(["id", "nope"]).unwrap_err();
        assert!(matches!(err, StoreError::UnknownField(ref f) if f == "nope"));
    }

    #[test]
    fn load_only_omits_unrequested_fields() {
        let view = sample().to_view(&Projection::load_only(["id"]).unwrap());
        assert_eq!(view.id(), Some(7));
        assert!(!view.contains("processed"));
        assert!(!view.contains("bib_data"));
        assert_eq!(view.key(), Some(RecordKey::from("abc")));
    }

    #[test]
    fn stamps_only_skips_payloads() {
        let view = sample().to_view(&Projection::stamps_only());
        assert!(!view.contains("bib_data"));
        assert!(!view.contains("fulltext"));
        assert!(view.contains("fulltext_updated"));
        assert!(view.contains("solr_processed"));
    }

    #[test]
    fn view_completion_matches_record() {
        let mut r = sample();
        let clock = MonotonicClock::new();
        r.stamp_target(Target::Solr, clock.now());
        let view = r.to_view(&Projection::All);
        assert_eq!(view.completion(), r.completion());
        assert_eq!(view.completion(), Completion::SolrDone);
    }

    #[test]
    fn serializes_as_flat_object() {
        let view = sample().to_view(&Projection::load_only(["fulltext"]).unwrap());
        let json = view.into_json();
        assert_eq!(json["fulltext"], json!("foo bar"));
        assert_eq!(json["key"], json!("abc"));
    }
}
