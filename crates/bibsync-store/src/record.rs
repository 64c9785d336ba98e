use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use bibsync_types::{Completion, FragmentKind, RecordKey, Target, Timestamp};

use crate::view::{Projection, RecordField, RecordView};

/// A fragment payload and the instant it was last written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FragmentSlot {
    pub payload: Value,
    pub updated: Timestamp,
}

/// A stored bibliographic record.
///
/// Payload ingestion and completion tracking are independent: writing a
/// fragment never clears a processed stamp, and stamping never touches a
/// fragment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned row number, increasing in creation order.
    pub id: u64,
    pub key: RecordKey,
    pub fragments: BTreeMap<FragmentKind, FragmentSlot>,
    pub created: Timestamp,
    /// Latest fragment write.
    pub updated: Option<Timestamp>,
    /// Overall completion stamp.
    pub processed: Option<Timestamp>,
    pub solr_processed: Option<Timestamp>,
    pub metrics_processed: Option<Timestamp>,
    /// Last synchronization outcome; terminal when `processed` is also set.
    pub status: Option<String>,
}

impl Record {
    /// A fresh record with no fragments and no stamps.
    pub fn new(id: u64, key: RecordKey, created: Timestamp) -> Self {
        Self {
            id,
            key,
            fragments: BTreeMap::new(),
            created,
            updated: None,
            processed: None,
            solr_processed: None,
            metrics_processed: None,
            status: None,
        }
    }

    pub fn fragment(&self, kind: FragmentKind) -> Option<&Value> {
        self.fragments.get(&kind).map(|slot| &slot.payload)
    }

    pub fn fragment_updated(&self, kind: FragmentKind) -> Option<Timestamp> {
        self.fragments.get(&kind).map(|slot| slot.updated)
    }

    /// Replace a fragment payload and bump both its stamp and `updated`.
    pub fn set_fragment(&mut self, kind: FragmentKind, payload: Value, now: Timestamp) {
        self.fragments.insert(kind, FragmentSlot { payload, updated: now });
        self.updated = Some(match self.updated {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }

    pub fn target_processed(&self, target: Target) -> Option<Timestamp> {
        match target {
            Target::Solr => self.solr_processed,
            Target::Metrics => self.metrics_processed,
        }
    }

    /// Stamp `target` as delivered at `now`.
    ///
    /// A stamp that already covers the latest fragment write is kept, so
    /// re-marking an unchanged record is a no-op. Returns whether the stamp
    /// moved.
    pub fn stamp_target(&mut self, target: Target, now: Timestamp) -> bool {
        let updated = self.updated;
        let slot = match target {
            Target::Solr => &mut self.solr_processed,
            Target::Metrics => &mut self.metrics_processed,
        };
        match *slot {
            Some(prev) if updated.map_or(true, |u| prev >= u) => false,
            _ => {
                *slot = Some(now);
                true
            }
        }
    }

    pub fn completion(&self) -> Completion {
        Completion::derive(
            self.solr_processed.is_some(),
            self.metrics_processed.is_some(),
            self.processed.is_some(),
            self.status.as_deref(),
        )
    }

    /// Project this record into the view exposed to readers and collaborators.
    pub fn to_view(&self, projection: &Projection) -> RecordView {
        let mut view = RecordView::empty();
        for field in RecordField::all() {
            if projection.includes(&field) {
                view.insert(&field, self.field_value(&field));
            }
        }
        view
    }

    fn field_value(&self, field: &RecordField) -> Value {
        match field {
            RecordField::Id => Value::from(self.id),
            RecordField::Key => Value::String(self.key.to_string()),
            RecordField::Fragment(kind) => self.fragment(*kind).cloned().unwrap_or(Value::Null),
            RecordField::FragmentUpdated(kind) => timestamp_value(self.fragment_updated(*kind)),
            RecordField::Created => timestamp_value(Some(self.created)),
            RecordField::Updated => timestamp_value(self.updated),
            RecordField::Processed => timestamp_value(self.processed),
            RecordField::TargetProcessed(target) => timestamp_value(self.target_processed(*target)),
            RecordField::Status => self
                .status
                .as_ref()
                .map(|s| Value::String(s.clone()))
                .unwrap_or(Value::Null),
        }
    }
}

fn timestamp_value(ts: Option<Timestamp>) -> Value {
    match ts {
        Some(ts) => Value::String(ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)),
        None => Value::Null,
    }
}
