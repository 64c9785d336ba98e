use std::sync::Arc;

use tracing::debug;

use bibsync_identity::{resolve_with, ChangeLogIter, IdentityLog, Resolution, ResolvePolicy};
use bibsync_status::StatusTracker;
use bibsync_store::{Projection, RecordView};
use bibsync_types::{Completion, RecordKey};

use crate::error::SdkResult;

/// Read path that follows identity mappings before touching the store.
///
/// A lookup by a retired key answers with the successor's record. With the
/// default single-hop policy only one mapping is followed.
#[derive(Clone)]
pub struct QueryFacade {
    tracker: Arc<StatusTracker>,
    log: Arc<dyn IdentityLog>,
    policy: ResolvePolicy,
}

impl QueryFacade {
    pub fn new(tracker: Arc<StatusTracker>, log: Arc<dyn IdentityLog>, policy: ResolvePolicy) -> Self {
        Self {
            tracker,
            log,
            policy,
        }
    }

    pub fn policy(&self) -> ResolvePolicy {
        self.policy
    }

    pub fn resolve(&self, key: &RecordKey) -> SdkResult<Resolution> {
        Ok(resolve_with(self.log.as_ref(), key, self.policy)?)
    }

    /// The current view of `key`, or of its successor if `key` is retired.
    pub fn get(&self, key: &RecordKey, projection: &Projection) -> SdkResult<Option<RecordView>> {
        let resolution = self.resolve(key)?;
        if resolution.hops > 0 {
            debug!(requested = %key, resolved = %resolution.key, hops = resolution.hops, "lookup redirected");
        }
        Ok(self.tracker.get_record(&resolution.key, projection)?)
    }

    /// Views for each key that resolves to an existing record, in request
    /// order.
    pub fn get_many(&self, keys: &[RecordKey], projection: &Projection) -> SdkResult<Vec<RecordView>> {
        let resolved = keys
            .iter()
            .map(|k| self.resolve(k).map(|r| r.key))
            .collect::<SdkResult<Vec<_>>>()?;
        Ok(self.tracker.get_records(&resolved, projection)?)
    }

    pub fn completion(&self, key: &RecordKey) -> SdkResult<Option<Completion>> {
        let resolution = self.resolve(key)?;
        Ok(self.tracker.completion(&resolution.key)?)
    }

    /// Change log of `key` itself; no redirect is applied.
    pub fn change_log(&self, key: &RecordKey) -> ChangeLogIter<'_, dyn IdentityLog> {
        ChangeLogIter::new(self.log.as_ref(), key.clone())
    }
}

impl std::fmt::Debug for QueryFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryFacade")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
