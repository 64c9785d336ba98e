use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, info, warn};

use bibsync_status::StatusTracker;
use bibsync_store::RecordView;
use bibsync_types::{RecordKey, Target};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SearchTransport;
use crate::types::{is_success, FailedRecord, IndexOptions, ReindexReport};

/// Pushes record views to search endpoints and stamps the outcome.
///
/// Each chunk of input is sent once per endpoint. A sub-batch that comes
/// back with any non-2xx status is split in half and both halves are
/// resent, until every failing sub-batch is a single record. The pending
/// sub-batches live on an explicit stack, and up to
/// [`SyncConfig::parallelism`] of them are dispatched at a time.
pub struct Reindexer {
    transport: Arc<dyn SearchTransport>,
    tracker: Arc<StatusTracker>,
    config: SyncConfig,
}

/// Verdict on one dispatched sub-batch.
enum Verdict {
    Delivered,
    Rejected(String),
    Unreachable(String),
}

impl Reindexer {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        tracker: Arc<StatusTracker>,
        config: SyncConfig,
    ) -> Self {
        Self {
            transport,
            tracker,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Deliver `records` to every endpoint in order.
    ///
    /// Keys delivered everywhere get their solr stamp. Keys that fail on
    /// any endpoint are returned in [`ReindexReport::failed`]; with
    /// `options.ignore_errors` they are also marked terminally failed,
    /// otherwise they stay retry-eligible.
    pub async fn reindex(
        &self,
        records: &[RecordView],
        endpoints: &[String],
        options: IndexOptions,
    ) -> SyncResult<ReindexReport> {
        let mut report = ReindexReport::default();
        let (records, keys) = keyed(records);
        if records.is_empty() {
            return Ok(report);
        }

        let mut failures: HashMap<RecordKey, FailedRecord> = HashMap::new();
        for endpoint in endpoints {
            for (chunk_no, chunk) in records.chunks(self.config.effective_batch_size()).enumerate() {
                let chunk: Arc<[RecordView]> = chunk.into();
                debug!(endpoint = %endpoint, chunk = chunk_no, size = chunk.len(), "reindex chunk");
                let (calls, failed) = self.deliver(chunk, endpoint, options).await?;
                report.calls += calls;
                for f in failed {
                    failures.entry(f.key.clone()).or_insert(f);
                }
            }
        }

        let mut seen = HashSet::new();
        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            match failures.remove(&key) {
                Some(failure) => {
                    report.failed.push(key);
                    report.failures.push(failure);
                }
                None => report.succeeded.push(key),
            }
        }

        self.tracker
            .mark_target_processed(&report.succeeded, Some(Target::Solr))?;
        if options.ignore_errors {
            for failure in &report.failures {
                let status = format!(
                    "{}: {} {}",
                    self.config.failure_status_prefix, failure.endpoint, failure.reason
                );
                self.tracker.mark_processed(
                    std::slice::from_ref(&failure.key),
                    Some(Target::Solr),
                    Some(&status),
                )?;
            }
        }

        info!(
            endpoints = endpoints.len(),
            records = records.len(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            calls = report.calls,
            "reindex finished"
        );
        Ok(report)
    }

    /// Bisection over one chunk and one endpoint. Returns the call count
    /// and the records that still fail as singletons.
    async fn deliver(
        &self,
        chunk: Arc<[RecordView]>,
        endpoint: &str,
        options: IndexOptions,
    ) -> SyncResult<(usize, Vec<FailedRecord>)> {
        let mut stack: Vec<Range<usize>> = vec![0..chunk.len()];
        let mut failed = Vec::new();
        let mut calls = 0;

        while !stack.is_empty() {
            let take = self.config.effective_parallelism().min(stack.len());
            let wave: Vec<Range<usize>> = (0..take).filter_map(|_| stack.pop()).collect();
            calls += wave.len();

            let verdicts = self.dispatch_wave(&chunk, &wave, endpoint, options).await?;
            for (range, verdict) in wave.into_iter().zip(verdicts) {
                match verdict {
                    Verdict::Delivered => {}
                    Verdict::Rejected(reason) if range.len() > 1 => {
                        let mid = range.start + range.len() / 2;
                        debug!(
                            endpoint,
                            start = range.start,
                            len = range.len(),
                            reason = %reason,
                            "bisecting failed sub-batch"
                        );
                        stack.push(mid..range.end);
                        stack.push(range.start..mid);
                    }
                    Verdict::Rejected(reason) | Verdict::Unreachable(reason) => {
                        for view in &chunk[range] {
                            if let Some(key) = view.key() {
                                failed.push(FailedRecord {
                                    key,
                                    endpoint: endpoint.to_string(),
                                    reason: reason.clone(),
                                });
                            }
                        }
                    }
                }
            }
        }
        Ok((calls, failed))
    }

    async fn dispatch_wave(
        &self,
        chunk: &Arc<[RecordView]>,
        wave: &[Range<usize>],
        endpoint: &str,
        options: IndexOptions,
    ) -> SyncResult<Vec<Verdict>> {
        if wave.len() == 1 {
            let range = wave[0].clone();
            let result = self.transport.update(&chunk[range.clone()], endpoint, options).await;
            return Ok(vec![judge(endpoint, range.len(), result)]);
        }

        let handles: Vec<_> = wave
            .iter()
            .cloned()
            .map(|range| {
                let transport = Arc::clone(&self.transport);
                let chunk = Arc::clone(chunk);
                let endpoint = endpoint.to_string();
                tokio::spawn(async move {
                    let len = range.len();
                    let result = transport.update(&chunk[range], &endpoint, options).await;
                    judge(&endpoint, len, result)
                })
            })
            .collect();

        let mut verdicts = Vec::with_capacity(handles.len());
        for handle in handles {
            verdicts.push(handle.await.map_err(|e| SyncError::Dispatch(e.to_string()))?);
        }
        Ok(verdicts)
    }
}

impl std::fmt::Debug for Reindexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reindexer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Views that carry a key, plus their keys in the same order.
fn keyed(records: &[RecordView]) -> (Vec<RecordView>, Vec<RecordKey>) {
    let mut views = Vec::with_capacity(records.len());
    let mut keys = Vec::with_capacity(records.len());
    for view in records {
        match view.key() {
            Some(key) => {
                keys.push(key);
                views.push(view.clone());
            }
            None => warn!("record view without key skipped"),
        }
    }
    (views, keys)
}

fn judge(endpoint: &str, len: usize, result: SyncResult<Vec<u16>>) -> Verdict {
    match result {
        Ok(codes) => {
            if codes.len() != len {
                warn!(endpoint, expected = len, got = codes.len(), "status count mismatch");
            }
            match codes.iter().find(|c| !is_success(**c)) {
                None if !codes.is_empty() => Verdict::Delivered,
                None => Verdict::Rejected("empty status list".into()),
                Some(code) => Verdict::Rejected(format!("status {code}")),
            }
        }
        Err(err) => {
            warn!(endpoint, error = %err, "sub-batch not delivered");
            Verdict::Unreachable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ScriptedSearchTransport;
    use bibsync_identity::InMemoryIdentityLog;
    use bibsync_store::{InMemoryRecordStore, Projection};
    use bibsync_types::{Completion, FragmentKind};
    use serde_json::json;

    struct Fixture {
        tracker: Arc<StatusTracker>,
        transport: Arc<ScriptedSearchTransport>,
    }

    impl Fixture {
        fn new(keys: &[&str]) -> Self {
            let tracker = Arc::new(StatusTracker::new(
                Arc::new(InMemoryRecordStore::new()),
                Arc::new(InMemoryIdentityLog::new()),
            ));
            for k in keys {
                tracker
                    .put_fragment(
                        &RecordKey::from(*k),
                        FragmentKind::CoreMetadata,
                        json!({"bibcode": k, "hey": 1}),
                    )
                    .unwrap();
            }
            Self {
                tracker,
                transport: Arc::new(ScriptedSearchTransport::new()),
            }
        }

        fn reindexer(&self, config: SyncConfig) -> Reindexer {
            Reindexer::new(self.transport.clone(), self.tracker.clone(), config)
        }

        fn views(&self, keys: &[&str]) -> Vec<RecordView> {
            let keys: Vec<RecordKey> = keys.iter().map(|k| RecordKey::from(*k)).collect();
            self.tracker.get_records(&keys, &Projection::All).unwrap()
        }

        fn view(&self, key: &str) -> RecordView {
            self.tracker
                .get_record(&RecordKey::from(key), &Projection::All)
                .unwrap()
                .unwrap()
        }
    }

    fn endpoints(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn keys(list: &[&str]) -> Vec<RecordKey> {
        list.iter().map(|s| RecordKey::from(*s)).collect()
    }

    // ---- Happy path ----

    #[tokio::test]
    async fn all_success_marks_solr_only() {
        let f = Fixture::new(&["abc", "foo"]);
        f.transport.always_respond(vec![200]);
        let report = f
            .reindexer(SyncConfig::default())
            .reindex(&f.views(&["abc", "foo"]), &endpoints(&["http://solr1"]), IndexOptions::default())
            .await
            .unwrap();

        assert!(report.failed.is_empty());
        assert_eq!(report.succeeded, keys(&["abc", "foo"]));
        assert_eq!(report.calls, 1);
        for k in ["abc", "foo"] {
            let v = f.view(k);
            assert!(v.target_processed(Target::Solr).is_some());
            assert!(v.target_processed(Target::Metrics).is_none());
            assert!(v.processed().is_none());
        }
    }

    #[tokio::test]
    async fn options_are_forwarded() {
        let f = Fixture::new(&["abc"]);
        let options = IndexOptions {
            commit: true,
            ignore_errors: false,
        };
        f.reindexer(SyncConfig::default())
            .reindex(&f.views(&["abc"]), &endpoints(&["e"]), options)
            .await
            .unwrap();
        assert_eq!(f.transport.calls()[0].options, options);
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let f = Fixture::new(&[]);
        let report = f
            .reindexer(SyncConfig::default())
            .reindex(&[], &endpoints(&["e"]), IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(report, ReindexReport::default());
        assert_eq!(f.transport.call_count(), 0);
    }

    // ---- Bisection ----

    #[tokio::test]
    async fn failure_is_isolated_by_bisection() {
        let f = Fixture::new(&["abc", "foo"]);
        f.transport.respond_with(vec![503]).fail_key("foo", 503);
        let report = f
            .reindexer(SyncConfig::default())
            .reindex(&f.views(&["abc", "foo"]), &endpoints(&["http://solr1"]), IndexOptions::default())
            .await
            .unwrap();

        assert_eq!(report.failed, keys(&["foo"]));
        assert_eq!(report.succeeded, keys(&["abc"]));
        assert_eq!(report.calls, 3);

        let calls = f.transport.calls();
        assert_eq!(calls[0].keys, keys(&["abc", "foo"]));
        assert_eq!(calls[1].keys, keys(&["abc"]));
        assert_eq!(calls[2].keys, keys(&["foo"]));
        assert_eq!(calls[2].endpoint, "http://solr1");
        assert_eq!(calls[2].options, IndexOptions::default());

        assert!(f.view("abc").target_processed(Target::Solr).is_some());
        let foo = f.view("foo");
        assert!(foo.target_processed(Target::Solr).is_none());
        assert!(foo.completion().is_retry_eligible());
    }

    #[tokio::test]
    async fn persistent_failure_marks_nothing() {
        let f = Fixture::new(&["abc", "foo"]);
        f.transport.always_respond(vec![503]);
        let report = f
            .reindexer(SyncConfig::default())
            .reindex(&f.views(&["abc", "foo"]), &endpoints(&["http://solr1"]), IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed, keys(&["abc", "foo"]));
        assert_eq!(report.calls, 3);
        assert_eq!(report.failures[0].reason, "status 503");
        for k in ["abc", "foo"] {
            assert_eq!(f.view(k).completion(), Completion::Pending);
        }
    }

    #[tokio::test]
    async fn bisection_on_larger_batch() {
        let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let f = Fixture::new(&names);
        f.transport.fail_key("f", 500);
        let report = f
            .reindexer(SyncConfig::default())
            .reindex(&f.views(&names), &endpoints(&["e1"]), IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed, keys(&["f"]));
        assert_eq!(report.succeeded.len(), 7);
        // [a..h] -> [a..d] ok, [e..h] -> [e,f] -> [e] ok, [f] fail; [g,h] ok
        assert_eq!(report.calls, 7);
    }

    #[tokio::test]
    async fn chunks_respect_max_batch_size() {
        let names = ["a", "b", "c", "d", "e"];
        let f = Fixture::new(&names);
        let config = SyncConfig {
            max_batch_size: 2,
            ..SyncConfig::default()
        };
        let report = f
            .reindexer(config)
            .reindex(&f.views(&names), &endpoints(&["e1"]), IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(report.calls, 3);
        let sizes: Vec<usize> = f.transport.calls().iter().map(|c| c.keys.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn parallel_waves_give_same_result() {
        let names = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let f = Fixture::new(&names);
        f.transport.fail_key("b", 500).fail_key("g", 502);
        let config = SyncConfig {
            parallelism: 4,
            ..SyncConfig::default()
        };
        let report = f
            .reindexer(config)
            .reindex(&f.views(&names), &endpoints(&["e1"]), IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed, keys(&["b", "g"]));
        assert_eq!(report.succeeded, keys(&["a", "c", "d", "e", "f", "h"]));
    }

    // ---- Endpoints ----

    #[tokio::test]
    async fn each_endpoint_gets_the_batch_in_order() {
        let f = Fixture::new(&["abc", "foo"]);
        f.reindexer(SyncConfig::default())
            .reindex(&f.views(&["abc", "foo"]), &endpoints(&["e1", "e2"]), IndexOptions::default())
            .await
            .unwrap();
        let order: Vec<String> = f.transport.calls().into_iter().map(|c| c.endpoint).collect();
        assert_eq!(order, vec!["e1", "e2"]);
    }

    #[tokio::test]
    async fn failure_on_one_endpoint_fails_the_record() {
        let f = Fixture::new(&["abc", "foo"]);
        f.transport.fail_key_on("e2", "abc", 503);
        let report = f
            .reindexer(SyncConfig::default())
            .reindex(&f.views(&["abc", "foo"]), &endpoints(&["e1", "e2"]), IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed, keys(&["abc"]));
        assert_eq!(report.failures[0].endpoint, "e2");
        assert!(f.view("abc").target_processed(Target::Solr).is_none());
        assert!(f.view("foo").target_processed(Target::Solr).is_some());
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_without_bisection() {
        let f = Fixture::new(&["abc", "foo", "bar"]);
        f.transport.set_unreachable("down");
        let report = f
            .reindexer(SyncConfig::default())
            .reindex(&f.views(&["abc", "foo", "bar"]), &endpoints(&["down"]), IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(report.calls, 1);
        assert_eq!(report.failed.len(), 3);
        assert!(report.failures[0].reason.contains("unreachable"));
        assert!(f.view("abc").completion().is_retry_eligible());
    }

    // ---- Terminal failures ----

    #[tokio::test]
    async fn ignore_errors_marks_failures_terminal() {
        let f = Fixture::new(&["abc", "foo"]);
        f.transport.fail_key("foo", 503);
        let options = IndexOptions {
            commit: false,
            ignore_errors: true,
        };
        let report = f
            .reindexer(SyncConfig::default())
            .reindex(&f.views(&["abc", "foo"]), &endpoints(&["http://solr1"]), options)
            .await
            .unwrap();
        assert_eq!(report.failed, keys(&["foo"]));

        let foo = f.view("foo");
        assert!(foo.processed().is_some());
        assert!(foo.target_processed(Target::Solr).is_some());
        assert_eq!(foo.status(), Some("solr-failed: http://solr1 status 503"));
        assert!(foo.completion().is_failed());

        let abc = f.view("abc");
        assert_eq!(abc.status(), None);
        assert!(abc.processed().is_none());
    }

    #[tokio::test]
    async fn duplicate_input_keys_reported_once() {
        let f = Fixture::new(&["abc"]);
        let mut views = f.views(&["abc"]);
        views.extend(f.views(&["abc"]));
        let report = f
            .reindexer(SyncConfig::default())
            .reindex(&views, &endpoints(&["e"]), IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(report.succeeded, keys(&["abc"]));
    }

    // ---- Properties ----

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(48))]

            #[test]
            fn bisection_isolates_exactly_the_failing_keys(
                n in 1usize..24,
                failing in prop::collection::btree_set(0usize..24, 0..6),
                parallelism in 1usize..4,
            ) {
                let names: Vec<String> = (0..n).map(|i| format!("k{i:02}")).collect();
                let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                let f = Fixture::new(&refs);
                let bad: Vec<&str> = failing
                    .iter()
                    .filter(|i| **i < n)
                    .map(|i| refs[*i])
                    .collect();
                for k in &bad {
                    f.transport.fail_key(*k, 503);
                }

                let config = SyncConfig { parallelism, ..SyncConfig::default() };
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let report = rt
                    .block_on(f.reindexer(config).reindex(
                        &f.views(&refs),
                        &endpoints(&["e"]),
                        IndexOptions::default(),
                    ))
                    .unwrap();

                prop_assert_eq!(report.failed, keys(&bad));
                prop_assert_eq!(report.succeeded.len(), n - bad.len());
                if bad.is_empty() {
                    prop_assert_eq!(report.calls, 1);
                }
                for k in &refs {
                    let solr = f.view(k).target_processed(Target::Solr).is_some();
                    prop_assert_eq!(solr, !bad.contains(k));
                }
            }
        }
    }
}
