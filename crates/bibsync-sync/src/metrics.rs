use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::transport::MetricsSink;
use crate::types::{MetricsOp, MetricsRow, MetricsSyncReport, RowError, RowStatus};

/// Writes pre-classified metrics rows to the metrics database.
///
/// Classification into insert and update sets belongs to the caller. Each
/// set goes out as one bulk call. If the bulk call fails, the set is retried
/// one row at a time so the report names exactly the rows that fail. If it
/// answers with fewer statuses than rows, the answered prefix is kept and
/// only the unanswered rows are retried.
pub struct MetricsSynchronizer {
    sink: Arc<dyn MetricsSink>,
}

impl MetricsSynchronizer {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    /// Insert `batch_insert`, update `batch_update`.
    ///
    /// Does not stamp anything; callers mark the succeeded keys.
    pub async fn sync(
        &self,
        batch_insert: &[MetricsRow],
        batch_update: &[MetricsRow],
    ) -> SyncResult<MetricsSyncReport> {
        let mut report = MetricsSyncReport::default();
        self.run(MetricsOp::Insert, batch_insert, &mut report).await;
        self.run(MetricsOp::Update, batch_update, &mut report).await;
        info!(
            inserted = batch_insert.len(),
            updated = batch_update.len(),
            succeeded = report.succeeded.len(),
            errors = report.errors.len(),
            fallbacks = report.fallbacks,
            "metrics sync finished"
        );
        Ok(report)
    }

    async fn run(&self, op: MetricsOp, rows: &[MetricsRow], report: &mut MetricsSyncReport) {
        if rows.is_empty() {
            return;
        }
        match self.call(op, rows).await {
            Ok(statuses) if statuses.len() == rows.len() => {
                debug!(op = %op, rows = rows.len(), "bulk metrics call answered");
                collect(op, rows.iter().zip(statuses), report);
            }
            Ok(statuses) => {
                let answered = statuses.len().min(rows.len());
                warn!(
                    op = %op,
                    expected = rows.len(),
                    got = statuses.len(),
                    "bulk status count mismatch; keeping answered rows"
                );
                collect(op, rows[..answered].iter().zip(statuses), report);
                if answered < rows.len() {
                    self.fallback(op, &rows[answered..], report).await;
                }
            }
            Err(err) => {
                warn!(op = %op, rows = rows.len(), error = %err, "bulk metrics call failed; retrying per row");
                self.fallback(op, rows, report).await;
            }
        }
    }

    async fn fallback(&self, op: MetricsOp, rows: &[MetricsRow], report: &mut MetricsSyncReport) {
        report.fallbacks += 1;
        for row in rows {
            let status = match self.call(op, std::slice::from_ref(row)).await {
                Ok(mut statuses) if statuses.len() == 1 => statuses.remove(0),
                Ok(statuses) => RowStatus::Failed(format!("expected 1 status, got {}", statuses.len())),
                Err(err) => RowStatus::Failed(err.to_string()),
            };
            collect(op, std::iter::once((row, status)), report);
        }
    }

    async fn call(&self, op: MetricsOp, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>> {
        match op {
            MetricsOp::Insert => self.sink.insert(rows).await,
            MetricsOp::Update => self.sink.update(rows).await,
        }
    }
}

impl std::fmt::Debug for MetricsSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsSynchronizer").finish_non_exhaustive()
    }
}

fn collect<'a>(
    op: MetricsOp,
    outcomes: impl Iterator<Item = (&'a MetricsRow, RowStatus)>,
    report: &mut MetricsSyncReport,
) {
    for (row, status) in outcomes {
        match status {
            RowStatus::Ok => report.succeeded.push(row.key.clone()),
            RowStatus::Failed(reason) => report.errors.push(RowError {
                op,
                row: row.clone(),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::memory::InMemoryMetricsSink;
    use async_trait::async_trait;
    use bibsync_types::RecordKey;
    use serde_json::json;

    fn row(key: &str, values: serde_json::Value) -> MetricsRow {
        MetricsRow::new(RecordKey::from(key), values)
    }

    fn keys(list: &[&str]) -> Vec<RecordKey> {
        list.iter().map(|s| RecordKey::from(*s)).collect()
    }

    #[tokio::test]
    async fn insert_and_update_succeed() {
        let sink = Arc::new(InMemoryMetricsSink::new());
        let sync = MetricsSynchronizer::new(sink.clone());
        let report = sync
            .sync(
                &[row("abc", json!({"author_num": 1, "bibcode": "abc"}))],
                &[row("foo", json!({"bibcode": "foo", "citation_num": 6}))],
            )
            .await
            .unwrap();
        assert_eq!(report.succeeded, keys(&["abc", "foo"]));
        assert!(report.errors.is_empty());
        assert_eq!(report.fallbacks, 0);
        assert_eq!(sink.row(&RecordKey::from("foo")), Some(json!({"bibcode": "foo", "citation_num": 6})));
        assert_eq!(
            sink.calls(),
            vec![(MetricsOp::Insert, keys(&["abc"])), (MetricsOp::Update, keys(&["foo"]))]
        );
    }

    #[tokio::test]
    async fn row_failures_are_enumerated() {
        let sink = Arc::new(InMemoryMetricsSink::new());
        sink.reject("bad");
        let sync = MetricsSynchronizer::new(sink.clone());
        let report = sync
            .sync(&[row("a", json!(1)), row("bad", json!(2)), row("c", json!(3))], &[])
            .await
            .unwrap();
        assert_eq!(report.succeeded, keys(&["a", "c"]));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row.key, "bad");
        assert_eq!(report.errors[0].op, MetricsOp::Insert);
        assert_eq!(report.errors[0].row.values, json!(2));
    }

    #[tokio::test]
    async fn bulk_failure_falls_back_per_row() {
        let sink = Arc::new(InMemoryMetricsSink::new());
        sink.fail_bulk(true).reject("b");
        let sync = MetricsSynchronizer::new(sink.clone());
        let report = sync
            .sync(&[row("a", json!(1)), row("b", json!(2))], &[row("c", json!(3))])
            .await
            .unwrap();
        assert_eq!(report.fallbacks, 1);
        assert_eq!(report.succeeded, keys(&["a", "c"]));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row.key, "b");
        // bulk insert, two single inserts, one update
        assert_eq!(sink.calls().len(), 4);
    }

    #[tokio::test]
    async fn empty_sets_make_no_calls() {
        let sink = Arc::new(InMemoryMetricsSink::new());
        let sync = MetricsSynchronizer::new(sink.clone());
        let report = sync.sync(&[], &[]).await.unwrap();
        assert_eq!(report, MetricsSyncReport::default());
        assert!(sink.calls().is_empty());
    }

    struct ShortSink;

    #[async_trait]
    impl MetricsSink for ShortSink {
        async fn insert(&self, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>> {
            if rows.len() > 1 {
                Ok(vec![RowStatus::Ok])
            } else {
                Err(SyncError::unreachable("metrics", "timeout"))
            }
        }

        async fn update(&self, _rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn short_answer_retries_only_unanswered_rows() {
        let sync = MetricsSynchronizer::new(Arc::new(ShortSink));
        let report = sync
            .sync(&[row("a", json!(1)), row("b", json!(2))], &[row("c", json!(3))])
            .await
            .unwrap();
        assert_eq!(report.fallbacks, 2);
        assert_eq!(report.succeeded, keys(&["a"]));
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].row.key, "b");
        assert!(report.errors[0].reason.contains("timeout"));
        assert_eq!(report.errors[1].row.key, "c");
        assert_eq!(report.errors[1].reason, "expected 1 status, got 0");
    }

    /// Applies every row but loses the last status of a bulk insert.
    struct DroppingSink {
        inner: InMemoryMetricsSink,
    }

    #[async_trait]
    impl MetricsSink for DroppingSink {
        async fn insert(&self, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>> {
            let mut statuses = self.inner.insert(rows).await?;
            if rows.len() > 1 {
                statuses.pop();
            }
            Ok(statuses)
        }

        async fn update(&self, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>> {
            self.inner.update(rows).await
        }
    }

    #[tokio::test]
    async fn applied_rows_with_answers_are_not_resent() {
        let sink = Arc::new(DroppingSink {
            inner: InMemoryMetricsSink::new(),
        });
        let sync = MetricsSynchronizer::new(sink.clone());
        let report = sync
            .sync(&[row("a", json!(1)), row("b", json!(2)), row("c", json!(3))], &[])
            .await
            .unwrap();

        assert_eq!(report.succeeded, keys(&["a", "b"]));
        assert_eq!(report.fallbacks, 1);
        // Only "c" went out again, and the sink already holds it.
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row.key, "c");
        assert_eq!(
            sink.inner.calls(),
            vec![
                (MetricsOp::Insert, keys(&["a", "b", "c"])),
                (MetricsOp::Insert, keys(&["c"])),
            ]
        );
        assert_eq!(sink.inner.row(&RecordKey::from("a")), Some(json!(1)));
    }

    struct ChattySink;

    #[async_trait]
    impl MetricsSink for ChattySink {
        async fn insert(&self, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>> {
            Ok(vec![RowStatus::Ok; rows.len() + 1])
        }

        async fn update(&self, rows: &[MetricsRow]) -> SyncResult<Vec<RowStatus>> {
            self.insert(rows).await
        }
    }

    #[tokio::test]
    async fn surplus_statuses_are_ignored() {
        let sync = MetricsSynchronizer::new(Arc::new(ChattySink));
        let report = sync.sync(&[row("a", json!(1)), row("b", json!(2))], &[]).await.unwrap();
        assert_eq!(report.succeeded, keys(&["a", "b"]));
        assert!(report.errors.is_empty());
        assert_eq!(report.fallbacks, 0);
    }
}
