//! Outbound synchronizer: assemble, validate, deliver with bounded retry,
//! then flag the row delivered.
//!
//! Per record the state moves `pending → sending → {delivered | pending}`.
//! A row only becomes delivered after a 2xx answer, and that flag is
//! committed before the next row is looked at.

pub mod error;
pub mod http_client;
pub mod retry;

use crate::config::SyncConfig;
use crate::models::{CanonicalPayload, RawRow, RunCounters};
use crate::normalizer::NormalizeContext;
use crate::payload::validator::{Validation, precheck, validate};
use crate::payload::{SourceSchema, assemble};
use crate::storage::Repository;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use self::error::{DeliveryError, SNAPSHOT_LEN, truncate};
use self::retry::RetryPolicy;

// ── Transport trait ───────────────────────────────────────────────────────────

/// Swappable valuation endpoint.
#[async_trait]
pub trait ValuationApi: Send + Sync {
    /// Submit one payload. `Ok` carries the 2xx status.
    async fn submit(&self, payload: &CanonicalPayload) -> Result<u16, DeliveryError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: DeliveryError },
    /// Structurally invalid; not sent.
    Rejected(Validation),
}

// ── Synchronizer ──────────────────────────────────────────────────────────────

pub struct Synchronizer<A: ValuationApi> {
    api: A,
    policy: RetryPolicy,
    ctx: NormalizeContext,
    pacing: Duration,
    jitter: Duration,
    precheck: bool,
    counters: RunCounters,
}

impl<A: ValuationApi> Synchronizer<A> {
    pub fn new(api: A, policy: RetryPolicy, ctx: NormalizeContext) -> Self {
        Self {
            api,
            policy,
            ctx,
            pacing: Duration::ZERO,
            jitter: Duration::ZERO,
            precheck: false,
            counters: RunCounters::default(),
        }
    }

    pub fn from_config(api: A, cfg: &SyncConfig, ctx: NormalizeContext) -> Self {
        Self {
            pacing: Duration::from_millis(cfg.pacing_ms),
            jitter: Duration::from_millis(cfg.pacing_jitter_ms),
            precheck: cfg.precheck,
            ..Self::new(api, RetryPolicy::from_config(cfg), ctx)
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    /// Deliver every pending row of one table, in store order.
    pub async fn sync_table(
        &mut self,
        store: &Repository,
        schema: &SourceSchema,
        scraped_on: Option<chrono::NaiveDate>,
    ) -> Result<RunCounters> {
        let before = self.counters;
        let rows = store.fetch_pending(schema, scraped_on)?;
        info!("[{}] {} pending rows", schema.label, rows.len());

        let mut retries = 0;
        for row in &rows {
            match self.process(store, schema, row).await? {
                RecordOutcome::Delivered { attempts } | RecordOutcome::Failed { attempts, .. } => {
                    retries += attempts.saturating_sub(1)
                }
                RecordOutcome::Rejected(_) => {}
            }
        }
        if retries > 0 {
            info!("[{}] {} retries needed", schema.label, retries);
        }

        Ok(RunCounters {
            to_send: self.counters.to_send - before.to_send,
            success: self.counters.success - before.success,
            fail: self.counters.fail - before.fail,
            skipped: self.counters.skipped - before.skipped,
        })
    }

    /// Process one row. Per-record failures are absorbed into the counters;
    /// only store errors are returned.
    pub async fn process(&mut self, store: &Repository, schema: &SourceSchema, row: &RawRow) -> Result<RecordOutcome> {
        let label = schema.label;
        let name = row.display_name();

        let Some(list_id) = row.list_id.as_deref() else {
            let v = Validation { missing: vec!["list_id"], invalid: vec![] };
            self.counters.skipped += 1;
            warn!("[{}] skip row without list_id ({}): {} | {}", label, name, v, self.counters);
            return Ok(RecordOutcome::Rejected(v));
        };

        let payload = assemble(schema, row, &self.ctx);

        let validation = validate(&payload);
        if !validation.is_sendable() {
            self.counters.skipped += 1;
            warn!("[{}] skip {} ({}): {} | {}", label, list_id, name, validation, self.counters);
            return Ok(RecordOutcome::Rejected(validation));
        }

        if self.precheck {
            let issues = precheck(&payload);
            if !issues.is_empty() {
                warn!("[{}] precheck {} ({}): {}", label, list_id, name, issues.join("; "));
            }
        }

        self.counters.to_send += 1;

        let api = &self.api;
        let body = &payload;
        let (result, attempts) = self
            .policy
            .run(move |attempt| async move {
                let r = api.submit(body).await;
                if let Err(e) = &r {
                    warn!("[{}] attempt {} for {} failed: {}", label, attempt, list_id, e);
                }
                r
            })
            .await;

        let outcome = match result {
            Ok(status) => {
                store.mark_delivered(schema, list_id)?;
                self.counters.success += 1;
                info!(
                    "[{}] ✓ {} ({}) HTTP {} after {} attempt(s) | {}",
                    label, list_id, name, status, attempts, self.counters
                );
                RecordOutcome::Delivered { attempts }
            }
            Err(e) => {
                self.counters.fail += 1;
                let snapshot = serde_json::to_string(&payload).unwrap_or_default();
                error!(
                    table = label,
                    list_id,
                    status = ?e.status(),
                    reasons = ?e.reasons(),
                    attempts,
                    payload = %truncate(&snapshot, SNAPSHOT_LEN),
                    "[{}] ✗ {} ({}) gave up: {} | {}",
                    label, list_id, name, e, self.counters
                );
                RecordOutcome::Failed { attempts, error: e }
            }
        };

        self.pace().await;
        Ok(outcome)
    }

    async fn pace(&self) {
        let pause = self.pacing + tokio_retry::strategy::jitter(self.jitter);
        if !pause.is_zero() {
            debug!("pacing {:?}", pause);
            tokio::time::sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeliveryStatus;
    use crate::payload::schema_for;
    use chrono::NaiveDate;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_ok;

    #[derive(Default)]
    struct FakeApi {
        script: Mutex<VecDeque<Result<u16, DeliveryError>>>,
        calls: AtomicUsize,
    }

    impl FakeApi {
        fn scripted(answers: Vec<Result<u16, DeliveryError>>) -> Self {
            Self { script: Mutex::new(answers.into()), calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ValuationApi for FakeApi {
        async fn submit(&self, _payload: &CanonicalPayload) -> Result<u16, DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(200))
        }
    }

    fn rejected(status: u16) -> DeliveryError {
        DeliveryError::Rejected { status, reasons: vec!["price: must be positive".into()] }
    }

    fn sync(api: FakeApi) -> Synchronizer<FakeApi> {
        let ctx = NormalizeContext::new(NaiveDate::from_ymd_opt(2025, 10, 19).unwrap(), false);
        Synchronizer::new(api, RetryPolicy::fixed(3, Duration::ZERO), ctx)
    }

    fn listing(id: &str) -> RawRow {
        [
            ("list_id", id),
            ("name", "Residensi Sentral"),
            ("url", "https://www.iproperty.com.my/property/setapak/sale-108123456/"),
            ("area", "Setapak"),
            ("state", "Kuala Lumpur"),
            ("price", "450000"),
            ("bed_rooms", "3"),
            ("built_up_size", "950 sq. ft."),
            ("lat", "3.19"),
            ("lng", "101.72"),
            ("data_scraping_date", "2025-10-19"),
        ]
        .into_iter()
        .collect()
    }

    fn store_with(rows: &[RawRow]) -> (Repository, &'static SourceSchema) {
        let store = Repository::open_in_memory().unwrap();
        store.run_migrations().unwrap();
        let schema = schema_for("iproperty").unwrap();
        store.insert_rows(schema, rows).unwrap();
        (store, schema)
    }

    #[tokio::test]
    async fn test_success_marks_row_delivered() {
        let (store, schema) = store_with(&[listing("100")]);
        let mut s = sync(FakeApi::scripted(vec![Err(rejected(503)), Ok(201)]));

        let rows = store.fetch_pending(schema, None).unwrap();
        let row = &rows[0];
        let outcome = assert_ok!(s.process(&store, schema, row).await);

        assert_eq!(outcome, RecordOutcome::Delivered { attempts: 2 });
        assert_eq!(store.status_of(schema, "100").unwrap(), Some(DeliveryStatus::Delivered));
        assert_eq!(s.counters(), RunCounters { to_send: 1, success: 1, fail: 0, skipped: 0 });
    }

    #[tokio::test]
    async fn test_exhausted_retries_leave_row_pending() {
        let (store, schema) = store_with(&[listing("100")]);
        let mut s = sync(FakeApi::scripted(vec![Err(rejected(422)); 3]));

        let rows = store.fetch_pending(schema, None).unwrap();
        let row = &rows[0];
        let outcome = s.process(&store, schema, row).await.unwrap();

        assert_eq!(outcome, RecordOutcome::Failed { attempts: 3, error: rejected(422) });
        assert_eq!(s.api().calls(), 3);
        assert_eq!(store.status_of(schema, "100").unwrap(), Some(DeliveryStatus::Pending));
        assert_eq!(s.counters().fail, 1);
    }

    #[tokio::test]
    async fn test_invalid_row_is_never_sent() {
        let mut bad = listing("100");
        bad.fields.remove("url");
        let (store, schema) = store_with(&[bad]);
        let mut s = sync(FakeApi::default());

        let rows = store.fetch_pending(schema, None).unwrap();
        let row = &rows[0];
        match s.process(&store, schema, row).await.unwrap() {
            RecordOutcome::Rejected(v) => assert!(v.missing.contains(&"listing_url")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(s.api().calls(), 0);
        assert_eq!(s.counters(), RunCounters { skipped: 1, ..RunCounters::default() });
    }

    #[tokio::test]
    async fn test_skips_feed_live_counters() {
        let (store, schema) = store_with(&[listing("7")]);
        let mut s = sync(FakeApi::default());

        let mut anonymous = listing("100");
        anonymous.list_id = None;
        anonymous.fields.remove("list_id");
        match s.process(&store, schema, &anonymous).await.unwrap() {
            RecordOutcome::Rejected(v) => assert_eq!(v.missing, vec!["list_id"]),
            other => panic!("unexpected outcome {:?}", other),
        }
        s.process(&store, schema, &listing("7")).await.unwrap();

        assert_eq!(s.api().calls(), 1);
        assert_eq!(s.counters().to_string(), "to_send:1 success:1 fail:0 skipped:1");
    }

    #[tokio::test]
    async fn test_table_run_is_idempotent() {
        let (store, schema) = store_with(&[listing("1"), listing("2"), listing("3")]);
        let mut s = sync(FakeApi::scripted(vec![Ok(200), Err(rejected(500)), Err(rejected(500)), Err(rejected(500))]));

        let first = s.sync_table(&store, schema, None).await.unwrap();
        assert_eq!(first, RunCounters { to_send: 3, success: 2, fail: 1, skipped: 0 });

        // only the failed row is selected again
        let pending: Vec<_> = store
            .fetch_pending(schema, None)
            .unwrap()
            .into_iter()
            .filter_map(|r| r.list_id)
            .collect();
        assert_eq!(pending, vec!["2"]);

        let second = s.sync_table(&store, schema, None).await.unwrap();
        assert_eq!(second, RunCounters { to_send: 1, success: 1, fail: 0, skipped: 0 });
        assert_eq!(s.api().calls(), 6);
        assert!(store.fetch_pending(schema, None).unwrap().is_empty());
    }
}
