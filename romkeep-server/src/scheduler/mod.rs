//! Batch sync scheduler.
//!
//! Top level of the two-level scheduler: serializes whole-partition
//! sync batches (one running, rest FIFO-queued) on top of the
//! single-concurrency [`TaskRunner`] that serializes individual
//! lookup/fetch tasks. Cheap to clone; one instance lives in
//! `AppState`, no global singleton.

pub mod runner;

use crate::services::enricher::{self, EnrichContext};
use crate::services::reaper;
use crate::services::reconciler;
use crate::services::scanner::RomScanner;
use crate::types::SyncOptions;
use romkeep_common::RingLog;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub use runner::TaskRunner;

/// Pause between a batch finishing and the next one starting
const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// `stop()` forces the scheduler back to Idle after this long even if
/// the in-flight task has not yielded
const STOP_GRACE: Duration = Duration::from_secs(10);

/// One requested sync pass over a partition
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub system: String,
    pub options: SyncOptions,
    /// Restrict the pass to a single filename (forced refresh)
    pub only: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedState {
    Idle,
    Running(String),
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

/// Point-in-time status projection for the HTTP boundary
#[derive(Debug, Serialize)]
pub struct SyncStatusView {
    pub state: String,
    pub running: Option<String>,
    pub queued: Vec<String>,
    pub progress: Progress,
    pub log: Vec<String>,
}

struct SchedInner {
    state: SchedState,
    queue: VecDeque<SyncRequest>,
    log: RingLog,
    progress: Progress,
    cancel: CancellationToken,
    /// Bumped each time a batch driver claims the running slot. A driver
    /// that outlives its claim (stop grace expired while its task was
    /// still in flight) sees a newer value and must not touch the state.
    generation: u64,
}

#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Mutex<SchedInner>>,
    runner: Arc<TaskRunner>,
    scanner: Arc<RomScanner>,
    ctx: Arc<EnrichContext>,
    debounce: Duration,
}

impl SyncScheduler {
    pub fn new(runner: Arc<TaskRunner>, scanner: Arc<RomScanner>, ctx: Arc<EnrichContext>) -> Self {
        Self::with_debounce(runner, scanner, ctx, DEBOUNCE_DELAY)
    }

    pub fn with_debounce(
        runner: Arc<TaskRunner>,
        scanner: Arc<RomScanner>,
        ctx: Arc<EnrichContext>,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedInner {
                state: SchedState::Idle,
                queue: VecDeque::new(),
                log: RingLog::default(),
                progress: Progress::default(),
                cancel: CancellationToken::new(),
                generation: 0,
            })),
            runner,
            scanner,
            ctx,
            debounce,
        }
    }

    /// Queue a sync request. A request for a system that is already
    /// running or already queued (with the same filename restriction)
    /// is ignored; otherwise it starts immediately or joins the queue.
    pub fn enqueue(&self, request: SyncRequest) -> EnqueueOutcome {
        let mut inner = self.lock();

        let running_same = matches!(&inner.state,
            SchedState::Running(system) if *system == request.system && request.only.is_none());
        let queued_same = inner
            .queue
            .iter()
            .any(|q| q.system == request.system && q.only == request.only);

        if running_same || queued_same {
            tracing::debug!(system = %request.system, "Sync request ignored, already pending");
            return EnqueueOutcome::Ignored;
        }

        if inner.state == SchedState::Idle {
            // State flips before the task spawns so a racing duplicate
            // enqueue observes Running
            inner.state = SchedState::Running(request.system.clone());
            inner.cancel = CancellationToken::new();
            inner.progress = Progress::default();
            inner.generation += 1;
            inner.log.push(format!("Sync started: {}", request.system));
            let generation = inner.generation;
            drop(inner);

            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.run_batches(request, generation).await });
        } else {
            inner.log.push(format!("Sync queued: {}", request.system));
            inner.queue.push_back(request);
        }

        EnqueueOutcome::Accepted
    }

    /// Abort the current batch and drop the queue. In-flight work
    /// finishes; the state returns to Idle once the batch driver
    /// notices, or after a grace period at the latest.
    pub fn stop(&self) {
        let (cancel, generation) = {
            let mut inner = self.lock();
            if inner.state == SchedState::Idle {
                return;
            }
            inner.state = SchedState::Stopping;
            inner.queue.clear();
            inner.log.push("Sync stop requested".to_string());
            (inner.cancel.clone(), inner.generation)
        };

        self.runner.clear();
        cancel.cancel();

        let scheduler = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(STOP_GRACE).await;
            let mut inner = scheduler.lock();
            if inner.generation == generation && inner.state == SchedState::Stopping {
                inner.state = SchedState::Idle;
            }
        });
    }

    pub fn status(&self) -> SyncStatusView {
        let inner = self.lock();
        let (state, running) = match &inner.state {
            SchedState::Idle => ("idle", None),
            SchedState::Running(system) => ("running", Some(system.clone())),
            SchedState::Stopping => ("stopping", None),
        };
        SyncStatusView {
            state: state.to_string(),
            running,
            queued: inner.queue.iter().map(|q| q.system.clone()).collect(),
            progress: inner.progress,
            log: inner.log.lines(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.lock().state != SchedState::Idle
    }

    /// Batch driver: runs the initial request, then keeps draining the
    /// queue until it is empty or a newer driver has taken the slot.
    /// A loop rather than a re-spawn per batch keeps the future
    /// non-recursive.
    async fn run_batches(self, request: SyncRequest, generation: u64) {
        let mut request = request;
        loop {
            let cancel = self.lock().cancel.clone();

            if let Err(e) = self.execute_batch(&request, &cancel).await {
                tracing::warn!(system = %request.system, error = %e, "Sync batch failed");
                self.lock()
                    .log
                    .push(format!("Sync failed: {}: {}", request.system, e));
            }

            tokio::time::sleep(self.debounce).await;

            match self.finish_batch(generation) {
                Some(next) => request = next,
                None => return,
            }
        }
    }

    async fn execute_batch(
        &self,
        request: &SyncRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        let plan = reconciler::reconcile(
            &self.ctx.db,
            &self.scanner,
            &request.system,
            &request.options,
            request.only.as_deref(),
        )
        .await?;

        reconciler::apply_deletes(&self.ctx.db, &plan).await?;
        if !plan.to_delete.is_empty() {
            self.lock()
                .log
                .push(format!("Removed {} vanished entries", plan.to_delete.len()));
        }

        let work = plan.work_list();
        self.lock().progress = Progress {
            current: 0,
            total: work.len(),
        };

        let mut receivers = Vec::with_capacity(work.len());
        for filename in work {
            if cancel.is_cancelled() {
                break;
            }
            let ctx = Arc::clone(&self.ctx);
            let system = request.system.clone();
            let options = request.options.clone();
            let cancel = cancel.clone();
            let scheduler = self.clone();

            receivers.push(self.runner.submit(async move {
                if let Err(e) =
                    enricher::enrich_file(&ctx, &system, &filename, &options, &cancel).await
                {
                    tracing::warn!(system = %system, filename = %filename, error = %e, "Enrichment failed");
                    scheduler
                        .lock()
                        .log
                        .push(format!("Failed: {}/{}: {}", system, filename, e));
                }
                scheduler.lock().progress.current += 1;
            }));
        }

        // Err here means the task was discarded by stop(), which is fine
        for rx in receivers {
            let _ = rx.await;
        }

        if !cancel.is_cancelled() {
            let stats = reaper::sweep(&self.ctx.db, &self.ctx.root, &request.system).await?;
            self.lock().log.push(format!(
                "Sync finished: {} ({} assets reaped)",
                request.system, stats.removed
            ));
        } else {
            self.lock()
                .log
                .push(format!("Sync aborted: {}", request.system));
        }

        Ok(())
    }

    /// Release the running slot or hand the driver its next queued
    /// request. A driver whose generation is stale no longer owns the
    /// slot (the stop grace period expired while it was in flight and a
    /// newer batch may have started) and must leave the state alone.
    fn finish_batch(&self, generation: u64) -> Option<SyncRequest> {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!("Stale batch driver retired");
            return None;
        }

        match inner.queue.pop_front() {
            Some(request) => {
                inner.state = SchedState::Running(request.system.clone());
                inner.cancel = CancellationToken::new();
                inner.progress = Progress::default();
                inner.log.push(format!("Sync started: {}", request.system));
                Some(request)
            }
            None => {
                inner.state = SchedState::Idle;
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformTable;
    use crate::services::media::MediaFetcher;
    use crate::services::scraper::MetadataResolver;
    use romkeep_common::config::TomlConfig;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn scheduler_fixture(root: &TempDir) -> SyncScheduler {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        crate::db::create_tables(&pool).await.unwrap();

        let ctx = Arc::new(EnrichContext {
            db: pool.clone(),
            resolver: Arc::new(MetadataResolver::offline()),
            fetcher: Arc::new(MediaFetcher::new(root.path(), pool)),
            platforms: PlatformTable::load(&TomlConfig::default()),
            root: root.path().to_path_buf(),
        });
        let scanner = Arc::new(RomScanner::with_ttl(root.path(), Duration::ZERO));
        let runner = TaskRunner::start(Duration::ZERO);
        SyncScheduler::with_debounce(runner, scanner, ctx, Duration::ZERO)
    }

    fn request(system: &str) -> SyncRequest {
        SyncRequest {
            system: system.to_string(),
            options: SyncOptions::default(),
            only: None,
        }
    }

    #[tokio::test]
    async fn test_stale_driver_does_not_release_newer_batch() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("snes")).unwrap();
        let scheduler = scheduler_fixture(&root).await;

        // A driver claimed generation 1, then stalled long enough for
        // the stop grace period to return the scheduler to Idle.
        let stale = {
            let mut inner = scheduler.lock();
            inner.generation += 1;
            inner.state = SchedState::Idle;
            inner.generation
        };

        // A newer batch takes the slot in the meantime.
        assert_eq!(scheduler.enqueue(request("snes")), EnqueueOutcome::Accepted);
        assert_eq!(
            scheduler.lock().state,
            SchedState::Running("snes".to_string())
        );

        // The stalled driver finally completes. It must neither free
        // the running slot nor steal a queued request, and mutual
        // exclusion for the new batch's partition must hold.
        assert!(scheduler.finish_batch(stale).is_none());
        assert_eq!(
            scheduler.lock().state,
            SchedState::Running("snes".to_string())
        );
        assert_eq!(scheduler.enqueue(request("snes")), EnqueueOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_current_driver_hands_off_queued_request() {
        let root = TempDir::new().unwrap();
        let scheduler = scheduler_fixture(&root).await;

        let generation = {
            let mut inner = scheduler.lock();
            inner.generation += 1;
            inner.state = SchedState::Running("nes".to_string());
            inner.queue.push_back(request("snes"));
            inner.generation
        };

        let next = scheduler
            .finish_batch(generation)
            .expect("queued request should be handed to the same driver");
        assert_eq!(next.system, "snes");
        assert_eq!(
            scheduler.lock().state,
            SchedState::Running("snes".to_string())
        );

        assert!(scheduler.finish_batch(generation).is_none());
        assert_eq!(scheduler.lock().state, SchedState::Idle);
    }
}
