//! # Queue Engine
//!
//! The synchronization engine the embedding app talks to. One instance
//! owns the cached snapshot, the active backend, and the polling loop.
//!
//! ## Refresh Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          refresh()                                      │
//! │                                                                         │
//! │  1. single-flight gate (concurrent callers coalesce to one cycle)       │
//! │  2. session policy: no token / local token ──► simulator, latched       │
//! │  3. fetch wallet + orders concurrently, then fan out per-order details  │
//! │  4. persist the new snapshot, then swap it in atomically                │
//! │                                                                         │
//! │  auth failure        ──► switch to simulator, latch, skip the cycle     │
//! │  any other failure   ──► record error, last good snapshot stays visible │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The fallback is one-way for the life of the engine: once the
//! simulator is active the engine never probes the remote service
//! again. Reads never touch the network; they are served from the
//! in-memory snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures_util::future::try_join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use fila_backend::{
    BackendKind, QueueBackend, RemoteBackend, SimulatorBackend,
};
use fila_core::{
    ApprovalStatus, AssetUpload, CacheSnapshot, NewOrder, Order, OrderAsset, OrderDetail,
    OrderPatch, OrderStatus, PendingApproval, QueueResult, SubmitOutcome, Topup, Wallet,
    SNAPSHOT_VERSION,
};
use fila_store::keys::{LOCAL_SESSION_PREFIX, SESSION_TOKEN_KEY};
use fila_store::{CacheStore, Clock, KvStore, SystemClock};

use crate::config::EngineConfig;
use crate::status::QueueStatus;

// =============================================================================
// Single-Flight Gate
// =============================================================================

/// Releases the refresh gate on drop, so early returns and errors
/// cannot leave it stuck.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlightGuard(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Queue Engine
// =============================================================================

struct EngineInner {
    config: EngineConfig,
    storage: Arc<dyn KvStore>,
    cache: CacheStore,
    clock: Arc<dyn Clock>,

    /// Active backend. Swapped at most once, by the fallback policy.
    backend: RwLock<Arc<dyn QueueBackend>>,

    /// Last good snapshot. Replaced wholesale after each successful
    /// refresh; readers clone the `Arc` and never block on a cycle.
    snapshot: RwLock<Arc<CacheSnapshot>>,

    refreshing: AtomicBool,
    fallback_latched: AtomicBool,
    stopped: AtomicBool,

    /// Set after the first refresh attempt completes.
    ready: AtomicBool,

    last_error: RwLock<Option<String>>,
    notice: RwLock<Option<String>>,

    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the queue synchronization engine. Cheap to clone; all
/// clones share the same state.
#[derive(Clone)]
pub struct QueueEngine {
    inner: Arc<EngineInner>,
}

impl QueueEngine {
    /// Builds the engine: validates configuration, selects the initial
    /// backend (remote when a base URL is configured, simulator
    /// otherwise), and hydrates the snapshot from the persisted cache.
    pub async fn new(config: EngineConfig, storage: Arc<dyn KvStore>) -> QueueResult<Self> {
        let backend: Arc<dyn QueueBackend> = match config.validated_base_url()? {
            Some(url) => {
                info!(base_url = %url, "Starting queue engine against remote backend");
                Arc::new(RemoteBackend::new(url, storage.clone())?)
            }
            None => {
                info!("No base URL configured, starting queue engine on the simulator");
                Arc::new(SimulatorBackend::new(storage.clone()))
            }
        };
        Self::with_backend(config, storage, backend, Arc::new(SystemClock)).await
    }

    /// Builds the engine on an explicit backend and clock, skipping
    /// selection.
    pub async fn with_backend(
        config: EngineConfig,
        storage: Arc<dyn KvStore>,
        backend: Arc<dyn QueueBackend>,
        clock: Arc<dyn Clock>,
    ) -> QueueResult<Self> {
        let cache = CacheStore::new(storage.clone());
        let snapshot = cache.load().await?;
        debug!(
            orders = snapshot.orders.len(),
            last_sync = ?snapshot.last_sync,
            "Hydrated snapshot from cache"
        );

        Ok(QueueEngine {
            inner: Arc::new(EngineInner {
                config,
                storage,
                cache,
                clock,
                backend: RwLock::new(backend),
                snapshot: RwLock::new(Arc::new(snapshot)),
                refreshing: AtomicBool::new(false),
                fallback_latched: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                ready: AtomicBool::new(false),
                last_error: RwLock::new(None),
                notice: RwLock::new(None),
                shutdown_tx: Mutex::new(None),
                poll_handle: Mutex::new(None),
            }),
        })
    }

    fn backend(&self) -> Arc<dyn QueueBackend> {
        self.inner.backend.read().expect("backend lock poisoned").clone()
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Runs one refresh cycle against the active backend.
    ///
    /// Concurrent callers coalesce: while a cycle is in flight, further
    /// calls return immediately without touching the backend. On
    /// failure the last good snapshot stays visible and the error is
    /// recorded in [`status`](Self::status).
    pub async fn refresh(&self) -> QueueResult<()> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(_guard) = FlightGuard::acquire(&self.inner.refreshing) else {
            debug!("Refresh already in flight, coalescing");
            return Ok(());
        };

        if self.apply_session_policy().await? {
            // Backend just switched; this cycle is skipped and the
            // next one runs against the simulator.
            self.inner.ready.store(true, Ordering::SeqCst);
            return Ok(());
        }

        let backend = self.backend();
        let result = match self.run_cycle(&backend).await {
            Ok(()) => Ok(()),
            Err(e)
                if e.is_auth_failure()
                    && backend.kind() == BackendKind::Remote
                    && !self.inner.config.require_remote =>
            {
                warn!(error = %e, "Remote backend rejected the session, falling back to the simulator");
                self.switch_to_simulator("Your session has expired. The queue is running locally.");
                // Skip the rest of the cycle; the next refresh serves
                // the simulator.
                Ok(())
            }
            Err(e) => Err(e),
        };

        self.inner.ready.store(true, Ordering::SeqCst);
        match result {
            Ok(()) => {
                *self.inner.last_error.write().expect("error lock poisoned") = None;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Refresh cycle failed, keeping last good snapshot");
                *self.inner.last_error.write().expect("error lock poisoned") =
                    Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Falls back to the simulator before the first request when no
    /// live session can possibly succeed: the token is absent or is a
    /// local development token. Returns true when the backend was
    /// switched, so the caller skips the current cycle.
    async fn apply_session_policy(&self) -> QueueResult<bool> {
        if self.backend().kind() != BackendKind::Remote || self.inner.config.require_remote {
            return Ok(false);
        }

        let token = self.inner.storage.get(SESSION_TOKEN_KEY).await?;
        let session_is_local = match &token {
            None => true,
            Some(t) => t.starts_with(LOCAL_SESSION_PREFIX),
        };

        if session_is_local {
            info!("No live session token, switching to the simulator without probing the remote");
            self.switch_to_simulator("No account session. The queue is running locally.");
            return Ok(true);
        }
        Ok(false)
    }

    /// One-way switch to the simulator. The engine never goes back to
    /// the remote backend for its lifetime.
    fn switch_to_simulator(&self, notice: &str) {
        let simulator: Arc<dyn QueueBackend> =
            Arc::new(SimulatorBackend::new(self.inner.storage.clone()));
        *self.inner.backend.write().expect("backend lock poisoned") = simulator;
        self.inner.fallback_latched.store(true, Ordering::SeqCst);
        *self.inner.notice.write().expect("notice lock poisoned") = Some(notice.to_string());
    }

    /// Fetches a complete snapshot from the backend, persists it, and
    /// swaps it in. The in-memory snapshot is only replaced after the
    /// whole cycle succeeded; a partial fetch changes nothing.
    async fn run_cycle(&self, backend: &Arc<dyn QueueBackend>) -> QueueResult<()> {
        let (wallet, orders) = tokio::try_join!(backend.wallet(), backend.list_orders())?;

        let fetched =
            try_join_all(orders.iter().map(|o| backend.order_detail(&o.id))).await?;
        let mut details = HashMap::with_capacity(fetched.len());
        for detail in fetched {
            details.insert(detail.order.id.clone(), detail);
        }

        let snapshot = CacheSnapshot {
            version: SNAPSHOT_VERSION,
            wallet,
            orders,
            details,
            last_sync: Some(self.inner.clock.now()),
        };

        self.inner.cache.save(&snapshot).await?;
        *self.inner.snapshot.write().expect("snapshot lock poisoned") = Arc::new(snapshot);
        debug!("Refresh cycle complete");
        Ok(())
    }

    // =========================================================================
    // Read Surface (served from the snapshot, never from the network)
    // =========================================================================

    /// The last good snapshot.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.inner.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.snapshot().orders.clone()
    }

    pub fn order(&self, id: &str) -> Option<Order> {
        self.snapshot().order(id).cloned()
    }

    /// Cached detail for one order, if a refresh has fetched it.
    pub fn order_detail(&self, id: &str) -> Option<OrderDetail> {
        self.snapshot().details.get(id).cloned()
    }

    pub fn wallet(&self) -> Wallet {
        self.snapshot().wallet.clone()
    }

    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.snapshot().pending_approvals()
    }

    pub fn count_by_status(&self, status: OrderStatus) -> usize {
        self.snapshot().count_by_status(status)
    }

    /// Current engine state for status screens.
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            ready: self.inner.ready.load(Ordering::SeqCst),
            refreshing: self.inner.refreshing.load(Ordering::SeqCst),
            backend: self.backend().kind().to_string(),
            fallback_active: self.inner.fallback_latched.load(Ordering::SeqCst),
            last_error: self
                .inner
                .last_error
                .read()
                .expect("error lock poisoned")
                .clone(),
            notice: self.inner.notice.read().expect("notice lock poisoned").clone(),
            last_sync: self.snapshot().last_sync,
        }
    }

    // =========================================================================
    // Mutations (delegate to the backend, then refresh the snapshot)
    // =========================================================================
    //
    // Backend errors propagate to the caller. The follow-up refresh is
    // best-effort: its failure is recorded in the status, never
    // surfaced through the mutation.

    pub async fn set_plan_active(&self, active: bool) -> QueueResult<()> {
        self.backend().set_plan_active(active).await?;
        self.refresh().await.ok();
        Ok(())
    }

    pub async fn create_pix_topup(&self, amount_cents: i64) -> QueueResult<Topup> {
        let topup = self.backend().create_pix_topup(amount_cents).await?;
        self.refresh().await.ok();
        Ok(topup)
    }

    /// Polls a top-up and refreshes, so an approval shows up in the
    /// wallet immediately.
    pub async fn topup_status(&self, id: &str) -> QueueResult<Topup> {
        let topup = self.backend().topup_status(id).await?;
        self.refresh().await.ok();
        Ok(topup)
    }

    pub async fn create_order(&self, new_order: NewOrder) -> QueueResult<Order> {
        let order = self.backend().create_order(new_order).await?;
        self.refresh().await.ok();
        Ok(order)
    }

    pub async fn update_order(&self, id: &str, patch: OrderPatch) -> QueueResult<Order> {
        let order = self.backend().update_order(id, patch).await?;
        self.refresh().await.ok();
        Ok(order)
    }

    pub async fn upload_order_asset(
        &self,
        order_id: &str,
        file: AssetUpload,
    ) -> QueueResult<OrderAsset> {
        let asset = self.backend().upload_order_asset(order_id, file).await?;
        self.refresh().await.ok();
        Ok(asset)
    }

    pub async fn submit_order(&self, id: &str) -> QueueResult<SubmitOutcome> {
        let outcome = self.backend().submit_order(id).await?;
        self.refresh().await.ok();
        Ok(outcome)
    }

    pub async fn post_order_info(&self, order_id: &str, message: &str) -> QueueResult<OrderDetail> {
        let detail = self.backend().post_order_info(order_id, message).await?;
        self.refresh().await.ok();
        Ok(detail)
    }

    pub async fn set_approval(
        &self,
        deliverable_id: &str,
        status: ApprovalStatus,
        feedback: Option<String>,
    ) -> QueueResult<OrderDetail> {
        let detail = self
            .backend()
            .set_approval(deliverable_id, status, feedback)
            .await?;
        self.refresh().await.ok();
        Ok(detail)
    }

    pub async fn pause_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
        let detail = self.backend().pause_ads_publication(order_id).await?;
        self.refresh().await.ok();
        Ok(detail)
    }

    pub async fn resume_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
        let detail = self.backend().resume_ads_publication(order_id).await?;
        self.refresh().await.ok();
        Ok(detail)
    }

    pub async fn stop_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
        let detail = self.backend().stop_ads_publication(order_id).await?;
        self.refresh().await.ok();
        Ok(detail)
    }

    // =========================================================================
    // Polling Lifecycle
    // =========================================================================

    /// Spawns the background polling loop. The first cycle runs
    /// immediately; later ones follow `poll_interval_secs`. Calling
    /// this twice is a no-op.
    pub fn start_polling(&self) {
        let mut handle_slot = self.inner.poll_handle.lock().expect("poll lock poisoned");
        if handle_slot.is_some() {
            debug!("Polling already running");
            return;
        }

        let (tx, mut rx) = mpsc::channel::<()>(1);
        *self.inner.shutdown_tx.lock().expect("shutdown lock poisoned") = Some(tx);

        let engine = self.clone();
        let interval_secs = self.inner.config.poll_interval_secs.max(1);
        let handle = tokio::spawn(async move {
            info!(interval_secs, "Queue polling started");
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = engine.refresh().await {
                            warn!(error = %e, "Polling refresh failed");
                        }
                    }
                    _ = rx.recv() => {
                        info!("Queue polling stopped");
                        break;
                    }
                }
            }
        });
        *handle_slot = Some(handle);
    }

    /// Stops the polling loop and blocks further refreshes. After this
    /// returns, no cycle will run again on this engine.
    pub async fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);

        let tx = self
            .inner
            .shutdown_tx
            .lock()
            .expect("shutdown lock poisoned")
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(()).await;
        }

        let handle = self
            .inner
            .poll_handle
            .lock()
            .expect("poll lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use fila_core::{OrderType, QueueError, TopupStatus, WaitingReason};
    use fila_store::{ManualClock, MemoryStore};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Simulator wrapped with failure injection and call counting, so
    /// engine behavior can be observed without a network.
    struct TestBackend {
        inner: SimulatorBackend,
        kind: BackendKind,
        wallet_calls: AtomicUsize,
        fail_auth: AtomicBool,
        fail_transport: AtomicBool,
        wallet_delay: Option<Duration>,
    }

    impl TestBackend {
        fn new(storage: Arc<dyn KvStore>, kind: BackendKind) -> Self {
            TestBackend {
                inner: SimulatorBackend::new(storage),
                kind,
                wallet_calls: AtomicUsize::new(0),
                fail_auth: AtomicBool::new(false),
                fail_transport: AtomicBool::new(false),
                wallet_delay: None,
            }
        }

        fn injected_failure(&self) -> QueueResult<()> {
            if self.fail_auth.load(Ordering::SeqCst) {
                return Err(QueueError::AuthFailure("session revoked".to_string()));
            }
            if self.fail_transport.load(Ordering::SeqCst) {
                return Err(QueueError::Transport("connection reset".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl QueueBackend for TestBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        async fn customer_id(&self) -> QueueResult<String> {
            self.injected_failure()?;
            self.inner.customer_id().await
        }

        async fn wallet(&self) -> QueueResult<Wallet> {
            self.wallet_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.wallet_delay {
                tokio::time::sleep(delay).await;
            }
            self.injected_failure()?;
            self.inner.wallet().await
        }

        async fn set_plan_active(&self, active: bool) -> QueueResult<()> {
            self.injected_failure()?;
            self.inner.set_plan_active(active).await
        }

        async fn create_pix_topup(&self, amount_cents: i64) -> QueueResult<Topup> {
            self.injected_failure()?;
            self.inner.create_pix_topup(amount_cents).await
        }

        async fn topup_status(&self, id: &str) -> QueueResult<Topup> {
            self.injected_failure()?;
            self.inner.topup_status(id).await
        }

        async fn create_order(&self, new_order: NewOrder) -> QueueResult<Order> {
            self.injected_failure()?;
            self.inner.create_order(new_order).await
        }

        async fn update_order(&self, id: &str, patch: OrderPatch) -> QueueResult<Order> {
            self.injected_failure()?;
            self.inner.update_order(id, patch).await
        }

        async fn list_orders(&self) -> QueueResult<Vec<Order>> {
            self.injected_failure()?;
            self.inner.list_orders().await
        }

        async fn order_detail(&self, id: &str) -> QueueResult<OrderDetail> {
            self.injected_failure()?;
            self.inner.order_detail(id).await
        }

        async fn upload_order_asset(
            &self,
            order_id: &str,
            file: AssetUpload,
        ) -> QueueResult<OrderAsset> {
            self.injected_failure()?;
            self.inner.upload_order_asset(order_id, file).await
        }

        async fn submit_order(&self, id: &str) -> QueueResult<SubmitOutcome> {
            self.injected_failure()?;
            self.inner.submit_order(id).await
        }

        async fn post_order_info(&self, order_id: &str, message: &str) -> QueueResult<OrderDetail> {
            self.injected_failure()?;
            self.inner.post_order_info(order_id, message).await
        }

        async fn set_approval(
            &self,
            deliverable_id: &str,
            status: ApprovalStatus,
            feedback: Option<String>,
        ) -> QueueResult<OrderDetail> {
            self.injected_failure()?;
            self.inner.set_approval(deliverable_id, status, feedback).await
        }

        async fn pause_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
            self.injected_failure()?;
            self.inner.pause_ads_publication(order_id).await
        }

        async fn resume_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
            self.injected_failure()?;
            self.inner.resume_ads_publication(order_id).await
        }

        async fn stop_ads_publication(&self, order_id: &str) -> QueueResult<OrderDetail> {
            self.injected_failure()?;
            self.inner.stop_ads_publication(order_id).await
        }
    }

    fn draft() -> NewOrder {
        NewOrder {
            order_type: OrderType::Content,
            title: "Monthly posts".to_string(),
            summary: "Twelve posts".to_string(),
            payload: json!({}),
        }
    }

    async fn engine_on_simulator() -> (QueueEngine, Arc<MemoryStore>) {
        let storage = Arc::new(MemoryStore::new());
        let backend = Arc::new(SimulatorBackend::new(storage.clone()));
        let engine = QueueEngine::with_backend(
            EngineConfig::default(),
            storage.clone(),
            backend,
            Arc::new(SystemClock),
        )
            .await
            .unwrap();
        (engine, storage)
    }

    #[tokio::test]
    async fn test_hydrates_from_persisted_cache() {
        let storage = Arc::new(MemoryStore::new());
        let mut snapshot = CacheSnapshot::default();
        snapshot.wallet.balance_cents = 7_500;
        CacheStore::new(storage.clone()).save(&snapshot).await.unwrap();

        let (engine, _) = {
            let backend = Arc::new(SimulatorBackend::new(storage.clone()));
            (
                QueueEngine::with_backend(
            EngineConfig::default(),
            storage.clone(),
            backend,
            Arc::new(SystemClock),
        )
                    .await
                    .unwrap(),
                storage,
            )
        };

        // Visible before any refresh has run.
        assert_eq!(engine.wallet().balance_cents, 7_500);
        assert!(!engine.status().ready);
    }

    #[tokio::test]
    async fn test_corrupt_cache_hydrates_to_defaults() {
        let storage = Arc::new(MemoryStore::new());
        storage.seed(fila_store::keys::CACHE_KEY, "{{{ nope").await;

        let backend = Arc::new(SimulatorBackend::new(storage.clone()));
        let engine = QueueEngine::with_backend(
            EngineConfig::default(),
            storage,
            backend,
            Arc::new(SystemClock),
        )
            .await
            .unwrap();
        assert_eq!(*engine.snapshot(), CacheSnapshot::default());
    }

    #[tokio::test]
    async fn test_refresh_assembles_snapshot_and_persists_it() {
        let (engine, storage) = engine_on_simulator().await;
        engine.set_plan_active(true).await.unwrap();
        engine.create_order(draft()).await.unwrap();

        assert_eq!(engine.orders().len(), 1);
        assert!(engine.wallet().plan_active);
        assert!(engine.snapshot().last_sync.is_some());
        assert!(engine.status().ready);

        // A second engine over the same storage sees the persisted
        // snapshot without refreshing.
        let backend = Arc::new(SimulatorBackend::new(storage.clone()));
        let rehydrated = QueueEngine::with_backend(
            EngineConfig::default(),
            storage,
            backend,
            Arc::new(SystemClock),
        )
            .await
            .unwrap();
        assert_eq!(rehydrated.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_last_sync_comes_from_the_injected_clock() {
        let frozen = chrono::Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let storage = Arc::new(MemoryStore::new());
        let backend = Arc::new(SimulatorBackend::new(storage.clone()));
        let engine = QueueEngine::with_backend(
            EngineConfig::default(),
            storage,
            backend,
            Arc::new(ManualClock::new(frozen)),
        )
        .await
        .unwrap();

        engine.refresh().await.unwrap();
        assert_eq!(engine.snapshot().last_sync, Some(frozen));
        assert_eq!(engine.status().last_sync, Some(frozen));
    }

    #[tokio::test]
    async fn test_mutation_errors_propagate_but_leave_engine_usable() {
        let (engine, _) = engine_on_simulator().await;
        let order = engine.create_order(draft()).await.unwrap();
        engine.set_plan_active(true).await.unwrap();

        // Gated submission is an outcome, not an error.
        let outcome = engine.submit_order(&order.id).await.unwrap();
        assert_eq!(outcome.reason, Some(WaitingReason::InsufficientBalance));

        // A contract violation propagates.
        let err = engine.backend().order_detail("no-such-order").await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound { .. }));
        assert_eq!(engine.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_token_switches_without_probing_remote() {
        let storage = Arc::new(MemoryStore::new());
        let remote = Arc::new(TestBackend::new(storage.clone(), BackendKind::Remote));
        let engine = QueueEngine::with_backend(
            EngineConfig::default(),
            storage,
            remote.clone() as Arc<dyn QueueBackend>,
            Arc::new(SystemClock),
        )
        .await
        .unwrap();

        engine.refresh().await.unwrap();

        // The remote was never asked for anything, and the switching
        // cycle itself fetched nothing.
        assert_eq!(remote.wallet_calls.load(Ordering::SeqCst), 0);
        let status = engine.status();
        assert_eq!(status.backend, "simulator");
        assert!(status.fallback_active);
        assert!(status.notice.is_some());
        assert!(status.last_sync.is_none());

        // The next cycle runs against the simulator.
        engine.refresh().await.unwrap();
        assert!(engine.snapshot().last_sync.is_some());
    }

    #[tokio::test]
    async fn test_local_dev_token_switches_without_probing_remote() {
        let storage = Arc::new(MemoryStore::new());
        storage.seed(SESSION_TOKEN_KEY, "local-dev-token").await;
        let remote = Arc::new(TestBackend::new(storage.clone(), BackendKind::Remote));
        let engine = QueueEngine::with_backend(
            EngineConfig::default(),
            storage,
            remote.clone() as Arc<dyn QueueBackend>,
            Arc::new(SystemClock),
        )
        .await
        .unwrap();

        engine.refresh().await.unwrap();
        assert_eq!(remote.wallet_calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.status().backend, "simulator");
    }

    #[tokio::test]
    async fn test_auth_failure_falls_back_and_latches() {
        let storage = Arc::new(MemoryStore::new());
        storage.seed(SESSION_TOKEN_KEY, "real-looking-token").await;
        let remote = Arc::new(TestBackend::new(storage.clone(), BackendKind::Remote));
        remote.fail_auth.store(true, Ordering::SeqCst);

        let engine = QueueEngine::with_backend(
            EngineConfig::default(),
            storage,
            remote.clone() as Arc<dyn QueueBackend>,
            Arc::new(SystemClock),
        )
        .await
        .unwrap();

        // The failing cycle switches, latches, and skips; it does not
        // complete against the simulator.
        engine.refresh().await.unwrap();
        let status = engine.status();
        assert_eq!(status.backend, "simulator");
        assert!(status.fallback_active);
        assert!(status.last_error.is_none());
        assert!(status.last_sync.is_none());

        // The remote was probed exactly once; the next refresh runs
        // the full cycle on the simulator.
        let probes = remote.wallet_calls.load(Ordering::SeqCst);
        engine.refresh().await.unwrap();
        assert_eq!(remote.wallet_calls.load(Ordering::SeqCst), probes);
        assert!(engine.snapshot().last_sync.is_some());
    }

    #[tokio::test]
    async fn test_require_remote_surfaces_auth_failure() {
        let storage = Arc::new(MemoryStore::new());
        storage.seed(SESSION_TOKEN_KEY, "real-looking-token").await;
        let remote = Arc::new(TestBackend::new(storage.clone(), BackendKind::Remote));
        remote.fail_auth.store(true, Ordering::SeqCst);

        let config = EngineConfig {
            require_remote: true,
            ..EngineConfig::default()
        };
        let engine =
            QueueEngine::with_backend(
                config,
                storage,
                remote as Arc<dyn QueueBackend>,
                Arc::new(SystemClock),
            )
            .await
            .unwrap();

        let err = engine.refresh().await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(engine.status().backend, "remote");
        assert!(!engine.status().fallback_active);
    }

    #[tokio::test]
    async fn test_transport_error_keeps_stale_snapshot() {
        let storage = Arc::new(MemoryStore::new());
        storage.seed(SESSION_TOKEN_KEY, "real-looking-token").await;
        let backend = Arc::new(TestBackend::new(storage.clone(), BackendKind::Remote));
        let engine = QueueEngine::with_backend(
            EngineConfig::default(),
            storage,
            backend.clone() as Arc<dyn QueueBackend>,
            Arc::new(SystemClock),
        )
        .await
        .unwrap();

        backend.inner.set_plan_active(true).await.unwrap();
        engine.refresh().await.unwrap();
        let before = engine.snapshot();
        assert!(before.wallet.plan_active);

        backend.fail_transport.store(true, Ordering::SeqCst);
        let err = engine.refresh().await.unwrap_err();
        assert!(matches!(err, QueueError::Transport(_)));

        // Identical snapshot, error recorded, no fallback on a plain
        // transport failure.
        assert_eq!(*engine.snapshot(), *before);
        let status = engine.status();
        assert!(status.last_error.is_some());
        assert_eq!(status.backend, "remote");

        // Recovery clears the recorded error.
        backend.fail_transport.store(false, Ordering::SeqCst);
        engine.refresh().await.unwrap();
        assert!(engine.status().last_error.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_refreshes_coalesce() {
        let storage = Arc::new(MemoryStore::new());
        storage.seed(SESSION_TOKEN_KEY, "real-looking-token").await;
        let mut backend = TestBackend::new(storage.clone(), BackendKind::Remote);
        backend.wallet_delay = Some(Duration::from_millis(100));
        let backend = Arc::new(backend);

        let engine = QueueEngine::with_backend(
            EngineConfig::default(),
            storage,
            backend.clone() as Arc<dyn QueueBackend>,
            Arc::new(SystemClock),
        )
        .await
        .unwrap();

        let (a, b, c) = tokio::join!(engine.refresh(), engine.refresh(), engine.refresh());
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert_eq!(backend.wallet_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_ticks_and_shutdown_stops_them() {
        let storage = Arc::new(MemoryStore::new());
        storage.seed(SESSION_TOKEN_KEY, "real-looking-token").await;
        let backend = Arc::new(TestBackend::new(storage.clone(), BackendKind::Remote));
        let engine = QueueEngine::with_backend(
            EngineConfig::default(),
            storage,
            backend.clone() as Arc<dyn QueueBackend>,
            Arc::new(SystemClock),
        )
        .await
        .unwrap();

        engine.start_polling();
        // Let the spawned task create its interval and consume the
        // immediate first tick before advancing the paused clock.
        tokio::task::yield_now().await;
        // First tick fires immediately, then one per interval.
        tokio::time::advance(Duration::from_secs(8)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(7)).await;
        tokio::task::yield_now().await;
        let ticks = backend.wallet_calls.load(Ordering::SeqCst);
        assert!(ticks >= 2, "expected at least 2 cycles, got {}", ticks);

        engine.shutdown().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(backend.wallet_calls.load(Ordering::SeqCst), ticks);

        // Manual refreshes are also blocked after teardown.
        engine.refresh().await.unwrap();
        assert_eq!(backend.wallet_calls.load(Ordering::SeqCst), ticks);
    }

    #[tokio::test]
    async fn test_end_to_end_on_simulator_with_pending_approvals() {
        let (engine, _) = engine_on_simulator().await;
        engine.set_plan_active(true).await.unwrap();

        let topup = engine.create_pix_topup(50_000).await.unwrap();
        assert_eq!(topup.status, TopupStatus::Pending);

        let order = engine.create_order(draft()).await.unwrap();
        let outcome = engine.submit_order(&order.id).await;
        // Balance is still pending approval, so submission gates.
        assert_eq!(
            outcome.unwrap().reason,
            Some(WaitingReason::InsufficientBalance)
        );

        // Real 10s auto-approval is simulator policy; here we only
        // assert the engine keeps serving reads while that plays out.
        assert_eq!(engine.count_by_status(OrderStatus::WaitingPayment), 1);
        assert!(engine.pending_approvals().is_empty());
    }
}
