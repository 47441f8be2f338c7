//! 多个独立控制器通过同一个共享存储协调准入

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use gatekeeper::cache::{
    AdmissionConfig, AdmissionController, AdmissionOutcome, BoundedIncr, FailurePolicy,
    MemoryStore, SharedStore, StoreError,
};

/// 永远连接不上的共享存储
struct DownStore;

#[async_trait]
impl SharedStore for DownStore {
    async fn incr_bounded(&self, _: &str, _: u64, _: Duration) -> Result<BoundedIncr, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn ttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn delete(&self, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn delete_prefix(&self, _: &str) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// 能响应但是太慢的共享存储
struct StalledStore {
    inner: MemoryStore,
    calls: AtomicUsize,
}

impl StalledStore {
    async fn stall(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
    }
}

#[async_trait]
impl SharedStore for StalledStore {
    async fn incr_bounded(&self, k: &str, l: u64, t: Duration) -> Result<BoundedIncr, StoreError> {
        self.stall().await;
        self.inner.incr_bounded(k, l, t).await
    }
    async fn set_if_absent(&self, k: &str, v: &str, t: Duration) -> Result<bool, StoreError> {
        self.stall().await;
        self.inner.set_if_absent(k, v, t).await
    }
    async fn ttl(&self, k: &str) -> Result<Option<Duration>, StoreError> {
        self.stall().await;
        self.inner.ttl(k).await
    }
    async fn get(&self, k: &str) -> Result<Option<String>, StoreError> {
        self.stall().await;
        self.inner.get(k).await
    }
    async fn set(&self, k: &str, v: &str, t: Duration) -> Result<(), StoreError> {
        self.stall().await;
        self.inner.set(k, v, t).await
    }
    async fn delete(&self, k: &str) -> Result<(), StoreError> {
        self.stall().await;
        self.inner.delete(k).await
    }
    async fn delete_prefix(&self, p: &str) -> Result<u64, StoreError> {
        self.stall().await;
        self.inner.delete_prefix(p).await
    }
}

fn config(points: u64) -> AdmissionConfig {
    AdmissionConfig::new(points, Duration::from_secs(60), Duration::from_secs(60))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_never_exceed_the_budget() {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());

    // 每个 worker 拥有自己的控制器实例，只通过共享存储协调
    let workers: Vec<_> = (0..8)
        .map(|_| Arc::new(AdmissionController::new(store.clone(), config(10)).unwrap()))
        .collect();

    let handles = (0..200).map(|i| {
        let worker = workers[i % workers.len()].clone();
        tokio::spawn(async move { worker.admit("203.0.113.9").await.allowed() })
    });
    let results = join_all(handles).await;

    let admitted = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|allowed| *allowed)
        .count();
    assert_eq!(admitted, 10);
}

#[tokio::test(start_paused = true)]
async fn five_rapid_calls_then_cooldown_outlasts_the_window() {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let limiter = AdmissionController::new(
        store,
        AdmissionConfig::new(3, Duration::from_secs(1), Duration::from_secs(5)),
    )
    .unwrap();

    let mut allowed = Vec::new();
    for _ in 0..5 {
        allowed.push(limiter.admit("client").await.allowed());
    }
    assert_eq!(allowed, [true, true, true, false, false]);

    tokio::time::advance(Duration::from_secs(2)).await;
    let sixth = limiter.admit("client").await;
    assert!(!sixth.allowed());
    assert!(matches!(sixth, AdmissionOutcome::Rejected { blocked: true, .. }));
}

#[tokio::test]
async fn unreachable_store_is_surfaced_by_try_admit() {
    let limiter = AdmissionController::new(Arc::new(DownStore), config(3)).unwrap();
    let err = limiter.try_admit("client").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}

#[tokio::test]
async fn fail_open_admits_but_reports_degraded() {
    let limiter = AdmissionController::new(
        Arc::new(DownStore),
        config(3).with_failure_policy(FailurePolicy::FailOpen),
    )
    .unwrap();

    let outcome = limiter.admit("client").await;
    assert!(outcome.allowed());
    assert!(outcome.is_degraded());
}

#[tokio::test]
async fn fail_closed_rejects_and_reports_degraded() {
    let limiter = AdmissionController::new(
        Arc::new(DownStore),
        config(3).with_failure_policy(FailurePolicy::FailClosed),
    )
    .unwrap();

    let outcome = limiter.admit("client").await;
    assert!(!outcome.allowed());
    assert!(outcome.is_degraded());
    assert!(!matches!(outcome, AdmissionOutcome::Rejected { .. }));
}

#[tokio::test(start_paused = true)]
async fn stalled_store_times_out_into_the_failure_policy() {
    let store = Arc::new(StalledStore {
        inner: MemoryStore::new(),
        calls: AtomicUsize::new(0),
    });
    let limiter = AdmissionController::new(
        store.clone(),
        config(3)
            .with_timeout(Duration::from_millis(100))
            .with_failure_policy(FailurePolicy::FailClosed),
    )
    .unwrap();

    match limiter.admit("client").await {
        AdmissionOutcome::Degraded { allowed, error, .. } => {
            assert!(!allowed);
            assert!(matches!(error, StoreError::Timeout(d) if d == Duration::from_millis(100)));
        }
        other => panic!("expected degraded outcome, got {other:?}"),
    }
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}
