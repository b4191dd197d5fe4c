//! Shared test helpers for creating BatchCoordinator instances in tests.

use crate::config::Config;
use crate::coordinator::BatchCoordinator;
use crate::error::FetchError;
use crate::fetcher::{AsyncFetcher, FetchOutcome};
use crate::types::Item;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Scriptable in-memory fetcher.
///
/// By default every source succeeds immediately with a payload equal to the
/// source bytes. Individual sources can be made to fail, hang, or panic, and
/// all fetches can be held back behind a gate until the test releases them.
#[derive(Clone, Default)]
pub(crate) struct MockFetcher {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    failures: Mutex<HashMap<String, FetchError>>,
    hanging: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make `source` fail with `error`
    pub(crate) fn fail(self, source: &str, error: FetchError) -> Self {
        self.inner
            .failures
            .lock()
            .unwrap()
            .insert(source.to_string(), error);
        self
    }

    /// Make `source` fail with a generic `FetchFailed` error
    pub(crate) fn fail_with_reason(self, source: &str, reason: &str) -> Self {
        self.fail(source, FetchError::failed(source, reason))
    }

    /// Make `source` never complete
    pub(crate) fn hang(self, source: &str) -> Self {
        self.inner.hanging.lock().unwrap().insert(source.to_string());
        self
    }

    /// Make the fetch of `source` panic
    pub(crate) fn panic_on(self, source: &str) -> Self {
        self.inner
            .panicking
            .lock()
            .unwrap()
            .insert(source.to_string());
        self
    }

    /// Sleep this long inside every fetch
    pub(crate) fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Hold every fetch until a permit is added to the returned semaphore
    pub(crate) fn gated(self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        *self.inner.gate.lock().unwrap() = Some(Arc::clone(&gate));
        (self, gate)
    }

    /// Sources fetched so far, in start order
    pub(crate) fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Number of fetches started so far
    pub(crate) fn call_count(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    /// Highest number of fetches observed running at once
    pub(crate) fn max_running(&self) -> usize {
        self.inner.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AsyncFetcher for MockFetcher {
    async fn fetch(&self, source: &str) -> FetchOutcome {
        self.inner.calls.lock().unwrap().push(source.to_string());
        let running = self.inner.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_running.fetch_max(running, Ordering::SeqCst);
        let _running = RunningGuard(&self.inner.running);

        let gate = self.inner.gate.lock().unwrap().clone();
        let delay = *self.inner.delay.lock().unwrap();
        let hangs = self.inner.hanging.lock().unwrap().contains(source);
        let panics = self.inner.panicking.lock().unwrap().contains(source);
        let failure = self.inner.failures.lock().unwrap().get(source).cloned();

        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if hangs {
            std::future::pending::<()>().await;
        }
        if panics {
            panic!("mock fetcher asked to panic on {}", source);
        }

        match failure {
            Some(error) => FetchOutcome::failed(error),
            None => FetchOutcome::ready(Item::ready(source, source.as_bytes().to_vec())),
        }
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Config used by most coordinator tests
pub(crate) fn test_config() -> Config {
    Config {
        max_concurrent_fetches: 3,
        shutdown_grace: Duration::from_secs(5),
        ..Default::default()
    }
}

/// Helper to create a test BatchCoordinator around `fetcher` with [`test_config`].
pub(crate) fn create_test_coordinator(fetcher: MockFetcher) -> BatchCoordinator {
    create_test_coordinator_with(test_config(), fetcher)
}

/// Helper to create a test BatchCoordinator with a custom config.
pub(crate) fn create_test_coordinator_with(
    config: Config,
    fetcher: MockFetcher,
) -> BatchCoordinator {
    BatchCoordinator::new(config, fetcher).unwrap()
}

/// Completion callback that records every invocation.
///
/// Returns the callback and a shared log of the errors it was called with.
pub(crate) fn recording_callback() -> (
    impl FnOnce(Option<FetchError>) + Send + 'static,
    Arc<Mutex<Vec<Option<FetchError>>>>,
) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&calls);
    let callback = move |error: Option<FetchError>| {
        log.lock().unwrap().push(error);
    };
    (callback, calls)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub(crate) async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Standard source lists
pub(crate) fn sources(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| format!("mock://{}", name)).collect()
}
