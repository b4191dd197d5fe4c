//! Fetcher abstraction and the bundled implementations
//!
//! The coordinator only knows about [`AsyncFetcher`]. Two adapters are
//! provided:
//! - [`CallbackFetcher`] wraps a callback-style fetch that reports through a
//!   [`Completion`] handle from any thread.
//! - [`HttpFetcher`] downloads `http`/`https` sources with reqwest.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::FetchError;
use crate::types::Item;

/// Result of one fetch: an item, an error, or both
///
/// A fetch may produce a placeholder item alongside an error (for example an
/// [`Item::failed`]); the coordinator appends any item it receives and records
/// any error it receives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Item to append, if any
    pub item: Option<Item>,
    /// Error to record, if any
    pub error: Option<FetchError>,
}

impl FetchOutcome {
    /// Build an outcome from its two halves
    pub fn new(item: Option<Item>, error: Option<FetchError>) -> Self {
        Self { item, error }
    }

    /// Successful fetch
    pub fn ready(item: Item) -> Self {
        Self::new(Some(item), None)
    }

    /// Failed fetch without an item
    pub fn failed(error: FetchError) -> Self {
        Self::new(None, Some(error))
    }
}

impl From<Result<Item, FetchError>> for FetchOutcome {
    fn from(result: Result<Item, FetchError>) -> Self {
        match result {
            Ok(item) => Self::ready(item),
            Err(error) => Self::failed(error),
        }
    }
}

/// Performs one fetch per source, off the caller's task
///
/// Returning from `fetch` is the completion signal, so it happens exactly once.
#[async_trait]
pub trait AsyncFetcher: Send + Sync {
    /// Fetch `source`
    async fn fetch(&self, source: &str) -> FetchOutcome;
}

/// One-shot completion handle passed to a [`CallbackFetch`]
///
/// `complete` consumes the handle, so a fetch can report at most once.
/// Dropping the handle without completing reports [`FetchError::Abandoned`].
#[derive(Debug)]
pub struct Completion {
    target: String,
    tx: oneshot::Sender<FetchOutcome>,
}

impl Completion {
    /// Source identifier this completion belongs to
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Report the fetch result
    pub fn complete(self, item: Option<Item>, error: Option<FetchError>) {
        // The receiver is gone only if the batch was torn down; nothing to report to
        self.tx.send(FetchOutcome::new(item, error)).ok();
    }
}

/// Callback-style fetch: start the work and call `done` exactly once when finished
pub trait CallbackFetch: Send + Sync + 'static {
    /// Begin fetching `source`
    fn start(&self, source: String, done: Completion);
}

impl<F> CallbackFetch for F
where
    F: Fn(String, Completion) + Send + Sync + 'static,
{
    fn start(&self, source: String, done: Completion) {
        self(source, done)
    }
}

/// Adapts a [`CallbackFetch`] to [`AsyncFetcher`]
pub struct CallbackFetcher<F> {
    inner: F,
}

impl<F: CallbackFetch> CallbackFetcher<F> {
    /// Wrap a callback-style fetch
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<F: CallbackFetch> AsyncFetcher for CallbackFetcher<F> {
    async fn fetch(&self, source: &str) -> FetchOutcome {
        let (tx, rx) = oneshot::channel();
        self.inner.start(
            source.to_string(),
            Completion {
                target: source.to_string(),
                tx,
            },
        );

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(source = %source, "completion handle dropped without reporting");
                FetchOutcome::failed(FetchError::Abandoned {
                    target: source.to_string(),
                })
            }
        }
    }
}

/// [`AsyncFetcher`] that downloads `http` and `https` URLs
#[derive(Clone, Debug, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Fetcher with a default reqwest client
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetcher sharing an existing client (connection pool, proxy settings, ...)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AsyncFetcher for HttpFetcher {
    async fn fetch(&self, source: &str) -> FetchOutcome {
        let url = match url::Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                return FetchOutcome::failed(FetchError::InvalidSource {
                    target: source.to_string(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            Err(e) => {
                return FetchOutcome::failed(FetchError::InvalidSource {
                    target: source.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::failed(FetchError::network(source, e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            return FetchOutcome::failed(FetchError::network(source, format!("HTTP {}", status)));
        }

        match response.bytes().await {
            Ok(body) => {
                tracing::debug!(source = %source, bytes = body.len(), "fetched");
                FetchOutcome::ready(Item::ready(source, body.to_vec()))
            }
            Err(e) => FetchOutcome::failed(FetchError::network(source, e.to_string())),
        }
    }
}
