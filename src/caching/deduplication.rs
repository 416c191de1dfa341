//! # Request Deduplication Module
//!
//! Coalesces concurrent fetches for the same key into one in-flight request.
//!
//! Each started fetch runs as its own tokio task, so it completes even if
//! every caller stops waiting. Callers hold a [`Shared`] handle to the task's
//! result channel and all observe the same `Arc`ed value or error.

use super::key_generator::CacheKey;
use crate::core::error::{CacheError, CacheResult, FetchError};
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

/// Outcome produced by the underlying fetch
pub type FetchOutcome<V, E> = Result<Arc<V>, Arc<E>>;

type ComputationChannel<V, E> = Shared<oneshot::Receiver<FetchOutcome<V, E>>>;

type PendingMap<V, E> = Mutex<HashMap<CacheKey, ComputationChannel<V, E>>>;

/// Handle returned by [`RequestCoordinator::get_or_start`]
pub struct PendingFetch<V, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Whether this call started the fetch, as opposed to joining one in flight
    pub started: bool,

    /// Resolves with the shared result of the fetch
    pub future: BoxFuture<'static, Result<Arc<V>, FetchError<E>>>,
}

/// Removes the pending registration when dropped, including on panic
struct PendingGuard<V, E> {
    key: Option<CacheKey>,
    pending: Arc<PendingMap<V, E>>,
}

impl<V, E> Drop for PendingGuard<V, E> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.pending.lock().remove(&key);
        }
    }
}

/// Tracks at most one in-flight request per key
pub struct RequestCoordinator<V, E> {
    pending: Arc<PendingMap<V, E>>,
}

impl<V, E> Default for RequestCoordinator<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> RequestCoordinator<V, E> {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether a request for `key` is currently in flight
    pub fn is_pending(&self, key: &CacheKey) -> bool {
        self.pending.lock().contains_key(key)
    }

    /// Number of keys with a request in flight
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<V, E> RequestCoordinator<V, E>
where
    V: Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Join the in-flight request for `key`, or start one with `start`
    ///
    /// `start` is only invoked when nothing is pending for `key`; checking
    /// and registering happen under a single lock. The registration is
    /// removed once the fetch settles, before its result is delivered, so a
    /// later caller either joins this request or sees whatever the fetch
    /// wrote on its way out.
    ///
    /// Fails with [`CacheError::Runtime`] when no tokio runtime is current.
    pub fn get_or_start<F, Fut>(&self, key: &CacheKey, start: F) -> CacheResult<PendingFetch<V, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome<V, E>> + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|e| CacheError::runtime(e.to_string()))?;

        let (channel, sender) = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(channel) => {
                    debug!(key = %key, "Joined in-flight request");
                    (channel.clone(), None)
                }
                None => {
                    let (sender, receiver) = oneshot::channel();
                    let channel = receiver.shared();
                    pending.insert(key.clone(), channel.clone());
                    (channel, Some(sender))
                }
            }
        };

        // Spawned outside the lock: a future dropped by the runtime runs the
        // guard, which takes the lock again.
        let started = match sender {
            Some(sender) => {
                self.spawn_computation(&handle, key.clone(), sender, start);
                true
            }
            None => false,
        };

        let key = key.to_string();
        let future = channel
            .map(move |received| match received {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(FetchError::Transport(error)),
                Err(oneshot::Canceled) => Err(FetchError::Cache(CacheError::Cancelled { key })),
            })
            .boxed();

        Ok(PendingFetch { started, future })
    }

    fn spawn_computation<F, Fut>(
        &self,
        handle: &Handle,
        key: CacheKey,
        sender: oneshot::Sender<FetchOutcome<V, E>>,
        start: F,
    ) where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome<V, E>> + Send + 'static,
    {
        let guard = PendingGuard {
            key: Some(key),
            pending: Arc::clone(&self.pending),
        };
        let computation = start();

        handle.spawn(async move {
            let result = computation.await;
            // Deregister before publishing so callers never join a finished request.
            drop(guard);
            sender.send(result).ok();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::key_generator::compute_key;
    use http::Method;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn key(resource: &str) -> CacheKey {
        compute_key(&Method::GET, resource, &Value::Null)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let coordinator: RequestCoordinator<String, Boom> = RequestCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let calls = calls.clone();
                coordinator.get_or_start(&key("/a"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(Arc::new("value".to_string()))
                })
                .unwrap()
            })
            .collect();

        assert_eq!(handles.iter().filter(|h| h.started).count(), 1);
        assert!(coordinator.is_pending(&key("/a")));

        let results = futures::future::join_all(handles.into_iter().map(|h| h.future)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_cleared() {
        let coordinator: RequestCoordinator<String, Boom> = RequestCoordinator::new();

        let first = coordinator.get_or_start(&key("/a"), || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(Arc::new(Boom))
        })
        .unwrap();
        let second = coordinator.get_or_start(&key("/a"), || async { Ok(Arc::new("never".to_string())) })
            .unwrap();
        assert!(!second.started);

        let (a, b) = futures::join!(first.future, second.future);
        match (a, b) {
            (Err(FetchError::Transport(a)), Err(FetchError::Transport(b))) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("unexpected results: {:?}", other),
        }

        assert!(!coordinator.is_pending(&key("/a")));

        // The next call starts a fresh request
        let retry = coordinator.get_or_start(&key("/a"), || async { Ok(Arc::new("ok".to_string())) })
            .unwrap();
        assert!(retry.started);
        assert_eq!(*retry.future.await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let coordinator: RequestCoordinator<u32, Boom> = RequestCoordinator::new();
        let a = coordinator.get_or_start(&key("/a"), || async { Ok(Arc::new(1)) }).unwrap();
        let b = coordinator.get_or_start(&key("/b"), || async { Ok(Arc::new(2)) }).unwrap();
        assert!(a.started && b.started);
        assert_eq!(*a.future.await.unwrap(), 1);
        assert_eq!(*b.future.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fetch_completes_without_waiters() {
        let coordinator: RequestCoordinator<u32, Boom> = RequestCoordinator::new();
        let done = Arc::new(AtomicUsize::new(0));

        let pending = {
            let done = done.clone();
            coordinator.get_or_start(&key("/a"), move || async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(1))
            })
            .unwrap()
        };
        drop(pending);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_fetch_is_reported_as_cancelled() {
        let coordinator: RequestCoordinator<u32, Boom> = RequestCoordinator::new();
        let pending = coordinator.get_or_start(&key("/a"), || async {
            if true {
                panic!("transport blew up");
            }
            Ok(Arc::new(1))
        })
        .unwrap();

        let result = pending.future.await;
        assert!(matches!(result, Err(FetchError::Cache(CacheError::Cancelled { .. }))));
        assert!(!coordinator.is_pending(&key("/a")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_parallel_registration_starts_one_fetch() {
        let coordinator: Arc<RequestCoordinator<String, Boom>> = Arc::new(RequestCoordinator::new());

        for round in 0..100 {
            let calls = Arc::new(AtomicUsize::new(0));
            let registered = Arc::new(AtomicUsize::new(0));
            let barrier = Arc::new(tokio::sync::Barrier::new(16));
            let resource = format!("/round/{}", round);

            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let coordinator = coordinator.clone();
                    let calls = calls.clone();
                    let registered = registered.clone();
                    let barrier = barrier.clone();
                    let key = key(&resource);
                    tokio::spawn(async move {
                        barrier.wait().await;
                        let in_fetch = registered.clone();
                        let pending = coordinator
                            .get_or_start(&key, move || async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                // Stay in flight until every caller has registered
                                while in_fetch.load(Ordering::SeqCst) < 16 {
                                    tokio::time::sleep(Duration::from_millis(1)).await;
                                }
                                Ok(Arc::new("value".to_string()))
                            })
                            .unwrap();
                        registered.fetch_add(1, Ordering::SeqCst);
                        (pending.started, pending.future.await.unwrap())
                    })
                })
                .collect();

            let mut results = Vec::new();
            for handle in handles {
                results.push(handle.await.unwrap());
            }

            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(results.iter().filter(|(started, _)| *started).count(), 1);
            let first = &results[0].1;
            assert!(results.iter().all(|(_, value)| Arc::ptr_eq(value, first)));
        }
        assert_eq!(coordinator.pending_count(), 0);
    }

    #[test]
    fn test_outside_runtime_fails_without_registering() {
        let coordinator: RequestCoordinator<u32, Boom> = RequestCoordinator::new();
        let result = coordinator.get_or_start(&key("/a"), || async { Ok(Arc::new(1)) });

        assert!(matches!(result, Err(CacheError::Runtime { .. })));
        assert_eq!(coordinator.pending_count(), 0);
    }
}
