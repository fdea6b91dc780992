//! Request coalescing
//!
//! At most one producer runs per key at a time. Callers arriving while a
//! producer is in flight await the same shared result instead of starting
//! their own request.
//!
//! Producers run as spawned tasks: a caller that stops waiting does not cancel
//! the work, so the cache write-through still happens for the next reader.
//! The key is released when the producer finishes, whatever the outcome, and
//! results are not retained afterwards.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinError;
use tracing::debug;

type Flight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct Flights<T, E> {
    active: Mutex<HashMap<String, (u64, Flight<T, E>)>>,
    next_id: AtomicU64,
}

impl<T, E> Flights<T, E> {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, (u64, Flight<T, E>)>> {
        // Entries are inserted and removed whole, so a poisoned map is still consistent
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self, key: &str, id: u64) {
        let mut active = self.lock();
        if matches!(active.get(key), Some((current, _)) if *current == id) {
            active.remove(key);
        }
    }
}

/// Releases a key when its producer task ends, including by panic
struct Release<T, E> {
    flights: Arc<Flights<T, E>>,
    key: String,
    id: u64,
}

impl<T, E> Drop for Release<T, E> {
    fn drop(&mut self) {
        self.flights.release(&self.key, self.id);
    }
}

/// Per-key request coalescer
pub struct SingleFlight<T, E> {
    flights: Arc<Flights<T, E>>,
}

impl<T, E> Clone for SingleFlight<T, E> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
        }
    }
}

impl<T, E> Default for SingleFlight<T, E> {
    fn default() -> Self {
        Self {
            flights: Arc::new(Flights {
                active: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `producer` for `key`, or join the run already in flight
    ///
    /// `producer` is only called when no run is in flight for `key`.
    pub async fn execute<F, Fut>(&self, key: &str, producer: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let flight = {
            let mut active = self.flights.lock();

            match active.get(key) {
                Some((_, flight)) => {
                    debug!(key, "Joining in-flight request");
                    flight.clone()
                }
                None => {
                    let id = self.flights.next_id.fetch_add(1, Ordering::Relaxed);
                    let release = Release {
                        flights: Arc::clone(&self.flights),
                        key: key.to_string(),
                        id,
                    };
                    let work = producer();

                    let task = tokio::spawn(async move {
                        let _release = release;
                        work.await
                    });
                    let flight = async move { task.await.unwrap_or_else(|e| Err(E::from(e))) }
                        .boxed()
                        .shared();

                    active.insert(key.to_string(), (id, flight.clone()));
                    flight
                }
            }
        };

        flight.await
    }

    /// Number of keys with a producer in flight
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::remote::NetworkError;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    type Coalescer = SingleFlight<u32, FetchError>;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let flights = Coalescer::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let calls = (0..10).map(|_| {
            let runs = Arc::clone(&runs);
            flights.execute("verses:1:en:", move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(42)
            })
        });

        let results = join_all(calls).await;
        assert!(results.iter().all(|r| matches!(r, Ok(42))));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flights = Coalescer::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let calls = ["chapters", "translations"].into_iter().map(|key| {
            let runs = Arc::clone(&runs);
            flights.execute(key, move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(1)
            })
        });

        join_all(calls).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_key_released_after_completion() {
        let flights = Coalescer::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for expected in 1..=2 {
            let r = Arc::clone(&runs);
            let value = flights
                .execute("chapters", move || async move {
                    Ok(r.fetch_add(1, Ordering::SeqCst) as u32 + 1)
                })
                .await
                .unwrap();
            assert_eq!(value, expected);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_are_shared_and_release_key() {
        let flights = Coalescer::new();

        let calls = (0..3).map(|_| {
            flights.execute("chapters", || async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err(FetchError::Network(NetworkError::HttpStatus(500)))
            })
        });

        for result in join_all(calls).await {
            assert_eq!(result.unwrap_err().kind(), "network");
        }
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel_producer() {
        let flights = Coalescer::new();
        let finished = Arc::new(AtomicBool::new(false));

        let done = Arc::clone(&finished);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            flights.execute("chapters", move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                done.store(true, Ordering::SeqCst);
                Ok(7)
            }),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panicking_producer_reports_aborted() {
        let flights = Coalescer::new();

        let result = flights
            .execute("chapters", || async {
                if flights_should_panic() {
                    panic!("producer failed");
                }
                Ok(0)
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), "aborted");
        assert_eq!(flights.in_flight(), 0);
    }

    fn flights_should_panic() -> bool {
        true
    }
}
