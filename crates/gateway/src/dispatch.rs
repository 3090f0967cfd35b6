//! Fire-and-forget dispatch of received payloads.
//!
//! Every payload becomes its own task. [`Dispatcher::dispatch`] returns as
//! soon as the task is spawned, so a slow message handler never stalls the
//! read loop that produced the payload or any other connection. The outcome
//! of a handler (including a panic) is never reported back.
//!
//! Two units dispatched for the same session have no completion order.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use bg_protocol::Payload;
use bg_sessions::BotSession;

pub struct Dispatcher {
    tracker: TaskTracker,
    /// Bounds concurrently running handlers. `None` = unbounded.
    limit: Option<Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
    dispatched: AtomicU64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Dispatcher {
    pub fn new(max_in_flight: Option<usize>) -> Self {
        Self {
            tracker: TaskTracker::new(),
            limit: max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            dispatched: AtomicU64::new(0),
        }
    }

    /// Schedule `bot.handle_message(payload)` and return immediately.
    ///
    /// With a concurrency limit the permit is awaited inside the spawned
    /// task, never by the caller. Once [`shutdown`](Self::shutdown) has
    /// started, payloads are dropped instead of spawned.
    pub fn dispatch(&self, bot: Arc<dyn BotSession>, payload: Payload) {
        if self.tracker.is_closed() {
            tracing::warn!(
                adapter = %bot.adapter(),
                self_id = %bot.self_id(),
                "dispatcher is shutting down, dropping payload"
            );
            return;
        }

        let span = tracing::debug_span!(
            "dispatch",
            adapter = %bot.adapter(),
            self_id = %bot.self_id(),
            transport = %bot.kind(),
        );
        let limit = self.limit.clone();
        let in_flight = InFlight::enter(self.in_flight.clone());
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        self.tracker.spawn(
            async move {
                let _in_flight = in_flight;
                let _permit = match limit {
                    Some(sem) => match sem.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                    None => None,
                };
                bot.handle_message(payload).await;
            }
            .instrument(span),
        );
    }

    /// Units spawned and not yet finished (running or waiting for a permit).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Total units dispatched since startup.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Stop accepting new units and wait up to `grace` for running ones.
    /// Returns `false` if units were still running when the grace expired.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        if drained {
            tracing::info!("dispatch drained");
        } else {
            tracing::warn!(
                in_flight = self.in_flight(),
                grace_secs = grace.as_secs(),
                "dispatch grace period expired with handlers still running"
            );
        }
        drained
    }
}

/// Decrements the in-flight counter when the unit ends, including by panic.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
