//! Shared periodic scanner over a fingerprint→entry map.
//!
//! The flattener and the accumulator both own a [`ProcessorLoop`] and
//! supply their per-entry hook at start time (composition instead of
//! subclassing). The loop ticks every cycle duration, hands each entry
//! to the hook and removes the ones the hook is done with.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument, Span};

/// What to do with a map entry after its hook ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryAction {
    Keep,
    Remove,
}

struct LoopShared<E> {
    entries: DashMap<String, E>,
    cycle_duration: Duration,
    cancel: CancellationToken,
    started: AtomicBool,
    name: &'static str,
    span: Mutex<Span>,
}

/// Periodic map scanner shared by the data processors. Cheap to clone;
/// clones share the same entry map and lifecycle.
pub(crate) struct ProcessorLoop<E> {
    shared: Arc<LoopShared<E>>,
}

impl<E> Clone for ProcessorLoop<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: Send + Sync + 'static> ProcessorLoop<E> {
    pub fn new(name: &'static str, cycle_duration: Duration) -> Self {
        Self {
            shared: Arc::new(LoopShared {
                entries: DashMap::new(),
                cycle_duration,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                name,
                span: Mutex::new(Span::none()),
            }),
        }
    }

    /// The fingerprint→entry map. Iteration order is unspecified and
    /// concurrent mutation during a cycle is allowed; entries added
    /// mid-cycle are observed that cycle or the next.
    pub fn entries(&self) -> &DashMap<String, E> {
        &self.shared.entries
    }

    /// Replaces the contextual span the cycle task logs under. Only
    /// effective when set before `start`.
    pub fn set_span(&self, span: Span) {
        if let Ok(mut guard) = self.shared.span.lock() {
            *guard = span;
        }
    }

    /// Spawns the background cycle task. Re-entry while started is a
    /// no-op, as is starting after a stop.
    pub fn start<F>(&self, hook: F)
    where
        F: Fn(&str, &E) -> EntryAction + Send + Sync + 'static,
    {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let span = self
            .shared
            .span
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|_| Span::none());

        let shared = Arc::clone(&self.shared);
        let cycle = async move {
            info!(processor = shared.name, "starting processing cycle");

            let mut ticker = tokio::time::interval(shared.cycle_duration);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Consume the immediate first tick so the first real cycle
            // lands one full duration after start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shared.cancel.cancelled() => {
                        info!(processor = shared.name, "breaking processing cycle");
                        return;
                    }

                    _ = ticker.tick() => {
                        debug!(processor = shared.name, "entering a new process cycle");
                        let count = Self::run_cycle(&shared, &hook);
                        debug!(processor = shared.name, points = count, "points were processed");
                    }
                }
            }
        };

        tokio::spawn(cycle.instrument(span));
    }

    /// Runs one iteration over the map, removing entries whose hook
    /// returns [`EntryAction::Remove`]. Returns how many entries were
    /// visited. Used by the background task and by manual mode.
    pub fn process_cycle<F>(&self, hook: F) -> usize
    where
        F: Fn(&str, &E) -> EntryAction,
    {
        Self::run_cycle(&self.shared, &hook)
    }

    fn run_cycle<F>(shared: &LoopShared<E>, hook: &F) -> usize
    where
        F: Fn(&str, &E) -> EntryAction,
    {
        let mut count = 0usize;
        shared.entries.retain(|fingerprint, entry| {
            count += 1;
            hook(fingerprint, entry) == EntryAction::Keep
        });
        count
    }

    /// Signals the cycle task to exit at its next wake. Idempotent and
    /// safe to call before `start`.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
    }
}
