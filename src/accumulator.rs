//! The accumulator: long-lived counters keyed by fingerprint, emitted
//! and reset on every cycle, evicted by TTL when left untouched.
//!
//! Equivalent to flattening with the count operation, but one stored
//! entry serves any number of increments, so large counts cost one
//! atomic add per event instead of one buffered sample.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn};

use crate::config::DataTransformerConfig;
use crate::error::{Error, Result};
use crate::point::Payload;
use crate::processor::{EntryAction, ProcessorLoop};
use crate::transport::Transport;

/// One fingerprint's counter.
pub(crate) struct AccumulatedEntry {
    count: AtomicU64,
    /// Milliseconds since the accumulator's epoch instant.
    last_update_ms: AtomicU64,
    ttl: Duration,
    payload: Payload,
}

impl AccumulatedEntry {
    fn touch(&self, now_ms: u64) {
        self.last_update_ms.store(now_ms, Ordering::Release);
    }
}

struct AccumulatorInner {
    processor: ProcessorLoop<AccumulatedEntry>,
    config: DataTransformerConfig,
    transport: ArcSwapOption<Transport>,
    /// TTL task handles by fingerprint, aborted on replace and on stop.
    ttl_tasks: DashMap<String, AbortHandle>,
    epoch: Instant,
}

impl AccumulatorInner {
    fn now_ms(&self) -> u64 {
        Instant::now().duration_since(self.epoch).as_millis() as u64
    }

    fn process_entry(&self, _fingerprint: &str, entry: &AccumulatedEntry) -> EntryAction {
        let Some(transport) = self.transport.load_full() else {
            // No transport yet; counts stay accumulated.
            return EntryAction::Keep;
        };

        // The swap makes the emitted count exactly the number of adds
        // that completed before it; late adds land in the next cycle.
        let count = entry.count.swap(0, Ordering::AcqRel);
        if count == 0 {
            return EntryAction::Keep;
        }

        entry.touch(self.now_ms());

        match transport.accumulated_to_payload(&entry.payload, count) {
            Ok(item) => transport.submit(item),
            Err(e) => error!(error = %e, "error translating accumulated data"),
        }

        // Entries survive cycles; only their TTL task removes them.
        EntryAction::Keep
    }
}

/// Maintains one counter per stored fingerprint. Cheap to clone; clones
/// share the same entry map and TTL registry.
#[derive(Clone)]
pub struct Accumulator {
    inner: Arc<AccumulatorInner>,
}

impl Accumulator {
    /// Builds an accumulator, refusing invalid configurations.
    pub fn new(config: DataTransformerConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(AccumulatorInner {
                processor: ProcessorLoop::new("accumulator", config.cycle_duration),
                config,
                transport: ArcSwapOption::const_empty(),
                ttl_tasks: DashMap::new(),
                epoch: Instant::now(),
            }),
        })
    }

    pub(crate) fn config(&self) -> &DataTransformerConfig {
        &self.inner.config
    }

    /// Injects the transport the emitted counts are submitted to.
    pub fn set_transport(&self, transport: &Transport) {
        self.inner
            .transport
            .store(Some(Arc::new(transport.clone())));
    }

    /// Attaches a contextual span to the cycle task's logging.
    pub fn build_contextual_logger(&self, id: &str, context: &[&str]) {
        let name = &self.inner.config.name;
        let span = if name.is_empty() {
            info_span!("accumulator", id = %id, context = %context.join(","))
        } else {
            info_span!("accumulator", id = %id, name = %name, context = %context.join(","))
        };
        self.inner.processor.set_span(span);
    }

    /// Stores a new entry for the item, computing its fingerprint from
    /// the identity fields. Returns the fingerprint to increment with.
    ///
    /// A `ttl` of zero means the entry never expires; otherwise it is
    /// evicted once no update has happened for longer than `ttl`.
    pub fn store(&self, item: &Payload, ttl: Duration) -> Result<String> {
        let transport = self.transport()?;
        let accumulated = transport.payload_to_accumulated(&self.inner.config, item, true)?;
        let fingerprint = accumulated
            .fingerprint
            .ok_or_else(|| Error::Translation("no fingerprint was computed".into()))?;

        self.store_entry(fingerprint.clone(), accumulated.payload, ttl);
        Ok(fingerprint)
    }

    /// Same as [`Accumulator::store`] but keyed by a caller-supplied
    /// fingerprint; no hashing happens.
    pub fn store_custom_fingerprint(
        &self,
        item: &Payload,
        ttl: Duration,
        fingerprint: impl Into<String>,
    ) -> Result<()> {
        let transport = self.transport()?;
        let accumulated = transport.payload_to_accumulated(&self.inner.config, item, false)?;
        self.store_entry(fingerprint.into(), accumulated.payload, ttl);
        Ok(())
    }

    /// Atomically increments a stored entry's counter. Wait-free once
    /// the entry exists; unknown fingerprints report
    /// [`Error::NotStored`].
    pub fn add(&self, fingerprint: &str) -> Result<()> {
        match self.inner.processor.entries().get(fingerprint) {
            Some(entry) => {
                entry.count.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            None => Err(Error::NotStored),
        }
    }

    /// Spawns the background cycle task; a no-op when already started.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .processor
            .start(move |fingerprint, entry| inner.process_entry(fingerprint, entry));
    }

    /// Runs one accumulation cycle synchronously (manual mode and
    /// tests). Returns the number of entries visited.
    pub fn process_cycle(&self) -> usize {
        let inner = Arc::clone(&self.inner);
        self.inner
            .processor
            .process_cycle(move |fingerprint, entry| inner.process_entry(fingerprint, entry))
    }

    /// Signals the cycle task to exit and aborts every TTL task;
    /// idempotent, safe before start.
    pub fn stop(&self) {
        self.inner.processor.stop();
        self.inner.ttl_tasks.retain(|_, handle| {
            handle.abort();
            false
        });
    }

    /// Number of stored fingerprints.
    pub fn stored_fingerprints(&self) -> usize {
        self.inner.processor.entries().len()
    }

    fn transport(&self) -> Result<Arc<Transport>> {
        self.inner
            .transport
            .load_full()
            .ok_or_else(|| Error::InvalidConfiguration("transport is not configured".into()))
    }

    fn store_entry(&self, fingerprint: String, payload: Payload, ttl: Duration) {
        let now_ms = self.inner.now_ms();
        let entry = AccumulatedEntry {
            count: AtomicU64::new(0),
            last_update_ms: AtomicU64::new(now_ms),
            ttl,
            payload,
        };

        // Abort the old entry's TTL task before the slot changes hands
        // so it cannot observe (and evict) the replacement.
        if let Some((_, handle)) = self.inner.ttl_tasks.remove(&fingerprint) {
            handle.abort();
        }

        if self
            .inner
            .processor
            .entries()
            .insert(fingerprint.clone(), entry)
            .is_some()
        {
            warn!(fingerprint = %fingerprint, "a key was replaced on storage operation");
        }

        if ttl > Duration::ZERO {
            self.spawn_ttl_task(fingerprint, ttl);
        }
    }

    /// Watches one entry: every `ttl` it re-checks the last update and
    /// evicts the entry once it has been idle for longer than `ttl`.
    fn spawn_ttl_task(&self, fingerprint: String, ttl: Duration) {
        let inner = Arc::clone(&self.inner);
        let key = fingerprint.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(ttl).await;

                let expired = match inner.processor.entries().get(&key) {
                    Some(entry) => {
                        let last = entry.last_update_ms.load(Ordering::Acquire);
                        let ttl_ms = entry.ttl.as_millis() as u64;
                        inner.now_ms().saturating_sub(last) > ttl_ms
                    }
                    None => true,
                };

                if expired {
                    inner.processor.entries().remove(&key);
                    inner.ttl_tasks.remove(&key);
                    info!(fingerprint = %key, "expired data removed");
                    return;
                }

                debug!(fingerprint = %key, "ttl still valid");
            }
        });

        self.inner.ttl_tasks.insert(fingerprint, task.abort_handle());
    }
}
