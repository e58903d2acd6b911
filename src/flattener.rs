//! The point flattener: reduces many same-identity samples arriving
//! within one cycle to a single aggregated point.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::mpsc;
use tracing::{error, info_span, warn};

use crate::config::DataTransformerConfig;
use crate::error::{Error, Result};
use crate::point::{FlatOperation, FlattenerPoint, Payload};
use crate::processor::{EntryAction, ProcessorLoop};
use crate::transport::Transport;

/// One fingerprint's pending samples.
pub(crate) struct FlatEntry {
    operation: FlatOperation,
    timestamp: i64,
    payload: Payload,
    sink_tx: mpsc::Sender<f64>,
    sink_rx: std::sync::Mutex<mpsc::Receiver<f64>>,
}

struct FlattenerInner {
    processor: ProcessorLoop<FlatEntry>,
    config: DataTransformerConfig,
    transport: ArcSwapOption<Transport>,
}

/// Collapses same-fingerprint samples into one aggregated point per
/// cycle. Cheap to clone; clones share the same entry map.
#[derive(Clone)]
pub struct Flattener {
    inner: Arc<FlattenerInner>,
}

impl Flattener {
    /// Builds a flattener, refusing invalid configurations.
    pub fn new(config: DataTransformerConfig) -> Result<Self> {
        config.validate()?;
        if config.point_value_buffer_size == 0 {
            return Err(Error::InvalidConfiguration(
                "point value buffer size must be positive".into(),
            ));
        }

        Ok(Self {
            inner: Arc::new(FlattenerInner {
                processor: ProcessorLoop::new("flattener", config.cycle_duration),
                config,
                transport: ArcSwapOption::const_empty(),
            }),
        })
    }

    pub(crate) fn config(&self) -> &DataTransformerConfig {
        &self.inner.config
    }

    /// Injects the transport the aggregated points are submitted to.
    pub fn set_transport(&self, transport: &Transport) {
        self.inner
            .transport
            .store(Some(Arc::new(transport.clone())));
    }

    /// Attaches a contextual span to the cycle task's logging.
    pub fn build_contextual_logger(&self, id: &str, context: &[&str]) {
        let name = &self.inner.config.name;
        let span = if name.is_empty() {
            info_span!("flattener", id = %id, context = %context.join(","))
        } else {
            info_span!("flattener", id = %id, name = %name, context = %context.join(","))
        };
        self.inner.processor.set_span(span);
    }

    /// Adds one sample to the flattening process.
    ///
    /// When the fingerprint's sample sink is full this awaits until the
    /// next cycle drains it: backpressure is local to one fingerprint
    /// and samples are never silently dropped.
    pub async fn add(&self, point: FlattenerPoint) -> Result<()> {
        let entries = self.inner.processor.entries();

        loop {
            // Clone the sender out of the map before awaiting so no
            // shard lock is held across the suspension point.
            let sink = entries
                .get(point.fingerprint())
                .map(|entry| entry.sink_tx.clone());

            if let Some(sink) = sink {
                if sink.send(point.value).await.is_ok() {
                    return Ok(());
                }
                // The entry was drained and removed by a concurrent
                // cycle; clear the stale slot and store a fresh one.
                entries.remove_if(point.fingerprint(), |_, entry| entry.sink_tx.is_closed());
                continue;
            }

            match entries.entry(point.fingerprint.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    let (sink_tx, sink_rx) =
                        mpsc::channel(self.inner.config.point_value_buffer_size);
                    // A fresh channel always has room for the seed value.
                    let _ = sink_tx.try_send(point.value);
                    slot.insert(FlatEntry {
                        operation: point.operation,
                        timestamp: point.timestamp,
                        payload: point.payload,
                        sink_tx,
                        sink_rx: std::sync::Mutex::new(sink_rx),
                    });
                    return Ok(());
                }
            }
        }
    }

    /// Spawns the background cycle task; a no-op when already started.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .processor
            .start(move |fingerprint, entry| inner.process_entry(fingerprint, entry));
    }

    /// Runs one flattening cycle synchronously (manual mode and tests).
    /// Returns the number of entries visited.
    pub fn process_cycle(&self) -> usize {
        let inner = Arc::clone(&self.inner);
        self.inner
            .processor
            .process_cycle(move |fingerprint, entry| inner.process_entry(fingerprint, entry))
    }

    /// Signals the cycle task to exit; idempotent, safe before start.
    pub fn stop(&self) {
        self.inner.processor.stop();
    }

    /// Number of fingerprints currently buffered.
    pub fn pending_fingerprints(&self) -> usize {
        self.inner.processor.entries().len()
    }
}

impl FlattenerInner {
    fn process_entry(&self, fingerprint: &str, entry: &FlatEntry) -> EntryAction {
        let Some(transport) = self.transport.load_full() else {
            warn!("transport is not configured, keeping samples buffered");
            return EntryAction::Keep;
        };

        let mut values = Vec::new();
        {
            let mut sink = match entry.sink_rx.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Close before draining: a send racing with this cycle
            // either lands in the drained set or fails and re-creates
            // the entry, so no sample can vanish with the removal.
            sink.close();
            while let Ok(value) = sink.try_recv() {
                values.push(value);
            }
        }

        // Nothing buffered since the entry appeared (a concurrent drain
        // got there first): keep it and retry next cycle.
        if values.is_empty() {
            return EntryAction::Keep;
        }

        let value = flatten(entry.operation, &values);
        let point = FlattenerPoint {
            fingerprint: fingerprint.to_owned(),
            operation: entry.operation,
            timestamp: entry.timestamp,
            payload: entry.payload.clone(),
            value,
        };

        match transport.flattener_point_to_payload(&point) {
            Ok(item) => transport.submit(item),
            Err(e) => error!(error = %e, "error translating flattened point"),
        }

        EntryAction::Remove
    }
}

/// Applies one flatten operation to a drained sample list.
fn flatten(operation: FlatOperation, values: &[f64]) -> f64 {
    match operation {
        FlatOperation::Sum => values.iter().sum(),
        FlatOperation::Avg => values.iter().sum::<f64>() / values.len() as f64,
        FlatOperation::Count => values.len() as f64,
        FlatOperation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        FlatOperation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}
