//! The manager façade: wires one transport, an optional flattener and
//! an optional accumulator to one backend, owns their lifecycles and
//! offers the typed submission helpers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::accumulator::Accumulator;
use crate::config::Backend;
use crate::error::{Error, Result};
use crate::flattener::Flattener;
use crate::point::{
    epoch_seconds, FlatOperation, JsonPoint, OpenTsdbPoint, Payload, PropertyValue,
};
use crate::transport::{Transport, TransportKind};

/// Wires the aggregation components to one timeseries backend.
///
/// In **manual mode** none of the background tasks tick; the caller
/// drives [`Manager::process_cycle`] and [`Manager::send_data`]
/// explicitly (deterministic testing and embedded use).
pub struct Manager {
    transport: Transport,
    flattener: Option<Flattener>,
    accumulator: Option<Accumulator>,
    manual_mode: AtomicBool,
}

impl Manager {
    /// Builds a manager: attaches the contextual logging path (backend
    /// `host:port` plus `context` labels), resolves the backend address
    /// and injects the transport into the processors.
    pub fn new(
        transport: Transport,
        flattener: Option<Flattener>,
        accumulator: Option<Accumulator>,
        backend: &Backend,
        context: &[&str],
    ) -> Result<Self> {
        let id = backend.address();

        transport.build_contextual_logger(&id, context);
        transport.configure_backend(backend)?;

        if let Some(flattener) = &flattener {
            flattener.build_contextual_logger(&id, context);
            flattener.set_transport(&transport);
        }

        if let Some(accumulator) = &accumulator {
            accumulator.build_contextual_logger(&id, context);
            accumulator.set_transport(&transport);
        }

        Ok(Self {
            transport,
            flattener,
            accumulator,
            manual_mode: AtomicBool::new(false),
        })
    }

    /// Starts the transport and, outside manual mode, the processor
    /// cycles. Idempotent.
    pub fn start(&self, manual_mode: bool) {
        self.manual_mode.store(manual_mode, Ordering::SeqCst);
        self.transport.start(manual_mode);

        if manual_mode {
            return;
        }

        if let Some(flattener) = &self.flattener {
            flattener.start();
        }
        if let Some(accumulator) = &self.accumulator {
            accumulator.start();
        }
    }

    /// Stops the processors first, then closes the transport.
    /// Idempotent and safe before start.
    pub async fn shutdown(&self) {
        if let Some(flattener) = &self.flattener {
            flattener.stop();
        }
        if let Some(accumulator) = &self.accumulator {
            accumulator.stop();
        }
        self.transport.close().await;
    }

    /// The configured transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    fn is_manual(&self) -> bool {
        self.manual_mode.load(Ordering::SeqCst)
    }

    /// Runs one processor cycle explicitly. Only effective in manual
    /// mode.
    pub fn process_cycle(&self) {
        if !self.is_manual() {
            return;
        }

        if let Some(flattener) = &self.flattener {
            flattener.process_cycle();
        }
        if let Some(accumulator) = &self.accumulator {
            accumulator.process_cycle();
        }
    }

    /// Runs one batch pass explicitly. Only effective in manual mode.
    pub async fn send_data(&self) {
        if !self.is_manual() {
            return;
        }
        self.transport.send_data().await;
    }

    fn ensure_json_capable(&self) -> Result<()> {
        if self.transport.match_kind(TransportKind::Http)
            || self.transport.match_kind(TransportKind::Udp)
        {
            Ok(())
        } else {
            Err(Error::IncompatibleTransport("json"))
        }
    }

    fn ensure_opentsdb_capable(&self) -> Result<()> {
        if self.transport.match_kind(TransportKind::OpenTsdb) {
            Ok(())
        } else {
            Err(Error::IncompatibleTransport("opentsdb"))
        }
    }

    fn flattener(&self) -> Result<&Flattener> {
        self.flattener
            .as_ref()
            .ok_or_else(|| Error::InvalidConfiguration("no flattener was configured".into()))
    }

    fn accumulator(&self) -> Result<&Accumulator> {
        self.accumulator
            .as_ref()
            .ok_or_else(|| Error::InvalidConfiguration("no accumulator was configured".into()))
    }

    // --- Direct submission ---

    /// Enqueues one already-shaped item.
    pub fn send(&self, item: Payload) {
        self.transport.submit(item);
    }

    /// Enqueues each element of an item list individually.
    pub fn send_many(&self, items: Vec<Payload>) {
        self.transport.submit_many(items);
    }

    /// Enqueues a JSON point.
    pub fn send_json(
        &self,
        name: impl Into<String>,
        properties: Vec<(String, PropertyValue)>,
    ) -> Result<()> {
        self.ensure_json_capable()?;
        self.transport
            .submit(Payload::Json(JsonPoint::new(name, properties)));
        Ok(())
    }

    /// Enqueues an OpenTSDB point; a zero timestamp means now.
    pub fn send_opentsdb(
        &self,
        value: f64,
        timestamp: i64,
        metric: impl Into<String>,
        tags: Vec<(String, String)>,
    ) -> Result<()> {
        self.ensure_opentsdb_capable()?;

        let timestamp = if timestamp == 0 {
            epoch_seconds()
        } else {
            timestamp
        };

        self.transport
            .submit(Payload::OpenTsdb(OpenTsdbPoint::new(
                metric, timestamp, value, tags,
            )));
        Ok(())
    }

    // --- Flattening ---

    /// Hands one sample to the flattener under the given operation.
    pub async fn flatten(&self, operation: FlatOperation, item: &Payload) -> Result<()> {
        let flattener = self.flattener()?;
        let point = self
            .transport
            .payload_to_flattener_point(flattener.config(), item, operation)?;
        flattener.add(point).await
    }

    /// Flattens a JSON point.
    pub async fn flatten_json(
        &self,
        operation: FlatOperation,
        name: impl Into<String>,
        properties: Vec<(String, PropertyValue)>,
    ) -> Result<()> {
        self.ensure_json_capable()?;
        self.flatten(
            operation,
            &Payload::Json(JsonPoint::new(name, properties)),
        )
        .await
    }

    /// Flattens an OpenTSDB point.
    pub async fn flatten_opentsdb(
        &self,
        operation: FlatOperation,
        value: f64,
        timestamp: i64,
        metric: impl Into<String>,
        tags: Vec<(String, String)>,
    ) -> Result<()> {
        self.ensure_opentsdb_capable()?;
        self.flatten(
            operation,
            &Payload::OpenTsdb(OpenTsdbPoint::new(metric, timestamp, value, tags)),
        )
        .await
    }

    // --- Accumulation ---

    /// Stores an item to accumulate, returning its fingerprint.
    pub fn store_to_accumulate(&self, item: &Payload, ttl: Duration) -> Result<String> {
        self.accumulator()?.store(item, ttl)
    }

    /// Stores a JSON point to accumulate, returning its fingerprint.
    pub fn store_json_to_accumulate(
        &self,
        ttl: Duration,
        name: impl Into<String>,
        properties: Vec<(String, PropertyValue)>,
    ) -> Result<String> {
        self.store_to_accumulate(&Payload::Json(JsonPoint::new(name, properties)), ttl)
    }

    /// Stores a JSON point under a caller-supplied fingerprint.
    pub fn store_hashed_json_to_accumulate(
        &self,
        fingerprint: impl Into<String>,
        ttl: Duration,
        name: impl Into<String>,
        properties: Vec<(String, PropertyValue)>,
    ) -> Result<()> {
        self.accumulator()?.store_custom_fingerprint(
            &Payload::Json(JsonPoint::new(name, properties)),
            ttl,
            fingerprint,
        )
    }

    /// Stores an OpenTSDB point to accumulate, returning its
    /// fingerprint.
    pub fn store_opentsdb_to_accumulate(
        &self,
        ttl: Duration,
        value: f64,
        timestamp: i64,
        metric: impl Into<String>,
        tags: Vec<(String, String)>,
    ) -> Result<String> {
        self.store_to_accumulate(
            &Payload::OpenTsdb(OpenTsdbPoint::new(metric, timestamp, value, tags)),
            ttl,
        )
    }

    /// Stores an OpenTSDB point under a caller-supplied fingerprint.
    pub fn store_hashed_opentsdb_to_accumulate(
        &self,
        fingerprint: impl Into<String>,
        ttl: Duration,
        value: f64,
        timestamp: i64,
        metric: impl Into<String>,
        tags: Vec<(String, String)>,
    ) -> Result<()> {
        self.accumulator()?.store_custom_fingerprint(
            &Payload::OpenTsdb(OpenTsdbPoint::new(metric, timestamp, value, tags)),
            ttl,
            fingerprint,
        )
    }

    /// Increments previously stored accumulated data.
    pub fn increment_accumulated_data(&self, fingerprint: &str) -> Result<()> {
        self.accumulator()?.add(fingerprint)
    }

    // --- Serialization ---

    /// Renders an item with the transport's serializer.
    pub fn serialize(&self, item: &Payload) -> Result<String> {
        self.transport.serialize(item)
    }

    /// Renders a JSON point with the transport's serializer.
    pub fn serialize_json(
        &self,
        name: impl Into<String>,
        properties: Vec<(String, PropertyValue)>,
    ) -> Result<String> {
        self.serialize(&Payload::Json(JsonPoint::new(name, properties)))
    }

    /// Renders an OpenTSDB point with the transport's serializer.
    pub fn serialize_opentsdb(
        &self,
        value: f64,
        timestamp: i64,
        metric: impl Into<String>,
        tags: Vec<(String, String)>,
    ) -> Result<String> {
        self.serialize(&Payload::OpenTsdb(OpenTsdbPoint::new(
            metric, timestamp, value, tags,
        )))
    }
}
