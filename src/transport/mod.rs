//! Wire transports and the translation adapters they expose.
//!
//! `Transport` uses enum dispatch rather than trait objects: the set of
//! wire formats is closed, and it keeps the async delivery methods free
//! of boxed futures.

pub(crate) mod conn;
pub(crate) mod core;
pub mod http;
pub mod opentsdb;
pub(crate) mod translate;
pub mod udp;

use tracing::info_span;

use crate::config::{Backend, DataTransformerConfig};
use crate::error::Result;
use crate::point::{FlatOperation, FlattenerPoint, Payload};

pub use http::HttpTransport;
pub use opentsdb::OpenTsdbTransport;
pub use udp::UdpTransport;

pub(crate) use translate::AccumulatedPoint;

/// The wire format a transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    OpenTsdb,
    Udp,
}

/// One configured wire transport.
#[derive(Clone)]
pub enum Transport {
    Http(HttpTransport),
    OpenTsdb(OpenTsdbTransport),
    Udp(UdpTransport),
}

impl Transport {
    /// The wire format this transport speaks.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Http(_) => TransportKind::Http,
            Self::OpenTsdb(_) => TransportKind::OpenTsdb,
            Self::Udp(_) => TransportKind::Udp,
        }
    }

    /// Checks this transport against a wire format.
    pub fn match_kind(&self, kind: TransportKind) -> bool {
        self.kind() == kind
    }

    /// Non-blocking enqueue of one outgoing item.
    pub fn submit(&self, item: Payload) {
        self.core().submit(item);
    }

    /// Enqueues each element of an item list individually.
    pub fn submit_many(&self, items: Vec<Payload>) {
        self.core().submit_many(items);
    }

    /// Resolves and stores the backend address.
    pub fn configure_backend(&self, backend: &Backend) -> Result<()> {
        match self {
            Self::Http(t) => t.configure_backend(backend),
            Self::OpenTsdb(t) => t.configure_backend(backend),
            Self::Udp(t) => t.configure_backend(backend),
        }
    }

    /// Starts the batch loop; idempotent. In manual mode the loop does
    /// not tick and [`Transport::send_data`] drives delivery.
    pub fn start(&self, manual_mode: bool) {
        match self {
            Self::Http(t) => t.start(manual_mode),
            Self::OpenTsdb(t) => t.start(manual_mode),
            Self::Udp(t) => t.start(manual_mode),
        }
    }

    /// Stops the batch loop and releases resources; idempotent.
    pub async fn close(&self) {
        match self {
            Self::Http(t) => t.close(),
            Self::OpenTsdb(t) => t.close().await,
            Self::Udp(t) => t.close().await,
        }
    }

    /// Runs one manual batch pass.
    pub async fn send_data(&self) {
        match self {
            Self::Http(t) => t.send_data().await,
            Self::OpenTsdb(t) => t.send_data().await,
            Self::Udp(t) => t.send_data().await,
        }
    }

    /// Renders one item with this transport's serializer.
    pub fn serialize(&self, item: &Payload) -> Result<String> {
        match self {
            Self::Http(t) => t.serialize(item),
            Self::OpenTsdb(t) => t.serialize(item),
            Self::Udp(t) => t.serialize(item),
        }
    }

    /// Serializes one window into wire payload strings.
    pub fn serialize_payload(&self, items: &[Payload]) -> Result<Vec<String>> {
        match self {
            Self::Http(t) => t.serialize_payload(items),
            Self::OpenTsdb(t) => t.serialize_payload(items),
            Self::Udp(t) => t.serialize_payload(items),
        }
    }

    /// Delivers one serialized window over the wire.
    pub async fn transfer_data(&self, payload: &[String]) -> Result<()> {
        match self {
            Self::Http(t) => t.transfer_data(payload).await,
            Self::OpenTsdb(t) => t.transfer_data(payload).await,
            Self::Udp(t) => t.transfer_data(payload).await,
        }
    }

    /// Builds the contextual span used by the batch loop: the backend
    /// `host:port` plus any custom context labels.
    pub fn build_contextual_logger(&self, id: &str, context: &[&str]) {
        let span = if context.is_empty() {
            info_span!("transport", id = %id)
        } else {
            info_span!("transport", id = %id, context = %context.join(","))
        };
        self.core().set_span(span);
    }

    fn core(&self) -> &core::TransportCore {
        match self {
            Self::Http(t) => t.core(),
            Self::OpenTsdb(t) => t.core(),
            Self::Udp(t) => t.core(),
        }
    }

    // --- Translation adapters ---

    /// Converts a producer item into a flattener sample, computing its
    /// fingerprint over the identity fields plus the operation.
    pub(crate) fn payload_to_flattener_point(
        &self,
        config: &DataTransformerConfig,
        item: &Payload,
        operation: FlatOperation,
    ) -> Result<FlattenerPoint> {
        match self {
            Self::Http(t) => translate::json_to_flattener_point(
                config,
                &t.config().mapping,
                item,
                operation,
            ),
            Self::Udp(t) => translate::json_to_flattener_point(
                config,
                &t.config().mapping,
                item,
                operation,
            ),
            Self::OpenTsdb(_) => translate::opentsdb_to_flattener_point(config, item, operation),
        }
    }

    /// Converts an aggregated flattener sample back into the producer
    /// shape, restoring the timestamp and value fields.
    pub(crate) fn flattener_point_to_payload(&self, point: &FlattenerPoint) -> Result<Payload> {
        match self {
            Self::Http(t) => translate::flattener_point_to_json(&t.config().mapping, point),
            Self::Udp(t) => translate::flattener_point_to_json(&t.config().mapping, point),
            Self::OpenTsdb(_) => translate::flattener_point_to_opentsdb(point),
        }
    }

    /// Converts a producer item into an accumulated point, optionally
    /// computing its fingerprint.
    pub(crate) fn payload_to_accumulated(
        &self,
        config: &DataTransformerConfig,
        item: &Payload,
        calculate_hash: bool,
    ) -> Result<AccumulatedPoint> {
        match self {
            Self::Http(t) => {
                translate::json_to_accumulated(config, &t.config().mapping, item, calculate_hash)
            }
            Self::Udp(t) => {
                translate::json_to_accumulated(config, &t.config().mapping, item, calculate_hash)
            }
            Self::OpenTsdb(_) => translate::opentsdb_to_accumulated(config, item, calculate_hash),
        }
    }

    /// Converts an accumulated entry into the producer shape carrying
    /// the emitted count as its value.
    pub(crate) fn accumulated_to_payload(&self, payload: &Payload, count: u64) -> Result<Payload> {
        match self {
            Self::Http(t) => translate::accumulated_to_json(&t.config().mapping, payload, count),
            Self::Udp(t) => translate::accumulated_to_json(&t.config().mapping, payload, count),
            Self::OpenTsdb(_) => translate::accumulated_to_opentsdb(payload, count),
        }
    }
}

impl From<HttpTransport> for Transport {
    fn from(t: HttpTransport) -> Self {
        Self::Http(t)
    }
}

impl From<OpenTsdbTransport> for Transport {
    fn from(t: OpenTsdbTransport) -> Self {
        Self::OpenTsdb(t)
    }
}

impl From<UdpTransport> for Transport {
    fn from(t: UdpTransport) -> Self {
        Self::Udp(t)
    }
}
