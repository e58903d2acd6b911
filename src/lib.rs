//! Client-side timeline library.
//!
//! Accepts a high volume of individually produced timeseries points,
//! reduces them through in-memory aggregation, and ships them in
//! batches to a remote timeseries backend over HTTP, TCP (OpenTSDB
//! telnet-style) or UDP.
//!
//! Three engines do the work:
//!
//! - the [`Flattener`] collapses many same-identity samples within a
//!   cycle into one aggregated point (avg, sum, count, min, max);
//! - the [`Accumulator`] keeps long-lived counters keyed by identity
//!   fingerprint, emitting and resetting them every cycle, with
//!   TTL-based eviction;
//! - the transports buffer outgoing points, batch them on an interval,
//!   serialize and deliver them, reconnecting as needed on the stream
//!   protocols.
//!
//! A [`Manager`] wires one transport plus the optional processors to
//! one backend and offers typed submission helpers:
//!
//! ```no_run
//! use std::time::Duration;
//! use pointcast::{
//!     Backend, DataTransformerConfig, DefaultTransportConfig, FlatOperation, Flattener,
//!     HashAlgorithm, Manager, OpenTsdbTransport, OpenTsdbTransportConfig,
//!     StreamConnectionConfig, Transport,
//! };
//!
//! # async fn run() -> pointcast::Result<()> {
//! let transport = OpenTsdbTransport::new(OpenTsdbTransportConfig {
//!     transport: DefaultTransportConfig {
//!         transport_buffer_size: 1024,
//!         batch_send_interval: Duration::from_secs(30),
//!         time_between_batches: Duration::from_millis(100),
//!         request_timeout: Duration::from_secs(5),
//!         serializer_buffer_size: 2048,
//!         debug_input: false,
//!         debug_output: false,
//!         print_stack_on_error: false,
//!     },
//!     connection: StreamConnectionConfig {
//!         read_buffer_size: 64,
//!         max_read_timeout: Duration::from_millis(100),
//!         reconnection_timeout: Duration::from_secs(3),
//!         max_reconnection_retries: 0,
//!         disconnect_after_writes: false,
//!     },
//! })?;
//!
//! let flattener = Flattener::new(DataTransformerConfig {
//!     cycle_duration: Duration::from_secs(15),
//!     hashing_algorithm: HashAlgorithm::Shake128,
//!     hash_size: 12,
//!     point_value_buffer_size: 256,
//!     name: String::new(),
//! })?;
//!
//! let manager = Manager::new(
//!     Transport::OpenTsdb(transport),
//!     Some(flattener),
//!     None,
//!     &Backend { host: "tsdb.internal".into(), port: 4242 },
//!     &[],
//! )?;
//!
//! manager.start(false);
//! manager
//!     .flatten_opentsdb(
//!         FlatOperation::Sum,
//!         1.0,
//!         0,
//!         "requests.count",
//!         vec![("host".into(), "web-1".into())],
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Delivery is best-effort: windows that fail to serialize or transfer
//! are dropped and logged, never retried, and no wire error ever
//! reaches the producing call site.

mod accumulator;
pub mod buffer;
pub mod config;
mod error;
mod flattener;
pub mod hash;
mod manager;
mod point;
mod processor;
mod serialize;
pub mod transport;

pub use accumulator::Accumulator;
pub use buffer::PointBuffer;
pub use config::{
    Backend, DataTransformerConfig, DefaultTransportConfig, HttpTransportConfig,
    JsonMappingConfig, OpenTsdbTransportConfig, StreamConnectionConfig, UdpTransportConfig,
    DEFAULT_RECONNECTION_RETRIES,
};
pub use error::{Error, Result};
pub use flattener::Flattener;
pub use hash::HashAlgorithm;
pub use manager::Manager;
pub use point::{FlatOperation, FlattenerPoint, JsonPoint, OpenTsdbPoint, Payload, PropertyValue};
pub use transport::{HttpTransport, OpenTsdbTransport, Transport, TransportKind, UdpTransport};
