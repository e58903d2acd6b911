//! Configuration structs.
//!
//! All structs deserialize from any serde format the host application
//! picks (durations in humantime form, e.g. `"5s"`). Loading files is
//! the host's business; this module only validates values, refusing to
//! build components from configurations that cannot work.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;

/// Number of per-write reconnection cycles used when the configured
/// value is zero.
pub const DEFAULT_RECONNECTION_RETRIES: usize = 3;

/// A timeseries backend address.
#[derive(Debug, Clone, Deserialize)]
pub struct Backend {
    pub host: String,
    pub port: u16,
}

impl Backend {
    /// `host:port` form used in logging context and address resolution.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options shared by every transport.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultTransportConfig {
    /// Maximum number of points per serialized window.
    pub transport_buffer_size: usize,

    /// Batch-loop tick.
    #[serde(with = "humantime_serde")]
    pub batch_send_interval: Duration,

    /// Sleep between consecutive windows within one tick.
    #[serde(default, with = "humantime_serde")]
    pub time_between_batches: Duration,

    /// Per-write / per-HTTP-call deadline.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Capacity hint for the serializer's working buffer, in bytes.
    pub serializer_buffer_size: usize,

    /// Log every drained point before serialization.
    #[serde(default)]
    pub debug_input: bool,

    /// Log every serialized payload string.
    #[serde(default)]
    pub debug_output: bool,

    /// Attach a captured backtrace to error events.
    #[serde(default)]
    pub print_stack_on_error: bool,
}

impl DefaultTransportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.transport_buffer_size == 0 {
            return Err(Error::InvalidConfiguration(
                "transport buffer size must be positive".into(),
            ));
        }
        if self.serializer_buffer_size == 0 {
            return Err(Error::InvalidConfiguration(
                "serializer buffer size must be positive".into(),
            ));
        }
        if self.batch_send_interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "batch send interval must be positive".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "request timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Options shared by the flattener and the accumulator.
#[derive(Debug, Clone, Deserialize)]
pub struct DataTransformerConfig {
    /// Processing cycle tick.
    #[serde(with = "humantime_serde")]
    pub cycle_duration: Duration,

    /// Fingerprint hash selection.
    pub hashing_algorithm: HashAlgorithm,

    /// Output size in bytes for extendable-output algorithms; ignored
    /// for fixed-width ones.
    #[serde(default)]
    pub hash_size: usize,

    /// Flattener per-fingerprint sample sink capacity.
    #[serde(default = "default_point_value_buffer_size")]
    pub point_value_buffer_size: usize,

    /// Optional instance name, appended to the logging context.
    #[serde(default)]
    pub name: String,
}

fn default_point_value_buffer_size() -> usize {
    100
}

impl DataTransformerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cycle_duration.is_zero() {
            return Err(Error::InvalidConfiguration(
                "cycle duration must be positive".into(),
            ));
        }
        if self.hashing_algorithm.is_extendable() && self.hash_size == 0 {
            return Err(Error::InvalidConfiguration(
                "hash size is required for extendable-output algorithms".into(),
            ));
        }
        Ok(())
    }
}

/// Options for the stream (TCP/UDP) connection handling.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConnectionConfig {
    /// Stream read size in bytes.
    pub read_buffer_size: usize,

    /// Stream read deadline.
    #[serde(with = "humantime_serde")]
    pub max_read_timeout: Duration,

    /// Sleep between reconnection attempts.
    #[serde(with = "humantime_serde")]
    pub reconnection_timeout: Duration,

    /// Per-write reconnection bound; zero selects
    /// [`DEFAULT_RECONNECTION_RETRIES`].
    #[serde(default)]
    pub max_reconnection_retries: usize,

    /// Close the connection after each successful write.
    #[serde(default)]
    pub disconnect_after_writes: bool,
}

impl StreamConnectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(Error::InvalidConfiguration(
                "read buffer size must be positive".into(),
            ));
        }
        if self.max_read_timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "maximum read timeout must be positive".into(),
            ));
        }
        if self.reconnection_timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "reconnection timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Retry bound with the zero-means-default rule applied.
    pub fn reconnection_retries(&self) -> usize {
        if self.max_reconnection_retries == 0 {
            DEFAULT_RECONNECTION_RETRIES
        } else {
            self.max_reconnection_retries
        }
    }
}

/// Property names used by the JSON translation to locate and emit the
/// timestamp and value of a point.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonMappingConfig {
    pub timestamp_property: String,
    pub value_property: String,
}

impl JsonMappingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timestamp_property.is_empty() {
            return Err(Error::InvalidConfiguration(
                "timestamp property is not configured".into(),
            ));
        }
        if self.value_property.is_empty() {
            return Err(Error::InvalidConfiguration(
                "value property is not configured".into(),
            ));
        }
        Ok(())
    }
}

/// HTTP transport options.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpTransportConfig {
    #[serde(flatten)]
    pub transport: DefaultTransportConfig,

    /// Endpoint path under the configured backend origin.
    pub service_endpoint: String,

    /// HTTP method, e.g. `PUT` or `POST`.
    pub method: String,

    /// Status code treated as success; anything else fails the window.
    pub expected_response_status: u16,

    /// Header set sent with every request (content type included).
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(flatten)]
    pub mapping: JsonMappingConfig,
}

impl HttpTransportConfig {
    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        self.mapping.validate()?;
        if self.method.is_empty() {
            return Err(Error::InvalidConfiguration(
                "http method is not configured".into(),
            ));
        }
        if self.expected_response_status == 0 {
            return Err(Error::InvalidConfiguration(
                "expected response status is not configured".into(),
            ));
        }
        Ok(())
    }
}

/// OpenTSDB telnet (TCP) transport options.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenTsdbTransportConfig {
    #[serde(flatten)]
    pub transport: DefaultTransportConfig,

    #[serde(flatten)]
    pub connection: StreamConnectionConfig,
}

impl OpenTsdbTransportConfig {
    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        self.connection.validate()
    }
}

/// UDP transport options. UDP points use the JSON shape, so the mapping
/// configuration applies here as well.
#[derive(Debug, Clone, Deserialize)]
pub struct UdpTransportConfig {
    #[serde(flatten)]
    pub transport: DefaultTransportConfig,

    #[serde(flatten)]
    pub connection: StreamConnectionConfig,

    #[serde(flatten)]
    pub mapping: JsonMappingConfig,
}

impl UdpTransportConfig {
    pub fn validate(&self) -> Result<()> {
        self.transport.validate()?;
        self.connection.validate()?;
        self.mapping.validate()
    }
}
