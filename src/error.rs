use thiserror::Error;

/// Errors surfaced by producer-facing operations.
///
/// Only construction and submission paths return these. Cycle-time and
/// wire-time failures are logged by the background tasks and never
/// propagate back to the producer.
#[derive(Error, Debug)]
pub enum Error {
    /// A component refused to build from an invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The fingerprint given to [`Accumulator::add`](crate::Accumulator::add)
    /// has no stored entry (never stored, or evicted by its TTL).
    #[error("fingerprint is not stored")]
    NotStored,

    /// A raw operation id did not map to any flatten operation.
    #[error("operation id {0} is not mapped")]
    UnknownOperation(u8),

    /// A wire layer was called with the wrong number of payload strings.
    /// HTTP and OpenTSDB expect exactly one per window, UDP at least one.
    #[error("invalid payload size")]
    InvalidPayloadSize,

    /// A typed submission helper was used against a transport that does
    /// not speak that point shape.
    #[error("this transport does not accept {0} points")]
    IncompatibleTransport(&'static str),

    /// A payload could not be interpreted as the expected point shape.
    #[error("translation failed: {0}")]
    Translation(String),

    /// The wire layer failed to deliver a window.
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("http request failed")]
    Http(#[from] reqwest::Error),

    #[error("i/o failure")]
    Io(#[from] std::io::Error),

    #[error("json serialization failed")]
    Serialize(#[from] serde_json::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
