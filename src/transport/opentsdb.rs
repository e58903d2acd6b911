//! OpenTSDB telnet wire layer: one persistent TCP connection, one
//! concatenated block of `put` lines per window.

use std::sync::Arc;

use crate::config::{Backend, OpenTsdbTransportConfig};
use crate::error::{Error, Result};
use crate::point::Payload;
use crate::serialize;
use crate::transport::conn::{SocketKind, StreamConnection};
use crate::transport::core::{self, log_error, TransportCore, Wire};

/// Ships point windows as OpenTSDB telnet `put` lines over TCP. Cheap
/// to clone; clones share the buffer and the connection.
#[derive(Clone)]
pub struct OpenTsdbTransport {
    inner: Arc<OpenTsdbInner>,
}

pub(crate) struct OpenTsdbInner {
    core: TransportCore,
    config: OpenTsdbTransportConfig,
    conn: Arc<StreamConnection>,
}

impl OpenTsdbTransport {
    /// Builds the transport, refusing invalid configurations.
    pub fn new(config: OpenTsdbTransportConfig) -> Result<Self> {
        config.validate()?;

        let conn = Arc::new(StreamConnection::new(
            SocketKind::Tcp,
            config.connection.clone(),
            config.transport.request_timeout,
            config.transport.print_stack_on_error,
        ));

        Ok(Self {
            inner: Arc::new(OpenTsdbInner {
                core: TransportCore::new(config.transport.clone()),
                config,
                conn,
            }),
        })
    }

    pub(crate) fn core(&self) -> &TransportCore {
        &self.inner.core
    }

    /// Resolves and stores the backend address.
    pub fn configure_backend(&self, backend: &Backend) -> Result<()> {
        self.inner.conn.configure(backend)
    }

    pub(crate) fn start(&self, manual_mode: bool) {
        core::start_batch_loop(&self.inner, manual_mode);
    }

    pub(crate) async fn close(&self) {
        self.inner.core.close();
        self.inner.conn.close().await;
    }

    pub(crate) async fn send_data(&self) {
        core::send_data(&*self.inner).await;
    }

    pub(crate) fn serialize(&self, item: &Payload) -> Result<String> {
        match item {
            Payload::OpenTsdb(point) => {
                let mut out = String::with_capacity(
                    self.inner.config.transport.serializer_buffer_size,
                );
                serialize::opentsdb_line(point, &mut out);
                Ok(out)
            }
            other => Err(Error::Translation(format!(
                "this transport does not serialize {} points",
                other.shape()
            ))),
        }
    }

    pub(crate) fn serialize_payload(&self, items: &[Payload]) -> Result<Vec<String>> {
        self.inner.serialize_payload(items)
    }

    pub(crate) async fn transfer_data(&self, payload: &[String]) -> Result<()> {
        self.inner.transfer_data_impl(payload).await
    }
}

impl OpenTsdbInner {
    /// Delivers the window in an isolated task so an unexpected fault in
    /// the connection path is contained, logged and reported as a failed
    /// transfer instead of taking the batch loop down.
    async fn transfer_data_impl(&self, payload: &[String]) -> Result<()> {
        // The telnet wire carries exactly one block of lines per window.
        if payload.len() != 1 {
            return Err(Error::InvalidPayloadSize);
        }

        let conn = Arc::clone(&self.conn);
        let block = payload[0].clone();

        match tokio::spawn(async move { conn.transfer(&block).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                log_error(
                    self.config.transport.print_stack_on_error,
                    &e,
                    "transfer recovered from panic",
                );
                Err(Error::Transfer("transfer panicked".into()))
            }
            Err(e) => Err(Error::Transfer(e.to_string())),
        }
    }
}

impl Wire for OpenTsdbInner {
    fn core(&self) -> &TransportCore {
        &self.core
    }

    fn serialize_payload(&self, items: &[Payload]) -> Result<Vec<String>> {
        let mut block = String::with_capacity(
            self.config.transport.serializer_buffer_size * items.len().max(1),
        );

        for item in items {
            match item {
                Payload::OpenTsdb(point) => serialize::opentsdb_line(point, &mut block),
                other => {
                    return Err(Error::Translation(format!(
                        "this transport does not serialize {} points",
                        other.shape()
                    )))
                }
            }
        }

        Ok(vec![block])
    }

    fn transfer_data(
        &self,
        payload: &[String],
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        self.transfer_data_impl(payload)
    }
}
