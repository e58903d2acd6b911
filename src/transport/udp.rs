//! UDP wire layer: one JSON datagram per point.

use std::sync::Arc;

use crate::config::{Backend, UdpTransportConfig};
use crate::error::{Error, Result};
use crate::point::Payload;
use crate::serialize;
use crate::transport::conn::{SocketKind, StreamConnection};
use crate::transport::core::{self, log_error, TransportCore, Wire};

/// Ships each point as its own JSON datagram. Cheap to clone; clones
/// share the buffer and the socket.
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpInner>,
}

pub(crate) struct UdpInner {
    core: TransportCore,
    config: UdpTransportConfig,
    conn: Arc<StreamConnection>,
}

impl UdpTransport {
    /// Builds the transport, refusing invalid configurations.
    pub fn new(config: UdpTransportConfig) -> Result<Self> {
        config.validate()?;

        let conn = Arc::new(StreamConnection::new(
            SocketKind::Udp,
            config.connection.clone(),
            config.transport.request_timeout,
            config.transport.print_stack_on_error,
        ));

        Ok(Self {
            inner: Arc::new(UdpInner {
                core: TransportCore::new(config.transport.clone()),
                config,
                conn,
            }),
        })
    }

    pub(crate) fn config(&self) -> &UdpTransportConfig {
        &self.inner.config
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
            Payload::Json(point) => {
                serialize::json_object(point, self.inner.config.transport.serializer_buffer_size)
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

impl UdpInner {
    /// Sends one datagram per payload string, in an isolated task so an
    /// unexpected fault is contained, logged and reported as a failed
    /// transfer.
    async fn transfer_data_impl(&self, payload: &[String]) -> Result<()> {
        if payload.is_empty() {
            return Err(Error::InvalidPayloadSize);
        }

        let conn = Arc::clone(&self.conn);
        let datagrams = payload.to_vec();

        let task = tokio::spawn(async move {
            for datagram in &datagrams {
                conn.transfer(datagram).await?;
            }
            Ok(())
        });

        match task.await {
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

impl Wire for UdpInner {
    fn core(&self) -> &TransportCore {
        &self.core
    }

    fn serialize_payload(&self, items: &[Payload]) -> Result<Vec<String>> {
        items
            .iter()
            .map(|item| match item {
                Payload::Json(point) => serialize::json_object(
                    point,
                    self.config.transport.serializer_buffer_size,
                ),
                other => Err(Error::Translation(format!(
                    "this transport does not serialize {} points",
                    other.shape()
                ))),
            })
            .collect()
    }

    fn transfer_data(
        &self,
        payload: &[String],
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        self.transfer_data_impl(payload)
    }
}
