//! Persistent connection handling for the stream transports.
//!
//! One state machine serves both TCP and UDP:
//! `disconnected → connecting → connected → {disconnected, closed}`.
//! Writes run under the request deadline; a failed write marks the
//! connection disconnected and the transfer path reconnects before the
//! next retry. Reconnection itself is unbounded (the per-write retry
//! bound does not apply to it) and only ends when a dial succeeds or
//! the transport closes.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::RwLock;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Backend, StreamConnectionConfig};
use crate::error::{Error, Result};
use crate::transport::core::log_error;

/// Which protocol this connection speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketKind {
    Tcp,
    Udp,
}

enum RawSocket {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// Read/write operation labels used in connection error events.
#[derive(Debug, Clone, Copy)]
enum RwOp {
    Write,
    WriteTimeout,
    WriteConnClosed,
    Read,
    ReadConnClosed,
}

impl RwOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::WriteTimeout => "write_timeout",
            Self::WriteConnClosed => "write_conn_closed",
            Self::Read => "read",
            Self::ReadConnClosed => "read_conn_closed",
        }
    }
}

/// A single persistent connection to the backend.
pub(crate) struct StreamConnection {
    kind: SocketKind,
    config: StreamConnectionConfig,
    request_timeout: Duration,
    print_stack_on_error: bool,
    address: RwLock<Option<SocketAddr>>,
    socket: tokio::sync::Mutex<Option<RawSocket>>,
    cancel: CancellationToken,
}

impl StreamConnection {
    pub fn new(
        kind: SocketKind,
        config: StreamConnectionConfig,
        request_timeout: Duration,
        print_stack_on_error: bool,
    ) -> Self {
        Self {
            kind,
            config,
            request_timeout,
            print_stack_on_error,
            address: RwLock::new(None),
            socket: tokio::sync::Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Resolves and stores the backend address.
    pub fn configure(&self, backend: &Backend) -> Result<()> {
        let address = (backend.host.as_str(), backend.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                Error::InvalidConfiguration(format!(
                    "backend address did not resolve: {}",
                    backend.address()
                ))
            })?;

        if let Ok(mut guard) = self.address.write() {
            *guard = Some(address);
        }
        Ok(())
    }

    fn configured_address(&self) -> Result<SocketAddr> {
        self.address
            .read()
            .ok()
            .and_then(|guard| *guard)
            .ok_or_else(|| Error::InvalidConfiguration("no backend was configured".into()))
    }

    /// Delivers one payload: up to the configured number of
    /// {write → read → done | mark-disconnected → reconnect} cycles.
    /// On success with `disconnect_after_writes` set, the connection is
    /// closed immediately.
    pub async fn transfer(&self, payload: &str) -> Result<()> {
        let retries = self.config.reconnection_retries();

        for _ in 0..retries {
            if self.write_payload(payload).await {
                if self.config.disconnect_after_writes {
                    debug!("disconnecting after successful write");
                    self.close_connection().await;
                }
                return Ok(());
            }

            self.close_connection().await;
            if !self.retry_connect().await {
                return Err(Error::Transfer("connection is closed".into()));
            }
        }

        Err(Error::Transfer(format!(
            "payload dropped after {retries} write attempts"
        )))
    }

    /// One write-then-read attempt against the current connection.
    /// Returns false when the connection must be re-established.
    async fn write_payload(&self, payload: &str) -> bool {
        let mut guard = self.socket.lock().await;
        let Some(socket) = guard.as_mut() else {
            info!("connection is not ready");
            return false;
        };

        let write = async {
            match socket {
                RawSocket::Tcp(stream) => stream.write_all(payload.as_bytes()).await,
                RawSocket::Udp(socket) => socket.send(payload.as_bytes()).await.map(|_| ()),
            }
        };

        match tokio::time::timeout(self.request_timeout, write).await {
            Err(_) => {
                self.log_connection_error(&"write deadline exceeded", RwOp::WriteTimeout);
                return false;
            }
            Ok(Err(e)) if is_connection_loss(&e) => {
                self.log_connection_error(&e, RwOp::WriteConnClosed);
                return false;
            }
            Ok(Err(e)) => {
                self.log_connection_error(&e, RwOp::Write);
                return false;
            }
            Ok(Ok(())) => {
                debug!(bytes = payload.len(), "bytes were written to the connection");
            }
        }

        self.read_response(socket).await
    }

    /// The wire protocol does not answer every write: a TCP read only
    /// checks for an early EOF within the read deadline, and UDP has no
    /// response at all.
    async fn read_response(&self, socket: &mut RawSocket) -> bool {
        let RawSocket::Tcp(stream) = socket else {
            return true;
        };

        let mut read_buffer = vec![0u8; self.config.read_buffer_size];
        match tokio::time::timeout(self.config.max_read_timeout, stream.read(&mut read_buffer))
            .await
        {
            // No response within the deadline is the normal case.
            Err(_) => true,
            Ok(Ok(0)) => {
                self.log_connection_error(&"eof", RwOp::ReadConnClosed);
                false
            }
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                self.log_connection_error(&e, RwOp::Read);
                false
            }
        }
    }

    /// Dials until connected, sleeping `reconnection_timeout` between
    /// attempts. Returns false only when the transport closed.
    async fn retry_connect(&self) -> bool {
        let address = match self.configured_address() {
            Ok(address) => address,
            Err(e) => {
                log_error(self.print_stack_on_error, &e, "cannot reconnect");
                return false;
            }
        };

        info!(%address, "starting a new connection");

        loop {
            match self.dial(address).await {
                Ok(socket) => {
                    *self.socket.lock().await = Some(socket);
                    info!(%address, "connected");
                    return true;
                }
                Err(e) => {
                    info!(
                        %address,
                        error = %e,
                        retry_in = ?self.config.reconnection_timeout,
                        "error connecting to address",
                    );
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.config.reconnection_timeout) => {}
            }
        }
    }

    async fn dial(&self, address: SocketAddr) -> std::io::Result<RawSocket> {
        match self.kind {
            SocketKind::Tcp => TcpStream::connect(address).await.map(RawSocket::Tcp),
            SocketKind::Udp => {
                let local: SocketAddr = if address.is_ipv4() {
                    "0.0.0.0:0".parse().expect("ipv4 wildcard address")
                } else {
                    "[::]:0".parse().expect("ipv6 wildcard address")
                };
                let socket = UdpSocket::bind(local).await?;
                socket.connect(address).await?;
                Ok(RawSocket::Udp(socket))
            }
        }
    }

    /// Drops the current connection, transitioning to disconnected.
    pub async fn close_connection(&self) {
        if self.socket.lock().await.take().is_some() {
            info!("connection closed");
        }
    }

    /// Closes the connection and terminates any in-flight reconnect
    /// loop at its next wake.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.close_connection().await;
    }

    fn log_connection_error(&self, error: &dyn std::fmt::Display, operation: RwOp) {
        log_error(
            self.print_stack_on_error,
            error,
            &format!(
                "[{}] error executing operation on connection",
                operation.as_str()
            ),
        );
    }
}

/// Errors that mean the peer went away rather than a transient fault.
fn is_connection_loss(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::WriteZero
    )
}
