//! Behaviour shared by every transport: the point buffer, the batch
//! loop, windowing and the debug taps.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument, Span};

use crate::buffer::PointBuffer;
use crate::config::DefaultTransportConfig;
use crate::error::Result;
use crate::point::Payload;

/// Per-protocol delivery hooks consumed by the batch loop.
pub(crate) trait Wire: Send + Sync + 'static {
    /// The shared transport state.
    fn core(&self) -> &TransportCore;

    /// Serializes one window into wire payload strings.
    fn serialize_payload(&self, items: &[Payload]) -> Result<Vec<String>>;

    /// Delivers one serialized window, handling reconnection internally
    /// where the protocol calls for it.
    fn transfer_data(&self, payload: &[String]) -> impl Future<Output = Result<()>> + Send;
}

/// State shared by all transports: the unbounded point buffer, the
/// lifecycle flags and the contextual logging span.
pub(crate) struct TransportCore {
    pub(crate) buffer: PointBuffer,
    pub(crate) config: DefaultTransportConfig,
    started: AtomicBool,
    cancel: CancellationToken,
    span: Mutex<Span>,
}

impl TransportCore {
    pub fn new(config: DefaultTransportConfig) -> Self {
        Self {
            buffer: PointBuffer::new(),
            config,
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            span: Mutex::new(Span::none()),
        }
    }

    /// Non-blocking enqueue of a single outgoing item.
    pub fn submit(&self, item: Payload) {
        self.buffer.add(item);
    }

    /// Enqueues each element of an item list individually.
    pub fn submit_many(&self, items: Vec<Payload>) {
        for item in items {
            self.buffer.add(item);
        }
    }

    /// Replaces the contextual span used by the batch loop.
    pub fn set_span(&self, span: Span) {
        if let Ok(mut guard) = self.span.lock() {
            *guard = span;
        }
    }

    pub fn contextual_span(&self) -> Span {
        self.span
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|_| Span::none())
    }

    /// Marks the transport started. Returns false when it already was
    /// (idempotent re-entry).
    pub fn mark_started(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    /// Stops the batch loop and releases the buffer; idempotent.
    pub fn close(&self) {
        let span = self.contextual_span();
        let _entered = span.enter();
        info!("closing transport");
        self.cancel.cancel();
        self.buffer.release();
        self.started.store(false, Ordering::SeqCst);
    }

    fn debug_input(&self, window: &[Payload]) {
        if self.config.debug_input {
            for item in window {
                debug!(point = ?item, "input");
            }
        }
    }

    fn debug_output(&self, payload: &[String]) {
        if self.config.debug_output {
            for serialized in payload {
                debug!(content = %serialized, "output");
            }
        }
    }
}

/// Logs an error event, attaching a captured backtrace when the
/// transport is configured to print stacks.
pub(crate) fn log_error(print_stack: bool, error: &dyn std::fmt::Display, message: &str) {
    if print_stack {
        error!(
            %error,
            stack = %std::backtrace::Backtrace::force_capture(),
            "{}",
            message,
        );
    } else {
        error!(%error, "{}", message);
    }
}

/// Spawns the batch loop for a wire layer. A no-op when the transport
/// was already started; in manual mode the transport is marked started
/// but nothing ticks (the caller drives [`send_data`] explicitly).
pub(crate) fn start_batch_loop<W: Wire>(wire: &Arc<W>, manual_mode: bool) {
    let core = wire.core();
    if !core.mark_started() {
        return;
    }

    let span = core.contextual_span();
    {
        let _entered = span.enter();
        info!(manual_mode, "starting transport");
    }

    if manual_mode {
        return;
    }

    let wire = Arc::clone(wire);
    tokio::spawn(
        async move {
            info!("initializing transfer data loop");

            let core = wire.core();
            let mut ticker = tokio::time::interval(core.config.batch_send_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = core.cancel.cancelled() => {
                        info!("breaking transfer data loop");
                        return;
                    }

                    _ = ticker.tick() => {
                        send_data(&*wire).await;
                    }
                }
            }
        }
        .instrument(span),
    );
}

/// Runs one batch pass: drains the buffer and walks it in contiguous
/// windows of `transport_buffer_size`, serializing and delivering each.
///
/// A failure to serialize or transfer drops only its window; the walk
/// carries on with the next one. Neither kind of failure ever reaches
/// the producer.
pub(crate) async fn send_data<W: Wire>(wire: &W) {
    let core = wire.core();

    let pending = core.buffer.len();
    if pending == 0 {
        debug!("buffer is empty, no data will be sent");
        return;
    }

    info!(points = pending, "sending batch");
    let points = core.buffer.drain_all();

    for window in points.chunks(core.config.transport_buffer_size) {
        core.debug_input(window);

        let payload = match wire.serialize_payload(window) {
            Ok(payload) => payload,
            Err(e) => {
                log_error(core.config.print_stack_on_error, &e, "error serializing data");
                tokio::time::sleep(core.config.time_between_batches).await;
                continue;
            }
        };

        core.debug_output(&payload);

        match wire.transfer_data(&payload).await {
            Ok(()) => {
                let bytes: usize = payload.iter().map(String::len).sum();
                info!(points = window.len(), bytes, "batch sent");
            }
            Err(e) => {
                log_error(
                    core.config.print_stack_on_error,
                    &e,
                    "error transferring data",
                );
            }
        }

        tokio::time::sleep(core.config.time_between_batches).await;
    }
}
