//! HTTP wire layer: one request per window, carrying a JSON array of
//! point objects.

use std::sync::{Arc, RwLock};

use tracing::info;

use crate::config::{Backend, HttpTransportConfig};
use crate::error::{Error, Result};
use crate::point::{JsonPoint, Payload};
use crate::serialize;
use crate::transport::core::{self, TransportCore, Wire};

/// Ships point windows as JSON arrays over HTTP. Cheap to clone; clones
/// share the buffer, the client and the backend configuration.
#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<HttpInner>,
}

pub(crate) struct HttpInner {
    core: TransportCore,
    config: HttpTransportConfig,
    client: reqwest::Client,
    service_url: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Builds the transport, refusing invalid configurations.
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.transport.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpInner {
                core: TransportCore::new(config.transport.clone()),
                config,
                client,
                service_url: RwLock::new(None),
            }),
        })
    }

    pub(crate) fn config(&self) -> &HttpTransportConfig {
        &self.inner.config
    }

    pub(crate) fn core(&self) -> &TransportCore {
        &self.inner.core
    }

    /// Points the transport at a backend origin.
    pub fn configure_backend(&self, backend: &Backend) -> Result<()> {
        let url = format!(
            "http://{}/{}",
            backend.address(),
            self.inner.config.service_endpoint.trim_start_matches('/'),
        );

        info!(service_url = %url, "backend was configured");
        if let Ok(mut guard) = self.inner.service_url.write() {
            *guard = Some(url);
        }
        Ok(())
    }

    pub(crate) fn start(&self, manual_mode: bool) {
        core::start_batch_loop(&self.inner, manual_mode);
    }

    pub(crate) fn close(&self) {
        self.inner.core.close();
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

impl HttpInner {
    async fn transfer_data_impl(&self, payload: &[String]) -> Result<()> {
        // The HTTP wire carries exactly one serialized string per window.
        if payload.len() != 1 {
            return Err(Error::InvalidPayloadSize);
        }

        let url = self
            .service_url
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or_else(|| Error::InvalidConfiguration("no backend was configured".into()))?;

        let method = reqwest::Method::from_bytes(self.config.method.as_bytes())
            .map_err(|_| Error::InvalidConfiguration(format!("bad method: {}", self.config.method)))?;

        let mut request = self.client.request(method, &url).body(payload[0].clone());
        for (key, value) in &self.config.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() != self.config.expected_response_status {
            // Best-effort body read so the failure is loggable.
            let body = response.bytes().await.unwrap_or_default();
            return Err(Error::Transfer(format!(
                "unexpected status {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        // Drain the body so the connection can be reused.
        let _ = response.bytes().await;
        Ok(())
    }
}

impl Wire for HttpInner {
    fn core(&self) -> &TransportCore {
        &self.core
    }

    fn serialize_payload(&self, items: &[Payload]) -> Result<Vec<String>> {
        let points = items
            .iter()
            .map(|item| match item {
                Payload::Json(point) => Ok(point),
                other => Err(Error::Translation(format!(
                    "this transport does not serialize {} points",
                    other.shape()
                ))),
            })
            .collect::<Result<Vec<&JsonPoint>>>()?;

        let body = serialize::json_array(
            points.into_iter(),
            self.config.transport.serializer_buffer_size,
        )?;
        Ok(vec![body])
    }

    fn transfer_data(
        &self,
        payload: &[String],
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        self.transfer_data_impl(payload)
    }
}
