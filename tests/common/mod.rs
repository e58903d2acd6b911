//! Shared builders and mock backends for the black-box tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::put;
use axum::Router;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};

use pointcast::{
    DataTransformerConfig, DefaultTransportConfig, HashAlgorithm, HttpTransportConfig,
    JsonMappingConfig, OpenTsdbTransportConfig, StreamConnectionConfig, UdpTransportConfig,
};

pub fn transport_defaults(
    transport_buffer_size: usize,
    batch_send_interval: Duration,
) -> DefaultTransportConfig {
    DefaultTransportConfig {
        transport_buffer_size,
        batch_send_interval,
        time_between_batches: Duration::from_millis(100),
        request_timeout: Duration::from_secs(1),
        serializer_buffer_size: 256,
        debug_input: false,
        debug_output: false,
        print_stack_on_error: false,
    }
}

pub fn stream_defaults() -> StreamConnectionConfig {
    StreamConnectionConfig {
        read_buffer_size: 64,
        max_read_timeout: Duration::from_millis(50),
        reconnection_timeout: Duration::from_millis(100),
        max_reconnection_retries: 3,
        disconnect_after_writes: false,
    }
}

pub fn mapping() -> JsonMappingConfig {
    JsonMappingConfig {
        timestamp_property: "timestamp".into(),
        value_property: "value".into(),
    }
}

pub fn http_config(
    transport_buffer_size: usize,
    batch_send_interval: Duration,
) -> HttpTransportConfig {
    HttpTransportConfig {
        transport: transport_defaults(transport_buffer_size, batch_send_interval),
        service_endpoint: "api/put".into(),
        method: "PUT".into(),
        expected_response_status: 201,
        headers: [("Content-Type".to_string(), "application/json".to_string())]
            .into_iter()
            .collect(),
        mapping: mapping(),
    }
}

pub fn opentsdb_config(
    transport_buffer_size: usize,
    batch_send_interval: Duration,
) -> OpenTsdbTransportConfig {
    OpenTsdbTransportConfig {
        transport: transport_defaults(transport_buffer_size, batch_send_interval),
        connection: stream_defaults(),
    }
}

pub fn udp_config(
    transport_buffer_size: usize,
    batch_send_interval: Duration,
) -> UdpTransportConfig {
    UdpTransportConfig {
        transport: transport_defaults(transport_buffer_size, batch_send_interval),
        connection: stream_defaults(),
        mapping: mapping(),
    }
}

pub fn transformer_config(cycle_duration: Duration) -> DataTransformerConfig {
    DataTransformerConfig {
        cycle_duration,
        hashing_algorithm: HashAlgorithm::Shake256,
        hash_size: 12,
        point_value_buffer_size: 64,
        name: String::new(),
    }
}

/// One request captured by the mock HTTP backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub at: Instant,
    pub body: String,
}

/// Spawns a timeseries-backend lookalike answering `PUT /api/put` with
/// 201 and recording every request body.
pub async fn spawn_http_backend() -> (SocketAddr, Arc<Mutex<Vec<RecordedRequest>>>) {
    let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::new(Mutex::new(Vec::new()));

    async fn handler(
        State(requests): State<Arc<Mutex<Vec<RecordedRequest>>>>,
        body: String,
    ) -> StatusCode {
        requests.lock().unwrap().push(RecordedRequest {
            at: Instant::now(),
            body,
        });
        StatusCode::CREATED
    }

    let app = Router::new()
        .route("/api/put", put(handler))
        .with_state(Arc::clone(&requests));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (address, requests)
}

/// Spawns a telnet-style line sink on the given listener, accepting any
/// number of connections and recording every received line.
pub fn spawn_telnet_sink_on(
    listener: TcpListener,
    lines: Arc<Mutex<Vec<String>>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };

            let lines = Arc::clone(&lines);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => lines.lock().unwrap().push(line.trim_end().to_owned()),
                    }
                }
            });
        }
    })
}

/// Spawns a telnet-style line sink on an ephemeral port.
pub async fn spawn_telnet_sink() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    spawn_telnet_sink_on(listener, Arc::clone(&lines));
    (address, lines)
}

/// Spawns a datagram sink recording every received datagram as a
/// string.
pub async fn spawn_udp_sink() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let address = socket.local_addr().expect("local addr");
    let datagrams: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let store = Arc::clone(&datagrams);
    tokio::spawn(async move {
        let mut buf = vec![0u8; 64 * 1024];
        while let Ok((n, _)) = socket.recv_from(&mut buf).await {
            store
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&buf[..n]).into_owned());
        }
    });

    (address, datagrams)
}

/// Waits until `predicate` holds or the deadline passes; panics on
/// timeout with the given label.
pub async fn wait_until(label: &str, deadline: Duration, mut predicate: impl FnMut() -> bool) {
    let started = Instant::now();
    while !predicate() {
        if started.elapsed() > deadline {
            panic!("timed out waiting for {label}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Splits a telnet `put` line into (metric, value).
pub fn parse_put_line(line: &str) -> (String, f64) {
    let mut parts = line.split_whitespace();
    assert_eq!(parts.next(), Some("put"), "not a put line: {line}");
    let metric = parts.next().expect("metric").to_owned();
    let _timestamp = parts.next().expect("timestamp");
    let value = parts.next().expect("value").parse::<f64>().expect("value");
    (metric, value)
}

/// Collects every JSON point object from every captured request body.
pub fn collect_json_points(requests: &[RecordedRequest]) -> Vec<serde_json::Value> {
    let mut points = Vec::new();
    for request in requests {
        let parsed: serde_json::Value =
            serde_json::from_str(&request.body).expect("request body is json");
        let array = parsed.as_array().expect("request body is a json array");
        points.extend(array.iter().cloned());
    }
    points
}
