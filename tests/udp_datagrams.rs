//! UDP transport behaviour: one JSON datagram per point, regardless of
//! windowing.

mod common;

use std::time::Duration;

use pointcast::{Backend, FlatOperation, Flattener, Manager, PropertyValue, Transport, UdpTransport};

use common::{spawn_udp_sink, transformer_config, udp_config, wait_until};

fn point_properties(metric: &str, value: f64) -> Vec<(String, PropertyValue)> {
    vec![
        ("metric".into(), metric.into()),
        ("value".into(), value.into()),
        ("timestamp".into(), 1_500_000_000i64.into()),
    ]
}

fn manual_manager(backend_port: u16, flattener: Option<Flattener>) -> Manager {
    let transport = UdpTransport::new(udp_config(2, Duration::from_secs(5))).expect("transport");
    let manager = Manager::new(
        Transport::Udp(transport),
        flattener,
        None,
        &Backend {
            host: "127.0.0.1".into(),
            port: backend_port,
        },
        &[],
    )
    .expect("manager");
    manager.start(true);
    manager
}

#[tokio::test]
async fn test_one_datagram_per_point() {
    let (address, datagrams) = spawn_udp_sink().await;
    let manager = manual_manager(address.port(), None);

    // Three points with a window size of two: two windows, but still
    // one datagram per point.
    for i in 0..3 {
        manager
            .send_json("number", point_properties("udp.each", i as f64))
            .expect("send");
    }
    manager.send_data().await;

    wait_until("three datagrams", Duration::from_secs(3), || {
        datagrams.lock().unwrap().len() >= 3
    })
    .await;

    let captured = datagrams.lock().unwrap().clone();
    assert_eq!(captured.len(), 3);
    for (i, datagram) in captured.iter().enumerate() {
        let parsed: serde_json::Value = serde_json::from_str(datagram).expect("datagram json");
        assert_eq!(parsed["metric"], "udp.each");
        assert!((parsed["value"].as_f64().unwrap() - i as f64).abs() < 1e-9);
    }

    manager.shutdown().await;
}

#[tokio::test]
async fn test_flatten_over_udp() {
    let (address, datagrams) = spawn_udp_sink().await;
    let flattener =
        Flattener::new(transformer_config(Duration::from_millis(900))).expect("flattener");
    let manager = manual_manager(address.port(), Some(flattener));

    for value in [5.5, 1.24, 3.76, 0.5] {
        manager
            .flatten_json(FlatOperation::Sum, "number", point_properties("udp.sum", value))
            .await
            .expect("flatten");
    }

    manager.process_cycle();
    manager.send_data().await;

    wait_until("sum datagram", Duration::from_secs(3), || {
        !datagrams.lock().unwrap().is_empty()
    })
    .await;

    let captured = datagrams.lock().unwrap().clone();
    assert_eq!(captured.len(), 1);
    let parsed: serde_json::Value = serde_json::from_str(&captured[0]).expect("datagram json");
    assert_eq!(parsed["metric"], "udp.sum");
    assert!((parsed["value"].as_f64().unwrap() - 11.0).abs() < 1e-9);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_json_helpers_rejected_on_opentsdb_only_shapes() {
    let (address, _datagrams) = spawn_udp_sink().await;
    let manager = manual_manager(address.port(), None);

    // A UDP transport speaks JSON, not the OpenTSDB line shape.
    let err = manager
        .send_opentsdb(1.0, 0, "wrong.shape", vec![])
        .unwrap_err();
    assert!(matches!(err, pointcast::Error::IncompatibleTransport(_)));

    manager.shutdown().await;
}
