//! Black-box properties of the point buffer: FIFO order, exact drains,
//! never-negative size.

use pointcast::{JsonPoint, Payload, PointBuffer, PropertyValue};

fn point(i: i64) -> Payload {
    Payload::Json(JsonPoint::new(
        "n",
        vec![("value".into(), PropertyValue::Integer(i))],
    ))
}

#[test]
fn test_drain_returns_exactly_the_submitted_items_in_order() {
    let buffer = PointBuffer::new();

    let mut expected = Vec::new();
    for round in 0..10i64 {
        for i in 0..round {
            let item = point(round * 100 + i);
            expected.push(item.clone());
            buffer.add(item);
        }
    }

    assert_eq!(buffer.len(), expected.len());
    let drained = buffer.drain_all();
    assert_eq!(drained, expected);
    assert_eq!(buffer.len(), 0);
}

#[test]
fn test_interleaved_adds_and_drains_account_for_every_item() {
    let buffer = PointBuffer::new();
    let mut total_drained = 0usize;
    let mut total_added = 0usize;

    for round in 0..50i64 {
        let adds = (round % 7 + 1) as usize;
        for i in 0..adds {
            buffer.add(point(round * 10 + i as i64));
        }
        total_added += adds;

        if round % 3 == 0 {
            let drained = buffer.drain_all();
            total_drained += drained.len();
            assert_eq!(buffer.len(), 0);
        }
    }

    total_drained += buffer.drain_all().len();
    assert_eq!(total_drained, total_added);
    assert_eq!(buffer.len(), 0);
}

#[test]
fn test_concurrent_producers_with_draining_consumer() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 2_000;

    let buffer = Arc::new(PointBuffer::new());
    let done = Arc::new(AtomicBool::new(false));

    let consumer = {
        let buffer = Arc::clone(&buffer);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut seen = 0usize;
            while !done.load(Ordering::Acquire) {
                seen += buffer.drain_all().len();
                thread::yield_now();
            }
            seen + buffer.drain_all().len()
        })
    };

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    buffer.add(point((p * PER_PRODUCER + i) as i64));
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().expect("producer panicked");
    }
    done.store(true, Ordering::Release);

    let seen = consumer.join().expect("consumer panicked");
    assert_eq!(seen, PRODUCERS * PER_PRODUCER);
    assert_eq!(buffer.len(), 0);
}
