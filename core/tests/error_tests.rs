use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use relaymq::protocol::parse_ack_range;
use relaymq::{
    AckRange, BusConfig, BusError, BusFrameCodec, Frame, FrameKind, MetricsRegistry, TopicManager,
};
use tokio_util::codec::Decoder;

fn manager() -> TopicManager {
    let config = BusConfig {
        ring_capacity: 4,
        publish_timeout_ms: 10,
        ..Default::default()
    };
    let manager = TopicManager::new(&config, Arc::new(MetricsRegistry::new()));
    manager.register_topic(1);
    manager
}

#[tokio::test]
async fn test_unknown_topic_errors() {
    let manager = manager();

    let err = manager
        .publish(99, Bytes::from_static(b"m"))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::UnknownTopic(99)));
    assert_eq!(err.to_string(), "unknown topic 99");

    assert!(matches!(
        manager.subscribe(99, 1),
        Err(BusError::UnknownTopic(99))
    ));
}

#[tokio::test]
async fn test_overflow_error_names_the_topic() {
    let manager = manager();
    for _ in 0..4 {
        manager.publish(1, Bytes::from_static(b"m")).await.unwrap();
    }

    let err = manager
        .publish(1, Bytes::from_static(b"m"))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Overflow(1)));
    assert_eq!(err.to_string(), "topic 1 ring buffer overflow");
}

#[tokio::test]
async fn test_ack_from_unknown_subscriber() {
    let manager = manager();
    manager.subscribe(1, 7).unwrap();
    manager.publish(1, Bytes::from_static(b"m")).await.unwrap();
    let batch = manager.flush(1).unwrap().expect("batch expected");

    let err = manager
        .acknowledge(1, batch.range, 42, batch.epoch)
        .unwrap_err();
    assert!(matches!(
        err,
        BusError::UnknownSubscriber {
            topic: 1,
            subscriber: 42
        }
    ));
}

#[tokio::test]
async fn test_out_of_range_epoch_is_malformed() {
    let manager = manager();
    manager.subscribe(1, 7).unwrap();

    let err = manager
        .acknowledge(1, AckRange::new(0, 1), 7, 999)
        .unwrap_err();
    assert!(matches!(err, BusError::MalformedFrame(_)));
}

#[test]
fn test_unknown_frame_kind_is_malformed() {
    let mut codec = BusFrameCodec;
    let mut buf = BytesMut::new();
    buf.put_u8(b'9'); // not a valid kind byte
    buf.put_u16(1);
    buf.put_u32(0);
    buf.put_u16(0);
    buf.extend_from_slice(b"<\r\n>");

    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, BusError::MalformedFrame(_)));
}

#[test]
fn test_ack_body_parse_errors() {
    assert!(matches!(
        parse_ack_range(b"not-a-number-pair"),
        Err(BusError::MalformedFrame(_))
    ));
    assert!(matches!(
        parse_ack_range(b"42"),
        Err(BusError::MalformedFrame(_))
    ));
    // Empty ranges are invalid: last must exceed first.
    assert!(matches!(
        parse_ack_range(b"5-5"),
        Err(BusError::MalformedFrame(_))
    ));
    assert!(matches!(
        parse_ack_range(b"9-5"),
        Err(BusError::MalformedFrame(_))
    ));
}

#[test]
fn test_config_validation_errors() {
    let bad = BusConfig {
        ring_capacity: 0,
        ..Default::default()
    };
    assert!(bad.validate().is_err());

    let bad = BusConfig {
        timeout_buckets: 0,
        ..Default::default()
    };
    assert!(bad.validate().is_err());
}

#[test]
fn test_io_errors_convert() {
    let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
    let err: BusError = io_err.into();
    assert!(matches!(err, BusError::Io(_)));
    assert!(err.to_string().contains("peer reset"));
}

#[test]
fn test_frame_ack_roundtrips_through_body() {
    let frame = Frame::ack(3, AckRange::new(10, 20), 2);
    assert_eq!(frame.kind, FrameKind::Ack);
    assert_eq!(parse_ack_range(&frame.body).unwrap(), AckRange::new(10, 20));
}
