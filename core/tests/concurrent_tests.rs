use std::sync::Arc;

use bytes::Bytes;
use relaymq::{AckRange, BusConfig, MetricsRegistry, TopicManager};
use tokio::task::JoinSet;

fn manager(ring_capacity: usize) -> Arc<TopicManager> {
    let config = BusConfig {
        ring_capacity,
        publish_timeout_ms: 2000,
        ..Default::default()
    };
    let manager = Arc::new(TopicManager::new(&config, Arc::new(MetricsRegistry::new())));
    manager.register_topic(1);
    manager
}

#[tokio::test]
async fn test_concurrent_publishers_get_unique_sequence_ids() {
    let manager = manager(4096);
    let num_publishers = 10;
    let messages_each = 100;

    let mut tasks = JoinSet::new();
    for publisher_id in 0..num_publishers {
        let manager = Arc::clone(&manager);
        tasks.spawn(async move {
            let mut seqs = Vec::with_capacity(messages_each);
            for msg_id in 0..messages_each {
                let payload = Bytes::from(format!("publisher_{}_message_{}", publisher_id, msg_id));
                let seq = manager.publish(1, payload).await.expect("publish failed");
                seqs.push(seq);
            }
            seqs
        });
    }

    let mut all_seqs = Vec::new();
    while let Some(result) = tasks.join_next().await {
        all_seqs.extend(result.expect("publisher task failed"));
    }

    all_seqs.sort_unstable();
    let expected: Vec<u32> = (0..(num_publishers * messages_each) as u32).collect();
    assert_eq!(all_seqs, expected);
}

#[tokio::test]
async fn test_publishers_block_on_full_ring_until_acked() {
    let manager = manager(16);
    manager.subscribe(1, 7).unwrap();

    // Fill the ring completely.
    for _ in 0..16 {
        manager.publish(1, Bytes::from_static(b"m")).await.unwrap();
    }
    let batch = manager.flush(1).unwrap().expect("batch expected");

    // Publishers pile up against the full ring.
    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        tasks.spawn(async move {
            manager.publish(1, Bytes::from_static(b"late")).await
        });
    }

    // Acking the whole batch releases all 16 slots; every blocked
    // publisher finds room within its wait budget.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    manager.acknowledge(1, batch.range, 7, batch.epoch).unwrap();

    while let Some(result) = tasks.join_next().await {
        result.expect("publish task failed").expect("publish failed");
    }
}

#[tokio::test]
async fn test_concurrent_acks_from_two_subscribers() {
    let manager = manager(256);
    manager.subscribe(1, 7).unwrap();
    manager.subscribe(1, 8).unwrap();

    for _ in 0..256 {
        manager.publish(1, Bytes::from_static(b"m")).await.unwrap();
    }
    let batch = manager.flush(1).unwrap().expect("batch expected");
    assert_eq!(batch.range, AckRange::new(0, 256));

    // Both subscribers ack the batch in interleaved 16-message chunks from
    // opposite ends; the consensus release must survive the interleaving.
    let mut tasks = JoinSet::new();
    for subscriber in [7u64, 8u64] {
        let manager = Arc::clone(&manager);
        let epoch = batch.epoch;
        tasks.spawn(async move {
            let chunks: Vec<AckRange> = (0..16)
                .map(|i| AckRange::new(i * 16, (i + 1) * 16))
                .collect();
            if subscriber == 7 {
                for chunk in chunks {
                    manager.acknowledge(1, chunk, subscriber, epoch).unwrap();
                    tokio::task::yield_now().await;
                }
            } else {
                for chunk in chunks.into_iter().rev() {
                    manager.acknowledge(1, chunk, subscriber, epoch).unwrap();
                    tokio::task::yield_now().await;
                }
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("ack task failed");
    }

    // Everything is released: the full ring is writable again.
    for _ in 0..256 {
        manager.publish(1, Bytes::from_static(b"n")).await.unwrap();
    }
}
