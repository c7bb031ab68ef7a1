//! Simple subscriber example for the RelayMQ Rust client

use relaymq_client::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("RelayMQ - Simple Subscriber Example");
    println!("===================================");

    let client = BusClient::connect(
        ClientConfig::builder()
            .addr("localhost:9155")
            .ack_flush_interval(Duration::from_secs(1))
            .build(),
    )
    .await?;

    println!("Connected to bus, subscribing to topic 1");
    let mut subscription = client.subscribe(1).await?;

    let mut received = 0u64;
    while let Some(delivery) = subscription.recv().await {
        received += 1;
        println!(
            "  seq={} epoch={} payload='{}'",
            delivery.seq,
            delivery.epoch,
            String::from_utf8_lossy(&delivery.payload)
        );
        delivery.ack().await?;

        if received % 100 == 0 {
            println!("received {} messages so far", received);
        }
    }

    println!("Connection closed after {} messages", received);
    Ok(())
}
