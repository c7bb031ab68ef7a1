//! Simple publisher example for the RelayMQ Rust client

use relaymq_client::*;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("RelayMQ - Simple Publisher Example");
    println!("==================================");

    let client = BusClient::connect(
        ClientConfig::builder().addr("localhost:9155").build(),
    )
    .await?;

    println!("Connected to bus, publishing to topic 1");

    for i in 0..100 {
        let payload = format!("message number {}", i);
        client.publish(1, payload).await?;

        if i % 10 == 9 {
            println!("published {} messages", i + 1);
            sleep(Duration::from_millis(100)).await;
        }
    }

    println!("Done. The bus fans these out to every topic-1 subscriber.");
    Ok(())
}
