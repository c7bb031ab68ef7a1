use std::sync::Arc;

use clap::Parser;
use relaymq::{BusConfig, BusServer, Result, TopicId};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber;

#[derive(Parser, Debug)]
#[command(name = "relaymq")]
#[command(about = "A TCP publish/subscribe message bus with at-least-once delivery")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, default_value = "9155")]
    port: u16,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Topic ids to register at startup (comma-separated)
    #[arg(long, default_value = "0")]
    topics: String,

    /// Slots per topic ring buffer
    #[arg(long, default_value = "65536")]
    ring_capacity: usize,

    /// How long a publisher waits on a full ring before the publish fails (ms)
    #[arg(long, default_value = "5000")]
    publish_timeout_ms: u64,

    /// Ack timeout buckets; unacked ranges are redelivered after this many ticks
    #[arg(long, default_value = "6")]
    timeout_buckets: u16,

    /// Timeout tick interval (ms)
    #[arg(long, default_value = "1000")]
    tick_interval_ms: u64,

    /// Fan-out linger before flushing a partial batch (ms)
    #[arg(long, default_value = "5")]
    flush_linger_ms: u64,

    #[arg(long, default_value = "1000")]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(parse_log_level(&args.log_level))
        .init();

    let topics = parse_topics(&args.topics)?;

    info!("Starting RelayMQ bus on {}:{}", args.host, args.port);
    info!("Topics: {:?}", topics);
    info!(
        "Ring capacity: {} slots, publish timeout: {}ms",
        args.ring_capacity, args.publish_timeout_ms
    );
    info!(
        "Ack timeout: {} buckets x {}ms tick",
        args.timeout_buckets, args.tick_interval_ms
    );

    let config = BusConfig {
        host: args.host,
        port: args.port,
        ring_capacity: args.ring_capacity,
        publish_timeout_ms: args.publish_timeout_ms,
        timeout_buckets: args.timeout_buckets,
        tick_interval_ms: args.tick_interval_ms,
        flush_linger_ms: args.flush_linger_ms,
        max_connections: args.max_connections,
        topics,
        ..Default::default()
    };

    let server = Arc::new(BusServer::new(config)?);

    let server_handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            server.shutdown();
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server task completed"),
                Ok(Err(e)) => return Err(e),
                Err(e) => warn!("Server task panicked: {}", e),
            }
        }
    }

    info!("RelayMQ shut down successfully");
    Ok(())
}

fn parse_topics(list: &str) -> Result<Vec<TopicId>> {
    list.split(',')
        .map(|part| {
            part.trim()
                .parse::<TopicId>()
                .map_err(|e| relaymq::BusError::Config(format!("invalid topic id '{}': {}", part, e)))
        })
        .collect()
}

fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            warn!("Invalid log level '{}', defaulting to 'info'", level);
            tracing::Level::INFO
        }
    }
}
