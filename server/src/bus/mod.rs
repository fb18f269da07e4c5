//! Detection Bus and subscriber bus (`SPEC_FULL.md` §4.2, §4.6, §6).
//!
//! Two distinct Kafka-shaped concerns live here: the internal detection/
//! candidate pipeline (per-survey topics in, `spark-sink` out, consumed by
//! the reconciler with manual offset commit) and the external Hopskotch
//! subscriber bus (`tarxiv.tns`/`tarxiv.xmatch`) the Change-Notice Publisher
//! writes to fire-and-forget.

mod consumer;
mod producer;
mod subscriber;

pub use consumer::{spawn_detection_consumer, CandidateConsumer, CommitToken};
pub use producer::{publish_candidates, KafkaProducer};
pub use subscriber::SubscriberBus;

use rdkafka::ClientConfig;

/// Build the base `rdkafka` client config shared by every producer/consumer
/// in this module: bootstrap servers plus whatever TLS/SASL the endpoint
/// requires. Per-purpose config (group id, auto-commit, offset reset) is
/// layered on by the caller.
fn base_client_config(brokers: &str) -> ClientConfig {
    let mut config = ClientConfig::new();
    config.set("bootstrap.servers", brokers);
    config
}
