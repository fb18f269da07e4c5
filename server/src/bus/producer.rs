use std::time::Duration;

use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::base_client_config;
use crate::error::AdapterError;

/// A Kafka producer shared by every Source Adapter to push normalized
/// `DetectionEvent`s onto their survey's topic, and by the matcher to push
/// `MatchCandidate`s onto the `spark-sink` topic.
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// # Errors
    /// Returns an error if the underlying `rdkafka` client cannot be built.
    pub fn new(brokers: &str) -> Result<Self, AdapterError> {
        let producer: FutureProducer =
            base_client_config(brokers).set("message.timeout.ms", "10000").create().map_err(|e| {
                AdapterError::Transport { survey: "kafka-producer".into(), source: e.into() }
            })?;
        Ok(Self { producer })
    }

    /// Serialize `value` to JSON and publish it to `topic` keyed by `key`.
    pub async fn publish_json<T: Serialize + Sync>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
        survey: &str,
    ) -> Result<(), AdapterError> {
        let payload = serde_json::to_vec(value).map_err(|e| AdapterError::SchemaParse {
            survey: survey.to_string(),
            obj_name: key.to_string(),
            source: e.into(),
        })?;

        let record = FutureRecord::to(topic).key(key).payload(&payload);
        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| AdapterError::Transport { survey: survey.to_string(), source: e.into() })?;
        Ok(())
    }
}

/// Drain `candidates` and publish each to the `spark-sink` topic keyed by
/// `obj_id_1`, exactly as `spec.md` §4.2's Output contract describes.
/// Exits once the channel closes or `token` is cancelled, after flushing
/// whatever is already queued (`SPEC_FULL.md` §5 shutdown semantics).
pub async fn publish_candidates(
    producer: &KafkaProducer,
    sink_topic: &str,
    mut candidates: mpsc::Receiver<tarxiv_common::MatchCandidate>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                candidates.close();
                while let Some(candidate) = candidates.recv().await {
                    publish_one(producer, sink_topic, &candidate).await;
                }
                break;
            }
            maybe = candidates.recv() => {
                match maybe {
                    Some(candidate) => publish_one(producer, sink_topic, &candidate).await,
                    None => break,
                }
            }
        }
    }
}

async fn publish_one(producer: &KafkaProducer, topic: &str, candidate: &tarxiv_common::MatchCandidate) {
    match producer.publish_json(topic, &candidate.obj_id_1, candidate, "matcher").await {
        Ok(()) => debug!(status = "candidate_published", obj_id_1 = %candidate.obj_id_1, obj_id_2 = %candidate.obj_id_2, "candidate published"),
        Err(e) => warn!(status = "candidate_publish_failed", error = %e, "failed to publish match candidate"),
    }
}
