use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Message, TopicPartitionList};
use tarxiv_common::DetectionEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base_client_config;
use crate::error::AdapterError;

fn build_consumer(brokers: &str, group_id: &str, auto_commit: bool) -> Result<StreamConsumer, AdapterError> {
    let mut config = base_client_config(brokers);
    config
        .set("group.id", group_id)
        .set("enable.auto.commit", if auto_commit { "true" } else { "false" })
        .set("auto.offset.reset", "earliest");
    config
        .create()
        .map_err(|e| AdapterError::Transport { survey: group_id.to_string(), source: e.into() })
}

/// Consume one or more per-survey Kafka topics, hand each message's raw
/// payload to `parse` (every adapter's own survey-specific alert shape),
/// and forward the resulting `DetectionEvent` into `sink` for the matcher
/// (`spec.md` §4.2 Input, §4.1 "converts survey-specific IDs into the
/// unified form"). Offsets auto-commit: the spec places no reconciliation
/// requirement on raw detection ingestion (unlike the `spark-sink`
/// consumer, which commits manually after reconciliation completes — see
/// [`CandidateConsumer`]).
pub async fn spawn_detection_consumer(
    brokers: &str,
    group_id: &str,
    topics: &[String],
    survey: &str,
    parse: impl Fn(&[u8]) -> Result<DetectionEvent, AdapterError> + Send + Sync,
    sink: mpsc::Sender<DetectionEvent>,
    token: CancellationToken,
) -> Result<(), AdapterError> {
    let consumer = build_consumer(brokers, group_id, true)?;
    let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
    consumer
        .subscribe(&topic_refs)
        .map_err(|e| AdapterError::Transport { survey: survey.to_string(), source: e.into() })?;

    info!(status = "detection_consumer_subscribed", survey, topics = ?topics, "detection consumer subscribed");

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                info!(status = "detection_consumer_shutdown", survey, "detection consumer shutting down");
                break;
            }
            result = consumer.recv() => {
                match result {
                    Ok(message) => {
                        let Some(payload) = message.payload() else { continue };
                        match parse(payload) {
                            Ok(event) => {
                                if sink.send(event).await.is_err() {
                                    warn!(status = "detection_sink_closed", survey, "detection sink closed");
                                    break;
                                }
                            }
                            Err(e) => error!(status = "malformed_detection_payload", survey, error = %e, "malformed detection payload, dropping"),
                        }
                    }
                    Err(e) => error!(status = "kafka_consume_error", survey, error = %e, "kafka consume error"),
                }
            }
        }
    }
    Ok(())
}

/// An offset to be committed once the reconciler has finished processing
/// the message it came with, so a crash mid-reconciliation re-delivers
/// rather than silently losing the candidate.
#[derive(Debug, Clone)]
pub struct CommitToken {
    topic: String,
    partition: i32,
    offset: i64,
}

/// Consumes the `spark-sink` topic with `enable.auto.commit=false`
/// (`spec.md` §6 "auto-commit is disabled"), handing each `MatchCandidate`
/// to the caller alongside a [`CommitToken`] to commit only after the
/// reconciler transaction completes.
pub struct CandidateConsumer {
    consumer: StreamConsumer,
}

impl CandidateConsumer {
    /// # Errors
    /// Returns an error if the underlying consumer cannot be built or
    /// subscribed.
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, AdapterError> {
        let consumer = build_consumer(brokers, group_id, false)?;
        consumer
            .subscribe(&[topic])
            .map_err(|e| AdapterError::Transport { survey: "reconciler".into(), source: e.into() })?;
        Ok(Self { consumer })
    }

    /// Block until the next candidate arrives, or until `token` cancels.
    /// Returns `None` on cancellation or malformed/empty messages (which
    /// are logged and skipped, not surfaced as an error: a poison message
    /// on this topic must not wedge the consumer group).
    pub async fn recv(&self, token: &CancellationToken) -> Option<(tarxiv_common::MatchCandidate, CommitToken)> {
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => return None,
                result = self.consumer.recv() => {
                    match result {
                        Ok(message) => {
                            let commit = CommitToken {
                                topic: message.topic().to_string(),
                                partition: message.partition(),
                                offset: message.offset(),
                            };
                            let Some(payload) = message.payload() else { continue };
                            match serde_json::from_slice(payload) {
                                Ok(candidate) => return Some((candidate, commit)),
                                Err(e) => {
                                    error!(status = "malformed_match_candidate", error = %e, "malformed match candidate, skipping");
                                    continue;
                                }
                            }
                        }
                        Err(e) => {
                            error!(status = "kafka_consume_error", error = %e, "kafka consume error on spark-sink");
                            continue;
                        }
                    }
                }
            }
        }
    }

    /// Commit the offset for a processed candidate, regardless of whether
    /// reconciliation succeeded, failed with a benign duplicate, or errored
    /// (`SPEC_FULL.md` §4.3: "offset-commit-regardless-of-outcome").
    pub fn commit(&self, token: &CommitToken) {
        let mut tpl = TopicPartitionList::new();
        if let Err(e) = tpl.add_partition_offset(
            &token.topic,
            token.partition,
            rdkafka::Offset::Offset(token.offset + 1),
        ) {
            error!(status = "offset_commit_list_failed", error = %e, "failed to build offset commit list");
            return;
        }
        if let Err(e) = self.consumer.commit(&tpl, CommitMode::Async) {
            error!(status = "offset_commit_failed", error = %e, "failed to commit spark-sink offset");
        } else {
            debug!(status = "offset_committed", topic = %token.topic, partition = token.partition, offset = token.offset, "offset committed");
        }
    }
}
