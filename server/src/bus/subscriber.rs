use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tarxiv_common::{ChangeNotice, NoticeTopic};
use tracing::{debug, warn};

use super::base_client_config;
use crate::error::AdapterError;

/// Wraps an authenticated connection to the external Hopskotch subscriber
/// bus (`spec.md` §4.6). Publishing is fire-and-forget: failures are logged
/// but never propagated, since the catalog store is the system of record
/// and subscribers are expected to resync on reconnect.
pub struct SubscriberBus {
    producer: FutureProducer,
}

impl SubscriberBus {
    /// # Errors
    /// Returns an error if the underlying `rdkafka` client cannot be built.
    pub fn new(brokers: &str, username: Option<&str>, password: Option<&str>) -> Result<Self, AdapterError> {
        let mut config = base_client_config(brokers);
        config.set("message.timeout.ms", "10000");
        if let (Some(user), Some(pass)) = (username, password) {
            config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "SCRAM-SHA-512")
                .set("sasl.username", user)
                .set("sasl.password", pass);
        }
        let producer: FutureProducer =
            config.create().map_err(|e| AdapterError::Transport { survey: "hopskotch".into(), source: e.into() })?;
        Ok(Self { producer })
    }

    /// Publish `notice` to `tarxiv.tns` or `tarxiv.xmatch`, whichever its
    /// topic names (`spec.md` §6: "Payload: JSON, UTF-8, with `xmatch_id`
    /// (or primary name) at the root and a `timestamp` field").
    pub async fn publish(&self, notice: &ChangeNotice) {
        let topic = match notice.topic {
            NoticeTopic::Tns => "tarxiv.tns",
            NoticeTopic::Xmatch => "tarxiv.xmatch",
        };
        let Ok(payload) = serde_json::to_vec(notice) else {
            warn!(status = "notice_serialize_failed", key = %notice.key, "failed to serialize change notice");
            return;
        };

        let record = FutureRecord::to(topic).key(&notice.key).payload(&payload);
        match self.producer.send(record, Duration::from_secs(5)).await {
            Ok(_) => debug!(status = "notice_published", key = %notice.key, topic, "change notice published"),
            Err((e, _)) => warn!(status = "notice_publish_failed", key = %notice.key, topic, error = %e, "failed to publish change notice"),
        }
    }
}
