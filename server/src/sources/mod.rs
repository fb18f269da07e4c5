//! Source Adapters (`SPEC_FULL.md` §4.1): one per external survey, each
//! implementing the push (`ingest_alerts`) and pull (`fetch_by_coord`)
//! contracts `spec.md` §4.1 defines.

mod asas_sn;
mod atlas;
mod lsst;
pub mod normalize;
mod test_fixture;
mod tns;
mod ztf;

pub use asas_sn::AsasSnAdapter;
pub use atlas::AtlasAdapter;
pub use lsst::LsstAdapter;
pub use test_fixture::TestAdapter;
pub use tns::TnsAdapter;
pub use ztf::ZtfAdapter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tarxiv_common::{DetectionEvent, FieldValue, IdentifierEntry, LightCurve, Source};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus;
use crate::error::AdapterError;

/// One survey's contribution to a canonical `ObjectMetadata`, returned by
/// the pull contract before the fusion module merges it in
/// (`spec.md` §4.1's `survey_meta`).
#[derive(Debug, Clone, Default)]
pub struct SurveyMeta {
    pub identifiers: Vec<IdentifierEntry>,
    pub ra_deg: Option<FieldValue<f64>>,
    pub dec_deg: Option<FieldValue<f64>>,
    pub ra_hms: Option<FieldValue<String>>,
    pub dec_dms: Option<FieldValue<String>>,
    pub object_type: Vec<FieldValue<String>>,
    pub discovery_date: Option<FieldValue<DateTime<Utc>>>,
    pub reporting_date: Option<FieldValue<DateTime<Utc>>>,
    pub reporting_group: Option<FieldValue<String>>,
    pub redshift: Option<FieldValue<f64>>,
    pub host_name: Vec<FieldValue<String>>,
}

/// The pull contract's classified outcome (`spec.md` §4.1: "`survey_meta`
/// is `null` if no match; `light_curve_frame` may be empty even when
/// `survey_meta` is populated"). Kept as a tri-state rather than folding
/// `LightCurveMissing` into `AdapterError`, since a survey match with no
/// photometry still carries metadata fusion needs.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    NoMatch,
    MetaOnly(SurveyMeta),
    Full(SurveyMeta, LightCurve),
}

/// Configuration one adapter's Kafka ingest leg needs, mirroring a
/// `config.yml` per-survey block (`SPEC_FULL.md` §6).
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub kafka_endpoint: String,
    pub kafka_topics: Vec<String>,
    pub kafka_group_id: String,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Parse one raw Kafka payload from this survey's topic into a
    /// normalized `DetectionEvent` (`spec.md` §4.1: "converts survey-specific
    /// IDs into the unified form and names the source").
    fn parse_detection(&self, payload: &[u8]) -> Result<DetectionEvent, AdapterError>;

    /// Long-running ingest loop: subscribe to this survey's configured
    /// Kafka topic(s) and forward every parsed `DetectionEvent` onto the
    /// Detection Bus. Restartable: the consumer group owns the offset, so a
    /// restart re-attaches at the last acknowledged position.
    async fn ingest_alerts(
        &self,
        config: &IngestConfig,
        sink: mpsc::Sender<DetectionEvent>,
        token: CancellationToken,
    ) -> Result<(), AdapterError> {
        bus::spawn_detection_consumer(
            &config.kafka_endpoint,
            &config.kafka_group_id,
            &config.kafka_topics,
            self.source().as_str(),
            |payload| self.parse_detection(payload),
            sink,
            token,
        )
        .await
    }

    /// Pull contract: given a name and coordinates, return this survey's
    /// classified view of the object.
    async fn fetch_by_coord(
        &self,
        obj_name: &str,
        ra_deg: f64,
        dec_deg: f64,
        radius_arcsec: f64,
    ) -> Result<FetchOutcome, AdapterError>;
}

/// A named citation alias, matching the `sources.json` schema keys in
/// `original_source/tarxiv/data_sources.py`'s `Survey.__init__`, used by
/// adapters to tag each value/identifier with its origin.
pub fn survey_alias(source: Source) -> &'static str {
    match source {
        Source::Atlas => "atlas",
        Source::Ztf => "ztf",
        Source::AsasSn => "asas-sn",
        Source::Lsst => "lsst",
        Source::Tns => "tns",
        Source::Test => "test",
    }
}

pub(crate) fn meta_field(value: f64, source: Source) -> FieldValue<f64> {
    FieldValue { value, source: survey_alias(source).to_string() }
}

pub(crate) fn meta_field_str(value: impl Into<String>, source: Source) -> FieldValue<String> {
    FieldValue { value: value.into(), source: survey_alias(source).to_string() }
}

pub(crate) fn meta_date(value: DateTime<Utc>, source: Source) -> FieldValue<DateTime<Utc>> {
    FieldValue { value, source: survey_alias(source).to_string() }
}
