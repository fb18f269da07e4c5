//! Deterministic in-memory adapter used by scenario tests (`spec.md` §8
//! S1-S6); never wired into production ingestion.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tarxiv_common::{DetectionEvent, Source};

use crate::error::AdapterError;

use super::{FetchOutcome, IngestConfig, SourceAdapter};

/// Holds canned [`FetchOutcome`]s keyed by object name, and canned raw
/// Kafka payloads parsed by a caller-supplied closure, so a single test can
/// stand in for any one survey without a network dependency.
pub struct TestAdapter {
    source: Source,
    fixtures: Mutex<HashMap<String, FetchOutcome>>,
    parser: Box<dyn Fn(&[u8]) -> Result<DetectionEvent, AdapterError> + Send + Sync>,
}

impl TestAdapter {
    #[must_use]
    pub fn new(source: Source) -> Self {
        Self {
            source,
            fixtures: Mutex::new(HashMap::new()),
            parser: Box::new(move |payload| {
                serde_json::from_slice::<DetectionEvent>(payload).map_err(|e| AdapterError::SchemaParse {
                    survey: source.as_str().to_string(),
                    obj_name: "unknown".into(),
                    source: e.into(),
                })
            }),
        }
    }

    /// Register the outcome this adapter returns for `obj_name`. Objects
    /// with no registered fixture yield `FetchOutcome::NoMatch`.
    pub fn with_fixture(self, obj_name: impl Into<String>, outcome: FetchOutcome) -> Self {
        self.fixtures.lock().expect("fixture lock poisoned").insert(obj_name.into(), outcome);
        self
    }
}

#[async_trait]
impl SourceAdapter for TestAdapter {
    fn source(&self) -> Source {
        self.source
    }

    fn parse_detection(&self, payload: &[u8]) -> Result<DetectionEvent, AdapterError> {
        (self.parser)(payload)
    }

    async fn ingest_alerts(
        &self,
        _config: &IngestConfig,
        _sink: tokio::sync::mpsc::Sender<DetectionEvent>,
        _token: tokio_util::sync::CancellationToken,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn fetch_by_coord(
        &self,
        obj_name: &str,
        _ra_deg: f64,
        _dec_deg: f64,
        _radius_arcsec: f64,
    ) -> Result<FetchOutcome, AdapterError> {
        Ok(self.fixtures.lock().expect("fixture lock poisoned").get(obj_name).cloned().unwrap_or(FetchOutcome::NoMatch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarxiv_common::LightCurveRow;

    fn row(mjd: f64, mag: Option<f64>, filter: &str, detection: u8, survey: &str) -> LightCurveRow {
        LightCurveRow {
            mjd,
            mag,
            mag_err: mag.map(|_| 0.05),
            limit: if detection == 0 { mag } else { None },
            fwhm: None,
            filter: filter.to_string(),
            detection,
            tel_unit: "main".to_string(),
            survey: survey.to_string(),
            night: None,
        }
    }

    #[tokio::test]
    async fn unregistered_object_yields_no_match() {
        let adapter = TestAdapter::new(Source::Ztf);
        let outcome = adapter.fetch_by_coord("unknown-obj", 0.0, 0.0, 5.0).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::NoMatch));
    }

    #[tokio::test]
    async fn registered_fixture_round_trips() {
        let rows = vec![
            row(60000.0, Some(20.1), "g", 1, "ztf"),
            row(60010.0, Some(19.5), "g", 1, "ztf"),
        ];
        let adapter = TestAdapter::new(Source::Ztf)
            .with_fixture("SN2025test", FetchOutcome::Full(super::super::SurveyMeta::default(), rows));
        let outcome = adapter.fetch_by_coord("SN2025test", 180.0, 30.0, 5.0).await.unwrap();
        match outcome {
            FetchOutcome::Full(_, rows) => assert_eq!(rows.len(), 2),
            other => panic!("expected Full outcome, got {other:?}"),
        }
    }
}
