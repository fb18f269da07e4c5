//! Transient Name Server adapter, grounded in
//! `original_source/tarxiv/data_sources.py`'s `TNS` class. TNS is the anchor
//! survey (`SPEC_FULL.md` §4.1): it returns metadata only, keyed by object
//! name rather than coordinates, and is rate-limited per the TNS API terms.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tarxiv_common::{DetectionEvent, IdentifierEntry, Source};
use tokio::sync::Mutex;

use crate::error::AdapterError;

use super::{meta_date, meta_field, meta_field_str, FetchOutcome, SourceAdapter, SurveyMeta};

pub struct TnsAdapter {
    client: Client,
    site: String,
    api_key: String,
    marker: String,
    rate_limit: Duration,
    last_request: Mutex<Option<tokio::time::Instant>>,
}

impl TnsAdapter {
    #[must_use]
    pub fn new(
        site: impl Into<String>,
        api_key: impl Into<String>,
        tns_id: impl Into<String>,
        marker_type: impl Into<String>,
        marker_name: impl Into<String>,
        rate_limit: Duration,
    ) -> Self {
        let marker = format!(
            "tns_marker{{\"tns_id\":{},\"type\":\"{}\",\"name\":\"{}\"}}",
            tns_id.into(),
            marker_type.into(),
            marker_name.into()
        );
        Self {
            client: Client::new(),
            site: site.into(),
            api_key: api_key.into(),
            marker,
            rate_limit,
            last_request: Mutex::new(None),
        }
    }

    fn transport_err(&self, source: impl Into<anyhow::Error>) -> AdapterError {
        AdapterError::Transport { survey: "tns".into(), source: source.into() }
    }

    /// Sleep out the remainder of the rate-limit window since the last
    /// request, mirroring the Python adapter's `time.sleep` before every
    /// call.
    async fn throttle(&self) {
        let mut guard = self.last_request.lock().await;
        if let Some(previous) = *guard {
            let elapsed = previous.elapsed();
            if elapsed < self.rate_limit {
                tokio::time::sleep(self.rate_limit - elapsed).await;
            }
        }
        *guard = Some(tokio::time::Instant::now());
    }
}

#[async_trait]
impl SourceAdapter for TnsAdapter {
    fn source(&self) -> Source {
        Source::Tns
    }

    /// TNS never publishes to the Detection Bus; its ingest leg is an
    /// on-demand lookup, not a Kafka subscription.
    fn parse_detection(&self, _payload: &[u8]) -> Result<DetectionEvent, AdapterError> {
        Err(AdapterError::Transport { survey: "tns".into(), source: anyhow::anyhow!("TNS has no detection stream") })
    }

    async fn ingest_alerts(
        &self,
        _config: &super::IngestConfig,
        _sink: tokio::sync::mpsc::Sender<DetectionEvent>,
        _token: tokio_util::sync::CancellationToken,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Queries by `obj_name` alone; `ra_deg`/`dec_deg`/`radius_arcsec` are
    /// accepted to satisfy the shared trait signature but unused, since TNS
    /// is looked up by designation, not cone search.
    async fn fetch_by_coord(
        &self,
        obj_name: &str,
        _ra_deg: f64,
        _dec_deg: f64,
        _radius_arcsec: f64,
    ) -> Result<FetchOutcome, AdapterError> {
        self.throttle().await;

        let body = serde_json::json!({
            "objid": "",
            "objname": obj_name,
            "photometry": "0",
            "spectra": "0",
        })
        .to_string();

        let response = self
            .client
            .post(format!("{}/api/get/object", self.site))
            .header("User-Agent", &self.marker)
            .form(&[("api_key", self.api_key.as_str()), ("data", body.as_str())])
            .send()
            .await
            .map_err(|e| self.transport_err(e))?;

        if !response.status().is_success() {
            return Ok(FetchOutcome::NoMatch);
        }
        let response_json: Value = response.json().await.map_err(|e| self.transport_err(e))?;
        let Some(result) = response_json.get("data") else {
            return Ok(FetchOutcome::NoMatch);
        };

        let meta = tns_meta(result, obj_name)?;
        Ok(FetchOutcome::MetaOnly(meta))
    }
}

fn tns_meta(result: &Value, obj_name: &str) -> Result<SurveyMeta, AdapterError> {
    let schema_err = |field: &str| AdapterError::SchemaParse {
        survey: "tns".into(),
        obj_name: obj_name.to_string(),
        source: anyhow::anyhow!("missing TNS field '{field}'"),
    };

    let objname = result.get("objname").and_then(Value::as_str).ok_or_else(|| schema_err("objname"))?;
    let ra_deg = result.get("radeg").and_then(Value::as_f64).ok_or_else(|| schema_err("radeg"))?;
    let dec_deg = result.get("decdeg").and_then(Value::as_f64).ok_or_else(|| schema_err("decdeg"))?;

    let mut object_type = Vec::new();
    if let Some(prefix) = result.get("name_prefix").and_then(Value::as_str) {
        object_type.push(meta_field_str(prefix, Source::Tns));
    }
    if let Some(name) = result.get("object_type").and_then(|v| v.get("name")).and_then(Value::as_str) {
        object_type.push(meta_field_str(name, Source::Tns));
    }

    let discovery_date = result
        .get("discoverydate")
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok().or_else(|| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc().fixed_offset())
        }))
        .map(|dt| meta_date(dt.with_timezone(&chrono::Utc), Source::Tns));

    let reporting_group =
        result.get("reporting_group").and_then(|v| v.get("group_name")).and_then(Value::as_str);

    let mut meta = SurveyMeta {
        identifiers: vec![IdentifierEntry { name: objname.to_string(), source: Source::Tns }],
        ra_deg: Some(meta_field(ra_deg, Source::Tns)),
        dec_deg: Some(meta_field(dec_deg, Source::Tns)),
        ra_hms: result.get("ra").and_then(Value::as_str).map(|v| meta_field_str(v, Source::Tns)),
        dec_dms: result.get("dec").and_then(Value::as_str).map(|v| meta_field_str(v, Source::Tns)),
        object_type,
        discovery_date,
        reporting_group: reporting_group.map(|v| meta_field_str(v, Source::Tns)),
        ..SurveyMeta::default()
    };

    if let Some(z) = result.get("redshift").and_then(Value::as_f64) {
        meta.redshift = Some(meta_field(z, Source::Tns));
    }
    if let Some(host) = result.get("hostname").and_then(Value::as_str) {
        meta.host_name.push(meta_field_str(host, Source::Tns));
    }

    Ok(meta)
}
