//! ASAS-SN SkyPatrol adapter, grounded in
//! `original_source/tarxiv/data_sources.py`'s `ASAS_SN` class (an ADQL cone
//! search against the `master_list` catalog, followed by a per-source light
//! curve fetch).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tarxiv_common::{DetectionEvent, IdentifierEntry, LightCurveRow, Source};

use crate::error::AdapterError;

use super::normalize::normalize_rows;
use super::{meta_field, FetchOutcome, SourceAdapter, SurveyMeta};

pub struct AsasSnAdapter {
    client: Client,
    skypatrol_url: String,
}

impl AsasSnAdapter {
    #[must_use]
    pub fn new(skypatrol_url: impl Into<String>) -> Self {
        Self { client: Client::new(), skypatrol_url: skypatrol_url.into() }
    }

    fn transport_err(&self, source: impl Into<anyhow::Error>) -> AdapterError {
        AdapterError::Transport { survey: "asas_sn".into(), source: source.into() }
    }
}

#[derive(Debug, Deserialize)]
struct SkyPatrolRow {
    jd: f64,
    mag: Option<f64>,
    mag_err: Option<f64>,
    limit: Option<f64>,
    fwhm: Option<f64>,
    #[serde(rename = "phot_filter")]
    filter: String,
    camera: String,
    quality: String,
}

#[async_trait]
impl SourceAdapter for AsasSnAdapter {
    fn source(&self) -> Source {
        Source::AsasSn
    }

    fn parse_detection(&self, payload: &[u8]) -> Result<DetectionEvent, AdapterError> {
        #[derive(Deserialize)]
        struct RawAlert {
            asas_sn_id: String,
            ra_deg: f64,
            dec_deg: f64,
            jd: f64,
        }
        let raw: RawAlert = serde_json::from_slice(payload).map_err(|e| AdapterError::SchemaParse {
            survey: "asas_sn".into(),
            obj_name: "unknown".into(),
            source: e.into(),
        })?;
        Ok(DetectionEvent {
            obj_id: raw.asas_sn_id,
            source: Source::AsasSn,
            ra_deg: raw.ra_deg,
            dec_deg: raw.dec_deg,
            timestamp: tarxiv_common::time::mjd_to_datetime(raw.jd - 2_400_000.5),
        })
    }

    async fn fetch_by_coord(
        &self,
        obj_name: &str,
        ra_deg: f64,
        dec_deg: f64,
        radius_arcsec: f64,
    ) -> Result<FetchOutcome, AdapterError> {
        let query = format!(
            "WITH sources AS (SELECT asas_sn_id, ra_deg, dec_deg, \
             DISTANCE(ra_deg, dec_deg, {ra_deg}, {dec_deg}) AS angular_dist FROM master_list) \
             SELECT * FROM sources WHERE angular_dist <= ARCSEC({radius_arcsec}) ORDER BY angular_dist ASC"
        );

        let catalog: Vec<Value> = self
            .client
            .post(format!("{}/adql_query", self.skypatrol_url))
            .json(&serde_json::json!({ "query": query, "download": true }))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?
            .json()
            .await
            .unwrap_or_default();

        let Some(nearest) = catalog.first() else {
            return Ok(FetchOutcome::NoMatch);
        };

        let asas_sn_id = nearest.get("asas_sn_id").map_or_else(
            || obj_name.to_string(),
            |v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()),
        );
        let ra = nearest.get("ra_deg").and_then(Value::as_f64);
        let dec = nearest.get("dec_deg").and_then(Value::as_f64);

        let meta = SurveyMeta {
            identifiers: vec![IdentifierEntry { name: asas_sn_id.clone(), source: Source::AsasSn }],
            ra_deg: ra.map(|v| meta_field(v, Source::AsasSn)),
            dec_deg: dec.map(|v| meta_field(v, Source::AsasSn)),
            ..SurveyMeta::default()
        };

        let curve: Vec<SkyPatrolRow> = self
            .client
            .get(format!("{}/lightcurve/{}", self.skypatrol_url, asas_sn_id))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?
            .json()
            .await
            .unwrap_or_default();

        if curve.is_empty() {
            return Ok(FetchOutcome::MetaOnly(meta));
        }

        let mut rows = Vec::with_capacity(curve.len());
        for row in curve.into_iter().filter(|r| r.quality != "B") {
            let bad = row.mag_err.is_some_and(|e| e > 99.0);
            rows.push(LightCurveRow {
                mjd: row.jd - 2_400_000.5,
                mag: if bad { None } else { row.mag },
                mag_err: if bad { None } else { row.mag_err },
                limit: row.limit,
                fwhm: row.fwhm,
                filter: row.filter,
                detection: u8::from(!bad),
                tel_unit: row.camera,
                survey: "asas_sn".to_string(),
                night: Some("none".to_string()),
            });
        }
        normalize_rows(&mut rows);

        if rows.is_empty() {
            return Ok(FetchOutcome::MetaOnly(meta));
        }
        Ok(FetchOutcome::Full(meta, rows))
    }
}
