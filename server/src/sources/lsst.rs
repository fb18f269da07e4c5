//! LSST (Rubin Observatory) adapter. No direct counterpart exists in
//! `original_source/tarxiv/data_sources.py` (LSST alerts were not yet live
//! when that module was written); modeled on the same REST cone-search
//! plus object-fetch shape as [`super::ztf::ZtfAdapter`] and
//! [`super::asas_sn::AsasSnAdapter`], against a generic alert-broker API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tarxiv_common::{DetectionEvent, IdentifierEntry, LightCurveRow, Source};

use crate::error::AdapterError;

use super::normalize::normalize_rows;
use super::{meta_field, FetchOutcome, SourceAdapter, SurveyMeta};

pub struct LsstAdapter {
    client: Client,
    broker_url: String,
}

impl LsstAdapter {
    #[must_use]
    pub fn new(broker_url: impl Into<String>) -> Self {
        Self { client: Client::new(), broker_url: broker_url.into() }
    }

    fn transport_err(&self, source: impl Into<anyhow::Error>) -> AdapterError {
        AdapterError::Transport { survey: "lsst".into(), source: source.into() }
    }
}

#[derive(Debug, Deserialize)]
struct LsstRow {
    mjd: f64,
    mag: Option<f64>,
    #[serde(rename = "mag_err")]
    mag_err: Option<f64>,
    #[serde(rename = "psf_flux_err_limit")]
    limit: Option<f64>,
    band: String,
    #[serde(default)]
    is_detection: bool,
}

#[async_trait]
impl SourceAdapter for LsstAdapter {
    fn source(&self) -> Source {
        Source::Lsst
    }

    fn parse_detection(&self, payload: &[u8]) -> Result<DetectionEvent, AdapterError> {
        #[derive(Deserialize)]
        struct RawAlert {
            #[serde(rename = "diaObjectId")]
            object_id: i64,
            ra: f64,
            dec: f64,
            #[serde(rename = "midpointMjdTai")]
            mjd: f64,
        }
        let raw: RawAlert = serde_json::from_slice(payload).map_err(|e| AdapterError::SchemaParse {
            survey: "lsst".into(),
            obj_name: "unknown".into(),
            source: e.into(),
        })?;
        Ok(DetectionEvent {
            obj_id: raw.object_id.to_string(),
            source: Source::Lsst,
            ra_deg: raw.ra,
            dec_deg: raw.dec,
            timestamp: tarxiv_common::time::mjd_to_datetime(raw.mjd),
        })
    }

    async fn fetch_by_coord(
        &self,
        obj_name: &str,
        ra_deg: f64,
        dec_deg: f64,
        radius_arcsec: f64,
    ) -> Result<FetchOutcome, AdapterError> {
        let cone: Vec<Value> = self
            .client
            .post(format!("{}/api/v1/conesearch", self.broker_url))
            .json(&serde_json::json!({ "ra": ra_deg, "dec": dec_deg, "radius": radius_arcsec }))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?
            .json()
            .await
            .unwrap_or_default();

        let Some(dia_object_id) = cone.first().and_then(|v| v.get("diaObjectId")).and_then(Value::as_i64)
        else {
            return Ok(FetchOutcome::NoMatch);
        };

        let object: Value = self
            .client
            .get(format!("{}/api/v1/objects/{dia_object_id}", self.broker_url))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?
            .json()
            .await
            .map_err(|e| self.transport_err(e))?;

        let ra = object.get("ra").and_then(Value::as_f64);
        let dec = object.get("dec").and_then(Value::as_f64);

        let meta = SurveyMeta {
            identifiers: vec![IdentifierEntry { name: dia_object_id.to_string(), source: Source::Lsst }],
            ra_deg: ra.map(|v| meta_field(v, Source::Lsst)),
            dec_deg: dec.map(|v| meta_field(v, Source::Lsst)),
            ..SurveyMeta::default()
        };

        let rows_raw: Vec<LsstRow> = object
            .get("sources")
            .cloned()
            .map(|v| serde_json::from_value(v).unwrap_or_default())
            .unwrap_or_default();

        if rows_raw.is_empty() {
            return Ok(FetchOutcome::MetaOnly(meta));
        }

        let mut rows = Vec::with_capacity(rows_raw.len());
        for row in rows_raw {
            let detection = u8::from(row.is_detection);
            rows.push(LightCurveRow {
                mjd: row.mjd,
                mag: if detection == 1 { row.mag } else { None },
                mag_err: if detection == 1 { row.mag_err } else { None },
                limit: row.limit,
                fwhm: None,
                filter: row.band,
                detection,
                tel_unit: "rubin".to_string(),
                survey: "lsst".to_string(),
                night: None,
            });
        }
        normalize_rows(&mut rows);

        if rows.is_empty() {
            return Ok(FetchOutcome::MetaOnly(meta));
        }
        let _ = obj_name;
        Ok(FetchOutcome::Full(meta, rows))
    }
}
