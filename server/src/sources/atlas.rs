//! ATLAS Transient Web Server adapter, grounded in
//! `original_source/tarxiv/data_sources.py`'s `ATLAS` class.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tarxiv_common::{DetectionEvent, LightCurveRow, Source};

use crate::error::AdapterError;

use super::normalize::{atlas_unit_and_night, normalize_rows};
use super::{meta_field, FetchOutcome, SourceAdapter, SurveyMeta};

pub struct AtlasAdapter {
    client: Client,
    base_url: String,
    token: String,
}

impl AtlasAdapter {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self { client: Client::new(), base_url: base_url.into(), token: token.into() }
    }

    fn transport_err(&self, source: impl Into<anyhow::Error>) -> AdapterError {
        AdapterError::Transport { survey: "atlas".into(), source: source.into() }
    }
}

#[derive(Debug, Deserialize)]
struct AtlasExposure {
    mjd: f64,
    mag: Option<f64>,
    magerr: Option<f64>,
    mag5sig: Option<f64>,
    filter: String,
    expname: String,
    #[serde(default)]
    dup: i32,
}

#[async_trait]
impl SourceAdapter for AtlasAdapter {
    fn source(&self) -> Source {
        Source::Atlas
    }

    fn parse_detection(&self, payload: &[u8]) -> Result<DetectionEvent, AdapterError> {
        #[derive(Deserialize)]
        struct RawAlert {
            id: String,
            ra: f64,
            dec: f64,
            mjd: f64,
        }
        let raw: RawAlert = serde_json::from_slice(payload).map_err(|e| AdapterError::SchemaParse {
            survey: "atlas".into(),
            obj_name: "unknown".into(),
            source: e.into(),
        })?;
        Ok(DetectionEvent {
            obj_id: raw.id,
            source: Source::Atlas,
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
        let cone: Value = self
            .client
            .post(format!("{}/cone/", self.base_url))
            .bearer_auth(&self.token)
            .form(&[
                ("ra", ra_deg.to_string()),
                ("dec", dec_deg.to_string()),
                ("radius", radius_arcsec.to_string()),
                ("requestType", "nearest".to_string()),
            ])
            .send()
            .await
            .map_err(|e| self.transport_err(e))?
            .json()
            .await
            .map_err(|e| self.transport_err(e))?;

        let Some(atlas_id) = cone.get("object").and_then(Value::as_str) else {
            return Ok(FetchOutcome::NoMatch);
        };

        let curve: Vec<Value> = self
            .client
            .get(format!("{}/objects/", self.base_url))
            .bearer_auth(&self.token)
            .query(&[("objects", atlas_id)])
            .send()
            .await
            .map_err(|e| self.transport_err(e))?
            .json()
            .await
            .map_err(|e| self.transport_err(e))?;

        let Some(result) = curve.into_iter().next() else {
            return Ok(FetchOutcome::NoMatch);
        };

        let object = result.get("object").ok_or_else(|| AdapterError::SchemaParse {
            survey: "atlas".into(),
            obj_name: obj_name.to_string(),
            source: anyhow::anyhow!("missing 'object' key in ATLAS response"),
        })?;

        let mut meta = SurveyMeta {
            identifiers: vec![tarxiv_common::IdentifierEntry {
                name: object.get("id").and_then(Value::as_str).unwrap_or(obj_name).to_string(),
                source: Source::Atlas,
            }],
            ra_deg: object.get("ra").and_then(Value::as_f64).map(|v| meta_field(v, Source::Atlas)),
            dec_deg: object.get("dec").and_then(Value::as_f64).map(|v| meta_field(v, Source::Atlas)),
            ..SurveyMeta::default()
        };

        if let Some(designation) = object.get("atlas_designation").and_then(Value::as_str) {
            meta.identifiers.push(tarxiv_common::IdentifierEntry { name: designation.to_string(), source: Source::Atlas });
        }

        if let Some(z) = result
            .get("sherlock_crossmatches")
            .and_then(Value::as_array)
            .and_then(|v| v.first())
            .and_then(|s| s.get("z"))
            .and_then(Value::as_f64)
        {
            meta.redshift = Some(meta_field(z, Source::Atlas));
        }

        let dets: Vec<AtlasExposure> =
            serde_json::from_value(result.get("lc").cloned().unwrap_or_default()).unwrap_or_default();
        let nondets: Vec<AtlasExposure> =
            serde_json::from_value(result.get("lcnondets").cloned().unwrap_or_default()).unwrap_or_default();

        if dets.is_empty() && nondets.is_empty() {
            return Ok(FetchOutcome::MetaOnly(meta));
        }

        let mut rows = Vec::with_capacity(dets.len() + nondets.len());
        for exp in dets.into_iter().filter(|d| d.dup != -1) {
            let (tel_unit, night) = atlas_unit_and_night(&exp.expname);
            rows.push(LightCurveRow {
                mjd: exp.mjd,
                mag: exp.mag,
                mag_err: exp.magerr,
                limit: exp.mag5sig,
                fwhm: None,
                filter: exp.filter,
                detection: 1,
                tel_unit,
                survey: "atlas".to_string(),
                night: Some(night),
            });
        }
        for exp in nondets {
            let (tel_unit, night) = atlas_unit_and_night(&exp.expname);
            rows.push(LightCurveRow {
                mjd: exp.mjd,
                mag: None,
                mag_err: None,
                limit: exp.mag5sig,
                fwhm: None,
                filter: exp.filter,
                detection: 0,
                tel_unit,
                survey: "atlas".to_string(),
                night: Some(night),
            });
        }
        normalize_rows(&mut rows);

        Ok(FetchOutcome::Full(meta, rows))
    }
}
