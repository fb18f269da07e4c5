//! ZTF (Fink broker) adapter, grounded in
//! `original_source/tarxiv/data_sources.py`'s `ZTF` class.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tarxiv_common::{DetectionEvent, IdentifierEntry, LightCurveRow, Source};

use crate::error::AdapterError;

use super::normalize::normalize_rows;
use super::{meta_field, meta_field_str, FetchOutcome, SourceAdapter, SurveyMeta};

pub struct ZtfAdapter {
    client: Client,
    fink_url: String,
}

impl ZtfAdapter {
    #[must_use]
    pub fn new(fink_url: impl Into<String>) -> Self {
        Self { client: Client::new(), fink_url: fink_url.into() }
    }

    fn transport_err(&self, source: impl Into<anyhow::Error>) -> AdapterError {
        AdapterError::Transport { survey: "ztf".into(), source: source.into() }
    }

    fn filter_name(code: &str) -> &'static str {
        match code {
            "1" => "g",
            "2" => "R",
            "3" => "i",
            _ => "unknown",
        }
    }
}

#[derive(Debug, Deserialize)]
struct FinkRow {
    #[serde(rename = "i:magpsf")]
    mag: Option<f64>,
    #[serde(rename = "i:sigmapsf")]
    mag_err: Option<f64>,
    #[serde(rename = "i:fid")]
    filter: Option<Value>,
    #[serde(rename = "i:jd")]
    jd: f64,
    #[serde(rename = "i:diffmaglim")]
    limit: Option<f64>,
    #[serde(rename = "i:fwhm")]
    fwhm: Option<f64>,
    #[serde(rename = "d:tag")]
    tag: Option<String>,
}

#[async_trait]
impl SourceAdapter for ZtfAdapter {
    fn source(&self) -> Source {
        Source::Ztf
    }

    fn parse_detection(&self, payload: &[u8]) -> Result<DetectionEvent, AdapterError> {
        #[derive(Deserialize)]
        struct RawAlert {
            #[serde(rename = "objectId")]
            object_id: String,
            ra: f64,
            dec: f64,
            jd: f64,
        }
        let raw: RawAlert = serde_json::from_slice(payload)
            .map_err(|e| AdapterError::SchemaParse { survey: "ztf".into(), obj_name: "unknown".into(), source: e.into() })?;
        Ok(DetectionEvent {
            obj_id: raw.object_id,
            source: Source::Ztf,
            ra_deg: raw.ra,
            dec_deg: raw.dec,
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
        let cone: Vec<Value> = self
            .client
            .post(format!("{}/api/v1/conesearch", self.fink_url))
            .json(&serde_json::json!({
                "ra": ra_deg, "dec": dec_deg, "radius": radius_arcsec, "columns": "i:objectId",
            }))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?
            .json()
            .await
            .unwrap_or_default();

        let Some(ztf_name) =
            cone.first().and_then(|v| v.get("i:objectId")).and_then(Value::as_str).map(str::to_string)
        else {
            return Ok(FetchOutcome::NoMatch);
        };

        let objects: Vec<Value> = self
            .client
            .post(format!("{}/api/v1/objects", self.fink_url))
            .json(&serde_json::json!({
                "objectId": ztf_name, "withupperlim": true, "output-format": "json",
            }))
            .send()
            .await
            .map_err(|e| self.transport_err(e))?
            .json()
            .await
            .unwrap_or_default();

        let Some(result_meta) = objects.first() else {
            return Ok(FetchOutcome::MetaOnly(meta_from(&ztf_name, None, None, result_meta_hostnames(None))));
        };

        let ra = result_meta.get("i:ra").and_then(Value::as_f64);
        let dec = result_meta.get("i:dec").and_then(Value::as_f64);
        let hostnames = result_meta_hostnames(Some(result_meta));
        let meta = meta_from(&ztf_name, ra, dec, hostnames);

        let rows_raw: Vec<FinkRow> =
            objects.iter().filter_map(|v| serde_json::from_value(v.clone()).ok()).collect();
        if rows_raw.is_empty() {
            return Ok(FetchOutcome::MetaOnly(meta));
        }

        let mut rows = Vec::with_capacity(rows_raw.len());
        for row in rows_raw {
            let detection = match row.tag.as_deref() {
                Some("valid") => 1,
                Some("upperlim") => 0,
                _ => continue,
            };
            let filter = row
                .filter
                .as_ref()
                .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))
                .map(|code| Self::filter_name(&code).to_string())
                .unwrap_or_else(|| "unknown".to_string());

            rows.push(LightCurveRow {
                mjd: row.jd - 2_400_000.5,
                mag: if detection == 1 { row.mag } else { None },
                mag_err: if detection == 1 { row.mag_err } else { None },
                limit: row.limit,
                fwhm: row.fwhm,
                filter,
                detection,
                tel_unit: "main".to_string(),
                survey: "ztf".to_string(),
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

fn result_meta_hostnames(result_meta: Option<&Value>) -> Vec<String> {
    let Some(v) = result_meta else { return Vec::new() };
    let mut names = Vec::new();
    if let Some(name) = v.get("d:mangrove_2MASS_name").and_then(Value::as_str) {
        if name != "None" {
            names.push(name.to_string());
        }
    }
    if let Some(name) = v.get("d:mangrove_HyperLEDA_name").and_then(Value::as_str) {
        if name != "None" {
            names.push(name.to_string());
        }
    }
    names
}

fn meta_from(ztf_name: &str, ra: Option<f64>, dec: Option<f64>, hostnames: Vec<String>) -> SurveyMeta {
    SurveyMeta {
        identifiers: vec![IdentifierEntry { name: ztf_name.to_string(), source: Source::Ztf }],
        ra_deg: ra.map(|v| meta_field(v, Source::Ztf)),
        dec_deg: dec.map(|v| meta_field(v, Source::Ztf)),
        host_name: hostnames.into_iter().map(|n| meta_field_str(n, Source::Ztf)).collect(),
        ..SurveyMeta::default()
    }
}
