//! Light-Curve Fusion & Derived Metrics (`spec.md` §4.4): merges every
//! adapter's view of one object into the canonical schema, derives
//! photometric metrics, diffs against the stored document, and persists.

mod diff;
mod metrics;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tarxiv_common::{push_unique, ChangeSummary, IdentifierEntry, LightCurve, ObjectMetadata};

use crate::bus::SubscriberBus;
use crate::error::{AdapterError, PipelineError};
use crate::report::{LogstashSink, ReportMode, StatusEvent};
use crate::sources::{FetchOutcome, SourceAdapter, SurveyMeta};
use crate::store::CatalogStore;

pub use diff::diff_object;
pub use metrics::derived_metrics;

/// Time-window bounds around the anchor's discovery/reporting date
/// (`spec.md` §4.4 step 4).
#[derive(Debug, Clone, Copy)]
pub struct FusionWindow {
    pub prior_days: i64,
    pub active_days: i64,
}

pub struct Fusion<S: CatalogStore> {
    store: Arc<S>,
    anchor: Arc<dyn SourceAdapter>,
    secondaries: Vec<Arc<dyn SourceAdapter>>,
    window: FusionWindow,
    fetch_radius_arcsec: f64,
    bus: Option<Arc<SubscriberBus>>,
    report_mode: ReportMode,
    logstash: Option<Arc<LogstashSink>>,
}

impl<S: CatalogStore> Fusion<S> {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        anchor: Arc<dyn SourceAdapter>,
        secondaries: Vec<Arc<dyn SourceAdapter>>,
        window: FusionWindow,
        fetch_radius_arcsec: f64,
        bus: Option<Arc<SubscriberBus>>,
        report_mode: ReportMode,
        logstash: Option<Arc<LogstashSink>>,
    ) -> Self {
        Self { store, anchor, secondaries, window, fetch_radius_arcsec, bus, report_mode, logstash }
    }

    /// `build_object(primary_name)` (`spec.md` §4.4): returns `Ok(None)`
    /// when the anchor adapter has no record for `primary_name` ("if no
    /// result, return empty").
    pub async fn build_object(
        &self,
        primary_name: &str,
    ) -> Result<Option<(ObjectMetadata, LightCurve, ChangeSummary)>, PipelineError> {
        let anchor_meta = match self.anchor.fetch_by_coord(primary_name, 0.0, 0.0, 0.0).await? {
            FetchOutcome::NoMatch => return Ok(None),
            FetchOutcome::Full(meta, _) => {
                return Ok(Some(self.assemble(primary_name, meta, Vec::new()).await?));
            }
            FetchOutcome::MetaOnly(meta) => meta,
        };

        let Some(ra_deg) = anchor_meta.ra_deg.as_ref().map(|f| f.value) else {
            return Err(PipelineError::Adapter(AdapterError::SchemaParse {
                survey: "tns".into(),
                obj_name: primary_name.into(),
                source: anyhow::anyhow!("anchor metadata missing ra_deg"),
            }));
        };
        let dec_deg = anchor_meta.dec_deg.as_ref().map_or(0.0, |f| f.value);

        let pulls = join_all(self.secondaries.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            let radius = self.fetch_radius_arcsec;
            let name = primary_name.to_string();
            async move { (adapter.source(), adapter.fetch_by_coord(&name, ra_deg, dec_deg, radius).await) }
        }))
        .await;

        let mut metas = vec![anchor_meta];
        let mut rows = Vec::new();
        for (source, result) in pulls {
            match result {
                Ok(FetchOutcome::NoMatch) => {}
                Ok(FetchOutcome::MetaOnly(meta)) => metas.push(meta),
                Ok(FetchOutcome::Full(meta, lc)) => {
                    metas.push(meta);
                    rows.extend(lc);
                }
                Err(e) => StatusEvent::new("secondary_adapter_pull_failed")
                    .obj_name(primary_name)
                    .error(e.to_string())
                    .details(format!("source={source}"))
                    .emit_warn(self.report_mode, self.logstash.as_deref()),
            }
        }

        let merged_meta = merge_metas(primary_name, metas);
        Ok(Some(self.assemble(primary_name, merged_meta, rows).await?))
    }

    async fn assemble(
        &self,
        primary_name: &str,
        mut meta: ObjectMetadata,
        mut rows: LightCurve,
    ) -> Result<(ObjectMetadata, LightCurve, ChangeSummary), PipelineError> {
        crate::sources::normalize::normalize_rows(&mut rows);
        rows = self.apply_time_window(&meta, rows);

        let (peak, latest_detection, latest_nondetection) = derived_metrics(&rows);
        meta.peak_mag = peak;
        meta.latest_detection = latest_detection;
        meta.latest_nondetection = latest_nondetection;

        let prior = self.store.get_object(primary_name).await?;
        let summary = diff_object(prior.as_ref(), &meta);

        self.store.upsert_object(&meta).await?;
        self.store.upsert_lightcurve(primary_name, &rows).await?;

        if summary.is_substantive() {
            StatusEvent::new("object_updated")
                .obj_name(primary_name)
                .details(format!("{:?}", summary.status))
                .emit_info(self.report_mode, self.logstash.as_deref());
            if let Some(bus) = &self.bus {
                let notice = tarxiv_common::ChangeNotice::from_summary(
                    primary_name,
                    tarxiv_common::NoticeTopic::Tns,
                    summary.clone(),
                );
                bus.publish(&notice).await;
            }
        } else {
            StatusEvent::new("no_substantive_change")
                .obj_name(primary_name)
                .emit_info(self.report_mode, self.logstash.as_deref());
        }

        Ok((meta, rows, summary))
    }

    /// Retain rows whose MJD is within `[D-P, D+A]` of the discovery date,
    /// or within the same window around the reporting date when one
    /// exists (`spec.md` §4.4 step 4).
    fn apply_time_window(&self, meta: &ObjectMetadata, rows: LightCurve) -> LightCurve {
        let anchors: Vec<DateTime<Utc>> = meta
            .discovery_date
            .iter()
            .map(|f| f.value)
            .chain(meta.reporting_date.iter().map(|f| f.value))
            .collect();
        if anchors.is_empty() {
            return rows;
        }
        let prior = chrono::Duration::days(self.window.prior_days);
        let active = chrono::Duration::days(self.window.active_days);
        rows.into_iter()
            .filter(|row| {
                let t = tarxiv_common::time::mjd_to_datetime(row.mjd);
                anchors.iter().any(|&anchor| t >= anchor - prior && t <= anchor + active)
            })
            .collect()
    }
}

/// Merge every adapter's `SurveyMeta` into the canonical schema
/// (`spec.md` §4.4 step 3): append non-null values, deduping by
/// `(source, value)` per field.
fn merge_metas(primary_name: &str, metas: Vec<SurveyMeta>) -> ObjectMetadata {
    let mut meta = ObjectMetadata::empty(primary_name);
    for survey in metas {
        for ident in survey.identifiers {
            push_identifier(&mut meta.identifiers, ident);
        }
        if let Some(v) = survey.ra_deg {
            push_unique(&mut meta.ra_deg, v);
        }
        if let Some(v) = survey.dec_deg {
            push_unique(&mut meta.dec_deg, v);
        }
        if let Some(v) = survey.ra_hms {
            push_unique(&mut meta.ra_hms, v);
        }
        if let Some(v) = survey.dec_dms {
            push_unique(&mut meta.dec_dms, v);
        }
        for v in survey.object_type {
            push_unique(&mut meta.object_type, v);
        }
        if let Some(v) = survey.discovery_date {
            push_unique(&mut meta.discovery_date, v);
        }
        if let Some(v) = survey.reporting_date {
            push_unique(&mut meta.reporting_date, v);
        }
        if let Some(v) = survey.reporting_group {
            push_unique(&mut meta.reporting_group, v);
        }
        if let Some(v) = survey.redshift {
            push_unique(&mut meta.redshift, v);
        }
        for v in survey.host_name {
            push_unique(&mut meta.host_name, v);
        }
    }
    meta
}

fn push_identifier(list: &mut Vec<IdentifierEntry>, ident: IdentifierEntry) {
    if !list.iter().any(|existing| existing.name == ident.name && existing.source == ident.source) {
        list.push(ident);
    }
}
