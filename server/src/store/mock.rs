//! In-memory `CatalogStore` used by integration tests (`SPEC_FULL.md` §8's
//! end-to-end scenarios run against this rather than a live Postgres
//! instance).

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use tarxiv_common::{ident::format_xmatch_id, Alert, CrossMatchHit, LightCurve, ObjectMetadata};

use crate::error::StoreError;

use super::{CatalogStore, ConeSearchHit, FieldPredicate, HitExtension, NewHitInput};

#[derive(Default)]
struct Inner {
    hits: HashMap<String, CrossMatchHit>,
    idx: HashMap<String, u64>,
    alerts: HashMap<String, Alert>,
    objects: HashMap<String, ObjectMetadata>,
    lightcurves: HashMap<String, LightCurve>,
}

pub struct MockStore {
    inner: Mutex<Inner>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    /// Pre-provision the `idx` document for `year`, matching the real
    /// store's startup invariant.
    pub fn provision_year(&self, year: i32, current_idx: u64) {
        self.inner.lock().unwrap().idx.insert(year.to_string(), current_idx);
    }

    #[must_use]
    pub fn idx_for_year(&self, year: i32) -> u64 {
        *self.inner.lock().unwrap().idx.get(&year.to_string()).unwrap_or(&0)
    }

    #[must_use]
    pub fn alert_count(&self) -> usize {
        self.inner.lock().unwrap().alerts.len()
    }

    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.inner.lock().unwrap().hits.len()
    }
}

#[async_trait]
impl CatalogStore for MockStore {
    async fn find_hits_by_identifiers(&self, names: &[&str]) -> Result<Vec<CrossMatchHit>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut found: Vec<CrossMatchHit> = inner
            .hits
            .values()
            .filter(|hit| hit.identifiers.iter().any(|id| names.contains(&id.name.as_str())))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.xmatch_id.cmp(&b.xmatch_id));
        Ok(found)
    }

    async fn mint_new_hit(&self, year: i32, id_width: usize, input: NewHitInput) -> Result<CrossMatchHit, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.idx.entry(year.to_string()).or_insert(0);
        *entry += 1;
        let xmatch_id = format_xmatch_id(year, *entry, id_width);
        let hit = CrossMatchHit {
            xmatch_id: xmatch_id.clone(),
            identifiers: input.identifiers,
            coords: input.coords,
            timestamps: input.timestamps,
            sources: input.sources,
            updated_at: Utc::now(),
        };
        inner.hits.insert(xmatch_id, hit.clone());
        Ok(hit)
    }

    async fn extend_hit(&self, xmatch_id: &str, extension: HitExtension) -> Result<CrossMatchHit, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let hit = inner.hits.get_mut(xmatch_id).ok_or_else(|| StoreError::NotFound {
            scope: "xmatch".into(),
            collection: "hits".into(),
            key: xmatch_id.into(),
        })?;
        hit.identifiers.push(extension.identifier);
        hit.coords.push(extension.coord);
        hit.timestamps.push(extension.timestamp);
        if !hit.sources.iter().any(|s| s.alias == extension.citation.alias) {
            hit.sources.push(extension.citation);
        }
        hit.updated_at = Utc::now();
        Ok(hit.clone())
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.alerts.entry(alert.obj_id.clone()).or_insert_with(|| alert.clone());
        Ok(())
    }

    async fn cone_search(&self, ra_deg: f64, dec_deg: f64, radius_arcsec: f64) -> Result<Vec<ConeSearchHit>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut hits: Vec<ConeSearchHit> = inner
            .objects
            .values()
            .filter_map(|obj| {
                let ra = obj.ra_deg.first()?.value;
                let dec = obj.dec_deg.first()?.value;
                let d = tarxiv_common::geo::angular_distance_arcsec(ra_deg, dec_deg, ra, dec);
                (d <= radius_arcsec).then_some(ConeSearchHit {
                    obj_name: obj.primary_name.clone(),
                    ra,
                    dec,
                    distance_deg: d / 3600.0,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance_deg.partial_cmp(&b.distance_deg).unwrap());
        Ok(hits)
    }

    async fn active_object_names(&self, active_days: i64) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let cutoff = Utc::now() - chrono::Duration::days(active_days);
        Ok(inner
            .objects
            .values()
            .filter(|obj| {
                obj.discovery_date.iter().any(|d| d.value >= cutoff)
                    || obj.reporting_date.iter().any(|d| d.value >= cutoff)
            })
            .map(|obj| obj.primary_name.clone())
            .collect())
    }

    async fn query_by_field(&self, predicate: &FieldPredicate) -> Result<Vec<serde_json::Value>, StoreError> {
        super::validate_predicate(predicate)?;
        // In-memory test double: field-by-field evaluation isn't needed by
        // any current test scenario, so this returns every hit document.
        let inner = self.inner.lock().unwrap();
        inner
            .hits
            .values()
            .map(|hit| serde_json::to_value(hit).map_err(|e| StoreError::CommitAmbiguous(e.to_string())))
            .collect()
    }

    async fn get_object(&self, primary_name: &str) -> Result<Option<ObjectMetadata>, StoreError> {
        Ok(self.inner.lock().unwrap().objects.get(primary_name).cloned())
    }

    async fn upsert_object(&self, meta: &ObjectMetadata) -> Result<(), StoreError> {
        self.inner.lock().unwrap().objects.insert(meta.primary_name.clone(), meta.clone());
        Ok(())
    }

    async fn get_lightcurve(&self, primary_name: &str) -> Result<Option<LightCurve>, StoreError> {
        Ok(self.inner.lock().unwrap().lightcurves.get(primary_name).cloned())
    }

    async fn upsert_lightcurve(&self, primary_name: &str, lc: &LightCurve) -> Result<(), StoreError> {
        self.inner.lock().unwrap().lightcurves.insert(primary_name.to_string(), lc.clone());
        Ok(())
    }
}
