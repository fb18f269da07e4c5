//! Postgres-backed `CatalogStore`.
//!
//! Scope -> schema, collection -> table, exactly as `SPEC_FULL.md` §4.5's
//! storage mapping describes: `tarxiv_xmatch.hits`, `tarxiv_xmatch.alerts`,
//! `tarxiv_xmatch.idx`, `tarxiv_tns.objects`, `tarxiv_tns.lightcurves`.
//! Every table carries a `doc JSONB` column holding the document and (for
//! `hits`) a `cas BIGINT` column used as the optimistic-concurrency token,
//! the JSONB analogue of a Couchbase document CAS.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use sqlx::{PgPool, Row};
use tarxiv_common::{
    ident::format_xmatch_id, Alert, CrossMatchHit, LightCurve, ObjectMetadata,
};

use crate::error::StoreError;

use super::{CatalogStore, ConeSearchHit, FieldPredicate, HitExtension, NewHitInput};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn find_hits_by_identifiers(&self, names: &[&str]) -> Result<Vec<CrossMatchHit>, StoreError> {
        let names: Vec<String> = names.iter().map(|s| (*s).to_string()).collect();
        let rows = sqlx::query(
            r"
            SELECT doc FROM tarxiv_xmatch.hits h
            WHERE EXISTS (
                SELECT 1 FROM jsonb_array_elements(h.doc->'identifiers') elem
                WHERE elem->>'name' = ANY($1)
            )
            ORDER BY key ASC
            ",
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let doc: serde_json::Value = row.try_get("doc")?;
                serde_json::from_value(doc).map_err(|e| {
                    StoreError::CommitAmbiguous(format!("corrupt hit document: {e}"))
                })
            })
            .collect()
    }

    async fn mint_new_hit(&self, year: i32, id_width: usize, input: NewHitInput) -> Result<CrossMatchHit, StoreError> {
        let mut tx = self.pool.begin().await?;

        let year_key = year.to_string();
        let current_idx: i64 = sqlx::query_scalar(
            "SELECT current_idx FROM tarxiv_xmatch.idx WHERE year = $1 FOR UPDATE",
        )
        .bind(&year_key)
        .fetch_one(&mut *tx)
        .await?;

        let new_idx = current_idx + 1;
        sqlx::query("UPDATE tarxiv_xmatch.idx SET current_idx = $1 WHERE year = $2")
            .bind(new_idx)
            .bind(&year_key)
            .execute(&mut *tx)
            .await?;

        let xmatch_id = format_xmatch_id(year, new_idx as u64, id_width);
        let hit = CrossMatchHit {
            xmatch_id: xmatch_id.clone(),
            identifiers: input.identifiers,
            coords: input.coords,
            timestamps: input.timestamps,
            sources: input.sources,
            updated_at: Utc::now(),
        };

        let doc = serde_json::to_value(&hit)
            .map_err(|e| StoreError::CommitAmbiguous(format!("serializing new hit: {e}")))?;
        sqlx::query("INSERT INTO tarxiv_xmatch.hits (key, doc, cas) VALUES ($1, $2, 1)")
            .bind(&xmatch_id)
            .bind(&doc)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(hit)
    }

    async fn extend_hit(&self, xmatch_id: &str, extension: HitExtension) -> Result<CrossMatchHit, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT doc, cas FROM tarxiv_xmatch.hits WHERE key = $1 FOR UPDATE")
            .bind(xmatch_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                scope: "xmatch".into(),
                collection: "hits".into(),
                key: xmatch_id.into(),
            })?;

        let doc: serde_json::Value = row.try_get("doc")?;
        let cas: i64 = row.try_get("cas")?;
        let mut hit: CrossMatchHit = serde_json::from_value(doc)
            .map_err(|e| StoreError::CommitAmbiguous(format!("corrupt hit document: {e}")))?;

        hit.identifiers.push(extension.identifier);
        hit.coords.push(extension.coord);
        hit.timestamps.push(extension.timestamp);
        if !hit.sources.iter().any(|s| s.alias == extension.citation.alias) {
            hit.sources.push(extension.citation);
        }
        hit.updated_at = Utc::now();

        let new_doc = serde_json::to_value(&hit)
            .map_err(|e| StoreError::CommitAmbiguous(format!("serializing extended hit: {e}")))?;
        let result = sqlx::query(
            "UPDATE tarxiv_xmatch.hits SET doc = $1, cas = cas + 1 WHERE key = $2 AND cas = $3",
        )
        .bind(&new_doc)
        .bind(xmatch_id)
        .bind(cas)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::CasConflict {
                scope: "xmatch".into(),
                collection: "hits".into(),
                key: xmatch_id.into(),
            });
        }

        tx.commit().await?;
        Ok(hit)
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let doc = serde_json::to_value(alert)
            .map_err(|e| StoreError::CommitAmbiguous(format!("serializing alert: {e}")))?;
        sqlx::query(
            "INSERT INTO tarxiv_xmatch.alerts (key, doc) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
        )
        .bind(&alert.obj_id)
        .bind(&doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cone_search(&self, ra_deg: f64, dec_deg: f64, radius_arcsec: f64) -> Result<Vec<ConeSearchHit>, StoreError> {
        // Declination-range prefilter before the trigonometric evaluation.
        let radius_deg = radius_arcsec / 3600.0;
        let rows = sqlx::query(
            r"
            SELECT key,
                   (doc->'ra_deg'->0->>'value')::float8 AS ra,
                   (doc->'dec_deg'->0->>'value')::float8 AS dec
            FROM tarxiv_tns.objects
            WHERE (doc->'dec_deg'->0->>'value')::float8 BETWEEN $1 AND $2
            ",
        )
        .bind(dec_deg - radius_deg)
        .bind(dec_deg + radius_deg)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<ConeSearchHit> = rows
            .into_iter()
            .filter_map(|row| {
                let key: String = row.try_get("key").ok()?;
                let ra: f64 = row.try_get("ra").ok()?;
                let dec: f64 = row.try_get("dec").ok()?;
                let distance_arcsec = tarxiv_common::geo::angular_distance_arcsec(ra_deg, dec_deg, ra, dec);
                if distance_arcsec <= radius_arcsec {
                    Some(ConeSearchHit { obj_name: key, ra, dec, distance_deg: distance_arcsec / 3600.0 })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| a.distance_deg.partial_cmp(&b.distance_deg).unwrap());
        Ok(hits)
    }

    async fn active_object_names(&self, active_days: i64) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT key FROM tarxiv_tns.objects o
            WHERE EXISTS (
                SELECT 1 FROM jsonb_array_elements(doc->'discovery_date') d
                WHERE (d->>'value')::timestamptz >= now() - ($1 || ' days')::interval
            ) OR EXISTS (
                SELECT 1 FROM jsonb_array_elements(doc->'reporting_date') d
                WHERE (d->>'value')::timestamptz >= now() - ($1 || ' days')::interval
            )
            ",
        )
        .bind(active_days.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("key").map_err(StoreError::from))
            .collect()
    }

    async fn query_by_field(&self, predicate: &FieldPredicate) -> Result<Vec<serde_json::Value>, StoreError> {
        super::validate_predicate(predicate)?;

        let sql = format!(
            r"
            SELECT doc FROM tarxiv_xmatch.hits h
            WHERE EXISTS (
                SELECT 1 FROM jsonb_array_elements(h.doc->'{field}') elem
                WHERE elem->>'value' {op} $1
            )
            ",
            field = predicate.field,
            op = predicate.op.as_sql(),
        );

        let rows = sqlx::query(&sql).bind(&predicate.literal).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| row.try_get::<serde_json::Value, _>("doc").map_err(StoreError::from))
            .collect()
    }

    async fn get_object(&self, primary_name: &str) -> Result<Option<ObjectMetadata>, StoreError> {
        let row = sqlx::query("SELECT doc FROM tarxiv_tns.objects WHERE key = $1")
            .bind(primary_name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let doc: serde_json::Value = row.try_get("doc")?;
            serde_json::from_value(doc).map_err(|e| StoreError::CommitAmbiguous(format!("corrupt object document: {e}")))
        })
        .transpose()
    }

    async fn upsert_object(&self, meta: &ObjectMetadata) -> Result<(), StoreError> {
        let doc = serde_json::to_value(meta)
            .map_err(|e| StoreError::CommitAmbiguous(format!("serializing object: {e}")))?;
        sqlx::query(
            r"
            INSERT INTO tarxiv_tns.objects (key, doc) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET doc = EXCLUDED.doc
            ",
        )
        .bind(&meta.primary_name)
        .bind(&doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_lightcurve(&self, primary_name: &str) -> Result<Option<LightCurve>, StoreError> {
        let row = sqlx::query("SELECT doc FROM tarxiv_tns.lightcurves WHERE key = $1")
            .bind(primary_name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let doc: serde_json::Value = row.try_get("doc")?;
            serde_json::from_value(doc).map_err(|e| StoreError::CommitAmbiguous(format!("corrupt lightcurve document: {e}")))
        })
        .transpose()
    }

    async fn upsert_lightcurve(&self, primary_name: &str, lc: &LightCurve) -> Result<(), StoreError> {
        let doc = serde_json::to_value(lc)
            .map_err(|e| StoreError::CommitAmbiguous(format!("serializing lightcurve: {e}")))?;
        sqlx::query(
            r"
            INSERT INTO tarxiv_tns.lightcurves (key, doc) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET doc = EXCLUDED.doc
            ",
        )
        .bind(primary_name)
        .bind(&doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Ensure the `idx` document for `year` exists, pre-provisioned with
/// `current_idx = 0` (`SPEC_FULL.md` §4.3: "must be pre-provisioned").
pub async fn ensure_year_provisioned(pool: &PgPool, year: i32) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO tarxiv_xmatch.idx (year, current_idx) VALUES ($1, 0) ON CONFLICT (year) DO NOTHING",
    )
    .bind(year.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

#[must_use]
pub fn current_year() -> i32 {
    Utc::now().year()
}
