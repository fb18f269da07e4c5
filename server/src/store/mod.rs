//! Catalog Store: document-oriented persistence over a bucket/scope/collection
//! hierarchy (`SPEC_FULL.md` §4.5).
//!
//! The store is exposed as a small trait of purpose-built atomic operations
//! rather than a generic `get`/`replace`/`transaction(closure)` triad: every
//! call site in the reconciler and fusion modules is fixed and known ahead of
//! time, so each operation that needs transactional read-modify-write
//! semantics (minting a new hit, extending one) is its own trait method,
//! implemented with a single database transaction internally. This avoids
//! threading a generic async closure through a `dyn` trait object while
//! still giving callers the same atomicity the original document store's
//! `transactions.run(...)` provided.

mod mock;
mod postgres;
mod queries;

pub use mock::MockStore;
pub use postgres::{current_year, ensure_year_provisioned, PostgresStore};
pub use queries::{validate_predicate, ConeSearchHit, FieldOp, FieldPredicate};

use async_trait::async_trait;
use tarxiv_common::{Alert, CitationSource, CoordEntry, CrossMatchHit, IdentifierEntry, LightCurve, ObjectMetadata, TimestampEntry};

use crate::error::StoreError;

/// Input for minting a brand new `CrossMatchHit` (§4.3 step 2b).
#[derive(Debug, Clone)]
pub struct NewHitInput {
    pub identifiers: Vec<IdentifierEntry>,
    pub coords: Vec<CoordEntry>,
    pub timestamps: Vec<TimestampEntry>,
    pub sources: Vec<CitationSource>,
}

/// Input for extending an existing `CrossMatchHit` with one more survey's
/// view (§4.3 step 2c).
#[derive(Debug, Clone)]
pub struct HitExtension {
    pub identifier: IdentifierEntry,
    pub coord: CoordEntry,
    pub timestamp: TimestampEntry,
    pub citation: CitationSource,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Find every hit whose `identifiers[*].name` intersects `names`
    /// (§4.3 step 2a).
    async fn find_hits_by_identifiers(&self, names: &[&str]) -> Result<Vec<CrossMatchHit>, StoreError>;

    /// Atomically increment the current year's `idx` counter and insert a
    /// new hit keyed by the resulting `xmatch_id` (§4.3 step 2b).
    async fn mint_new_hit(&self, year: i32, id_width: usize, input: NewHitInput) -> Result<CrossMatchHit, StoreError>;

    /// Atomically append a new identifier/coord/timestamp/citation to an
    /// existing hit and bump `updated_at` (§4.3 step 2c).
    async fn extend_hit(&self, xmatch_id: &str, extension: HitExtension) -> Result<CrossMatchHit, StoreError>;

    /// Insert a raw alert, keyed by `obj_id`, for provenance replay.
    async fn insert_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    /// Cone search over the primary catalog's objects: every object within
    /// `radius_arcsec` of `(ra_deg, dec_deg)`, ascending by distance.
    async fn cone_search(&self, ra_deg: f64, dec_deg: f64, radius_arcsec: f64) -> Result<Vec<ConeSearchHit>, StoreError>;

    /// Primary names whose `discovery_date` or `reporting_date` falls
    /// within the last `active_days`.
    async fn active_object_names(&self, active_days: i64) -> Result<Vec<String>, StoreError>;

    /// `ANY x IN identifiers SATISFIES x.value OP literal END`-shaped query,
    /// used by the read-API (out of core scope, but the store still
    /// enforces the predicate safety contract).
    async fn query_by_field(&self, predicate: &FieldPredicate) -> Result<Vec<serde_json::Value>, StoreError>;

    async fn get_object(&self, primary_name: &str) -> Result<Option<ObjectMetadata>, StoreError>;
    async fn upsert_object(&self, meta: &ObjectMetadata) -> Result<(), StoreError>;
    async fn get_lightcurve(&self, primary_name: &str) -> Result<Option<LightCurve>, StoreError>;
    async fn upsert_lightcurve(&self, primary_name: &str, lc: &LightCurve) -> Result<(), StoreError>;
}
