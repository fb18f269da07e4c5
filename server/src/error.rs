//! Pipeline error taxonomy (`SPEC_FULL.md` §7).

use thiserror::Error;

/// Errors a Source Adapter's pull contract can surface. A survey having no
/// match, or a match with no photometry, is not an error at all — those are
/// `FetchOutcome::NoMatch`/`MetaOnly` results, not `Err` (`crate::sources`).
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transport error contacting {survey}: {source}")]
    Transport {
        survey: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to parse {survey} response for {obj_name}: {source}")]
    SchemaParse {
        survey: String,
        obj_name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors the Catalog Store can surface.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {scope}.{collection}/{key}")]
    NotFound { scope: String, collection: String, key: String },

    #[error("transaction could not be committed and the outcome is ambiguous: {0}")]
    CommitAmbiguous(String),

    #[error("compare-and-swap conflict on {scope}.{collection}/{key}")]
    CasConflict { scope: String, collection: String, key: String },

    #[error("rejected predicate: contains a disallowed token")]
    UnsafePredicate,

    #[error(transparent)]
    Backend(#[from] sqlx::Error),
}

/// Top-level pipeline error taxonomy. Every long-running worker loop
/// classifies failures into one of these variants and never lets an
/// exception escape uncaught (`SPEC_FULL.md` §7, final paragraph).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("duplicate cross-match: {obj_id_1} and {obj_id_2} are both already present in hit {existing_xmatch_id}")]
    DuplicateCrossMatch { obj_id_1: String, obj_id_2: String, existing_xmatch_id: String },

    #[error("fatal initialization error: {0}")]
    FatalInit(#[from] anyhow::Error),
}
