//! tarxiv common library
//!
//! Canonical data model shared between the pipeline binaries: detection
//! events, cross-match hits, object metadata, light curves, and the
//! geometry/time/identifier utilities the pipeline's core algorithms are
//! built from.

pub mod error;
pub mod geo;
pub mod ident;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use model::*;
