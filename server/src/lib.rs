//! tarxiv pipeline
//!
//! Cross-survey transient detection aggregator: Source Adapters pull and
//! push per-survey alerts onto a Detection Bus, a Spatial Stream Matcher
//! cross-matches detections from distinct surveys within a sliding time
//! window, a Match Reconciler resolves matches against the persistent
//! catalog, and a Light-Curve Fusion stage merges photometry and derived
//! metrics before a Change-Notice Publisher announces the result.

pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod fusion;
pub mod mailbox;
pub mod matcher;
pub mod reconciler;
pub mod report;
pub mod sources;
pub mod store;
