//! Raw provenance record, persisted once per contributing detection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The full raw payload a survey returned for a detection, kept for
/// provenance replay. Created once per `obj_id`, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub obj_id: String,
    pub source: super::Source,
    pub raw: Value,
}
