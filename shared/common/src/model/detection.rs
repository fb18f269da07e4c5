//! `DetectionEvent` and `MatchCandidate`, the spatial matcher's input/output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A survey a detection originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Atlas,
    Ztf,
    #[serde(rename = "ASAS_SN")]
    AsasSn,
    Lsst,
    Tns,
    /// Used only by deterministic test fixtures.
    Test,
}

impl Source {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Atlas => "atlas",
            Self::Ztf => "ztf",
            Self::AsasSn => "asas_sn",
            Self::Lsst => "lsst",
            Self::Tns => "tns",
            Self::Test => "test",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized detection emitted by a Source Adapter onto the
/// Detection Bus. Immutable; consumed by the matcher within its sliding
/// window and then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub obj_id: String,
    pub source: Source,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub timestamp: DateTime<Utc>,
}

/// The cartesian product of two distinct `DetectionEvent`s that satisfied
/// the matcher's join predicate. `obj_id_1 < obj_id_2` lexicographically and
/// `source_1 != source_2` always hold for a well-formed candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub obj_id_1: String,
    pub source_1: Source,
    pub ra_deg_1: f64,
    pub dec_deg_1: f64,
    pub timestamp_1: DateTime<Utc>,

    pub obj_id_2: String,
    pub source_2: Source,
    pub ra_deg_2: f64,
    pub dec_deg_2: f64,
    pub timestamp_2: DateTime<Utc>,
}

impl MatchCandidate {
    /// Build a candidate from two events, enforcing the ordering invariant.
    /// Returns `None` if the pair does not satisfy the join predicate's
    /// structural requirements (same source, or already in canonical order
    /// with nothing to swap).
    #[must_use]
    pub fn from_ordered_pair(a: &DetectionEvent, b: &DetectionEvent) -> Option<Self> {
        if a.source == b.source {
            return None;
        }
        let (first, second) = if a.obj_id < b.obj_id { (a, b) } else { (b, a) };
        if first.obj_id == second.obj_id {
            return None;
        }
        Some(Self {
            obj_id_1: first.obj_id.clone(),
            source_1: first.source,
            ra_deg_1: first.ra_deg,
            dec_deg_1: first.dec_deg,
            timestamp_1: first.timestamp,
            obj_id_2: second.obj_id.clone(),
            source_2: second.source,
            ra_deg_2: second.ra_deg,
            dec_deg_2: second.dec_deg,
            timestamp_2: second.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, source: Source) -> DetectionEvent {
        DetectionEvent {
            obj_id: id.to_string(),
            source,
            ra_deg: 180.0,
            dec_deg: 30.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn ordering_is_canonical_regardless_of_input_order() {
        let a = event("ZTF-A", Source::Ztf);
        let b = event("LSST-B", Source::Lsst);

        let c1 = MatchCandidate::from_ordered_pair(&a, &b).unwrap();
        let c2 = MatchCandidate::from_ordered_pair(&b, &a).unwrap();

        assert_eq!(c1.obj_id_1, c2.obj_id_1);
        assert_eq!(c1.obj_id_2, c2.obj_id_2);
        assert!(c1.obj_id_1 < c1.obj_id_2);
    }

    #[test]
    fn same_source_never_matches() {
        let a = event("ZTF-A", Source::Ztf);
        let b = event("ZTF-B", Source::Ztf);
        assert!(MatchCandidate::from_ordered_pair(&a, &b).is_none());
    }
}
