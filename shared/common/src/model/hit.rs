//! `CrossMatchHit`, the persisted record of a confirmed cross-survey match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CitationSource, Source};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierEntry {
    pub name: String,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordEntry {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub ra_hms: String,
    pub dec_dms: String,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampEntry {
    pub value: DateTime<Utc>,
    pub source: Source,
}

/// A confirmed cross-survey match, keyed by a synthetic `xmatch_id` of the
/// form `TXV-YYYY-AAAAAA`.
///
/// Invariants (checked by [`CrossMatchHit::check_invariants`]): every name
/// in `identifiers` is unique within the document; `identifiers.len() >= 2`;
/// every source referenced in `identifiers` also appears in `sources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossMatchHit {
    pub xmatch_id: String,
    pub identifiers: Vec<IdentifierEntry>,
    pub coords: Vec<CoordEntry>,
    pub timestamps: Vec<TimestampEntry>,
    pub sources: Vec<CitationSource>,
    #[serde(with = "crate::time::serde_iso_space")]
    pub updated_at: DateTime<Utc>,
}

impl CrossMatchHit {
    /// Validate the structural invariants `spec.md` places on a persisted
    /// hit. Returns `Err` naming the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.identifiers.len() != self.coords.len() || self.identifiers.len() != self.timestamps.len() {
            return Err(format!(
                "identifiers/coords/timestamps length mismatch: {}/{}/{}",
                self.identifiers.len(),
                self.coords.len(),
                self.timestamps.len()
            ));
        }
        if self.identifiers.len() < 2 {
            return Err(format!("hit has only {} identifier(s), need >= 2", self.identifiers.len()));
        }

        let mut seen = std::collections::HashSet::new();
        for ident in &self.identifiers {
            if !seen.insert(&ident.name) {
                return Err(format!("duplicate identifier name {}", ident.name));
            }
        }

        let cited: std::collections::HashSet<&str> =
            self.sources.iter().map(|c| c.alias.as_str()).collect();
        for ident in &self.identifiers {
            if !cited.contains(ident.source.as_str()) {
                return Err(format!("source {} referenced by identifiers has no citation entry", ident.source));
            }
        }
        Ok(())
    }

    /// Names of identifiers not already present in this hit, for the
    /// reconciler's extend-case diff (`{obj_id_1, obj_id_2} \ existing`).
    #[must_use]
    pub fn missing_identifiers<'a>(&self, candidates: &[&'a str]) -> Vec<&'a str> {
        let existing: std::collections::HashSet<&str> =
            self.identifiers.iter().map(|i| i.name.as_str()).collect();
        candidates.iter().copied().filter(|c| !existing.contains(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citation(alias: &str) -> CitationSource {
        CitationSource {
            name: alias.to_string(),
            bibcode: "2020xxxx".to_string(),
            reference: "ref".to_string(),
            alias: alias.to_string(),
        }
    }

    fn sample_hit() -> CrossMatchHit {
        CrossMatchHit {
            xmatch_id: "TXV-2025-000001".to_string(),
            identifiers: vec![
                IdentifierEntry { name: "ZTF-A".into(), source: Source::Ztf },
                IdentifierEntry { name: "LSST-B".into(), source: Source::Lsst },
            ],
            coords: vec![
                CoordEntry { ra_deg: 180.0, dec_deg: 30.0, ra_hms: "12:00:00.00".into(), dec_dms: "+30:00:00.00".into(), source: Source::Ztf },
                CoordEntry { ra_deg: 180.0, dec_deg: 30.0, ra_hms: "12:00:00.00".into(), dec_dms: "+30:00:00.00".into(), source: Source::Lsst },
            ],
            timestamps: vec![
                TimestampEntry { value: Utc::now(), source: Source::Ztf },
                TimestampEntry { value: Utc::now(), source: Source::Lsst },
            ],
            sources: vec![citation("ztf"), citation("lsst")],
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn valid_hit_passes() {
        assert!(sample_hit().check_invariants().is_ok());
    }

    #[test]
    fn missing_citation_fails() {
        let mut hit = sample_hit();
        hit.sources.pop();
        assert!(hit.check_invariants().is_err());
    }

    #[test]
    fn single_identifier_fails() {
        let mut hit = sample_hit();
        hit.identifiers.pop();
        hit.coords.pop();
        hit.timestamps.pop();
        assert!(hit.check_invariants().is_err());
    }

    #[test]
    fn missing_identifiers_computes_diff() {
        let hit = sample_hit();
        let missing = hit.missing_identifiers(&["ZTF-A", "ATLAS-C"]);
        assert_eq!(missing, vec!["ATLAS-C"]);
    }
}
