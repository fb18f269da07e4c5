//! Canonical object metadata: every field is a list of source-keyed values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::IdentifierEntry;

/// A plain source-keyed value, the shape most `ObjectMetadata` fields use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue<T> {
    pub value: T,
    pub source: String,
}

impl<T: PartialEq> FieldValue<T> {
    fn is_duplicate_of(&self, other: &Self) -> bool {
        self.source == other.source && self.value == other.value
    }
}

/// The extended record used for derived photometric metrics
/// (`peak_mag`, `latest_detection`, `latest_nondetection`): a value dated
/// to an MJD-derived instant, grouped per `(filter, survey)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedValue {
    pub filter: String,
    pub value: f64,
    #[serde(with = "crate::time::serde_iso_space")]
    pub date: DateTime<Utc>,
    pub source: String,
    /// Only populated on `latest_detection` entries.
    pub mag_rate: Option<f64>,
}

/// The canonical object-metadata schema. Every field is a list of
/// `{value, source}` entries (or `DatedValue` for the derived metrics);
/// field lists never contain duplicate `(source, value)` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub primary_name: String,
    pub identifiers: Vec<IdentifierEntry>,
    pub ra_deg: Vec<FieldValue<f64>>,
    pub dec_deg: Vec<FieldValue<f64>>,
    pub ra_hms: Vec<FieldValue<String>>,
    pub dec_dms: Vec<FieldValue<String>>,
    pub object_type: Vec<FieldValue<String>>,
    pub discovery_date: Vec<FieldValue<DateTime<Utc>>>,
    pub reporting_date: Vec<FieldValue<DateTime<Utc>>>,
    pub reporting_group: Vec<FieldValue<String>>,
    pub redshift: Vec<FieldValue<f64>>,
    pub host_name: Vec<FieldValue<String>>,
    pub peak_mag: Vec<DatedValue>,
    pub latest_detection: Vec<DatedValue>,
    pub latest_nondetection: Vec<DatedValue>,
}

impl ObjectMetadata {
    /// A fresh canonical schema with every field empty, the starting point
    /// for `build_object`'s merge step.
    #[must_use]
    pub fn empty(primary_name: impl Into<String>) -> Self {
        Self {
            primary_name: primary_name.into(),
            identifiers: Vec::new(),
            ra_deg: Vec::new(),
            dec_deg: Vec::new(),
            ra_hms: Vec::new(),
            dec_dms: Vec::new(),
            object_type: Vec::new(),
            discovery_date: Vec::new(),
            reporting_date: Vec::new(),
            reporting_group: Vec::new(),
            redshift: Vec::new(),
            host_name: Vec::new(),
            peak_mag: Vec::new(),
            latest_detection: Vec::new(),
            latest_nondetection: Vec::new(),
        }
    }

    /// Whether every field is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
            && self.ra_deg.is_empty()
            && self.dec_deg.is_empty()
            && self.ra_hms.is_empty()
            && self.dec_dms.is_empty()
            && self.object_type.is_empty()
            && self.discovery_date.is_empty()
            && self.reporting_date.is_empty()
            && self.reporting_group.is_empty()
            && self.redshift.is_empty()
            && self.host_name.is_empty()
            && self.peak_mag.is_empty()
            && self.latest_detection.is_empty()
            && self.latest_nondetection.is_empty()
    }
}

/// Append `value` to `field` unless an entry with the same `(source,
/// value)` pair is already present, matching the "field lists never
/// contain duplicate source+value pairs" invariant.
pub fn push_unique<T: PartialEq + Clone>(field: &mut Vec<FieldValue<T>>, value: FieldValue<T>) {
    if !field.iter().any(|existing| existing.is_duplicate_of(&value)) {
        field.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_metadata_has_no_fields() {
        assert!(ObjectMetadata::empty("2025abc").is_empty());
    }

    #[test]
    fn push_unique_dedups_source_value_pairs() {
        let mut field = Vec::new();
        push_unique(&mut field, FieldValue { value: "Ia".to_string(), source: "tns".to_string() });
        push_unique(&mut field, FieldValue { value: "Ia".to_string(), source: "tns".to_string() });
        push_unique(&mut field, FieldValue { value: "Ia".to_string(), source: "ztf".to_string() });
        assert_eq!(field.len(), 2);
    }
}
