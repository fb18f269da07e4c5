//! Explicit field-wise `ChangeSummary` diff (`SPEC_FULL.md` §4.4a): no
//! generic reflection/diff library, restricted to
//! `{identifiers, object_type, host_name, redshift, latest_detection}`.

use std::collections::BTreeMap;

use chrono::Utc;
use tarxiv_common::{ChangeEntry, ChangeSummary, DatedValue, FieldValue, IdentifierEntry, NoticeStatus, ObjectMetadata};

/// Diff `fresh` against `prior` (`None` when no document existed yet),
/// restricted to the five fields the spec names.
#[must_use]
pub fn diff_object(prior: Option<&ObjectMetadata>, fresh: &ObjectMetadata) -> ChangeSummary {
    let mut changes = BTreeMap::new();

    diff_identifiers(prior.map(|p| p.identifiers.as_slice()).unwrap_or_default(), &fresh.identifiers, &mut changes);
    diff_field_values("object_type", prior.map(|p| p.object_type.as_slice()).unwrap_or_default(), &fresh.object_type, &mut changes);
    diff_field_values("host_name", prior.map(|p| p.host_name.as_slice()).unwrap_or_default(), &fresh.host_name, &mut changes);
    diff_field_values("redshift", prior.map(|p| p.redshift.as_slice()).unwrap_or_default(), &fresh.redshift, &mut changes);
    diff_latest_detection(prior.map(|p| p.latest_detection.as_slice()).unwrap_or_default(), &fresh.latest_detection, &mut changes);

    ChangeSummary { status: if prior.is_some() { NoticeStatus::UpdatedEntry } else { NoticeStatus::NewEntry }, changes, timestamp: Utc::now() }
}

fn diff_identifiers(prior: &[IdentifierEntry], fresh: &[IdentifierEntry], changes: &mut BTreeMap<String, ChangeEntry>) {
    for ident in fresh {
        let key = format!("identifiers.{}", ident.name);
        match prior.iter().find(|p| p.name == ident.name) {
            None => {
                changes.insert(key, ChangeEntry::Added { value: serde_json::json!(ident.source.as_str()) });
            }
            Some(old) if old.source != ident.source => {
                changes.insert(
                    key,
                    ChangeEntry::Changed {
                        old: serde_json::json!(old.source.as_str()),
                        new: serde_json::json!(ident.source.as_str()),
                    },
                );
            }
            Some(_) => {}
        }
    }
    for ident in prior {
        if !fresh.iter().any(|f| f.name == ident.name) {
            changes.insert(
                format!("identifiers.{}", ident.name),
                ChangeEntry::Removed { value: serde_json::json!(ident.source.as_str()) },
            );
        }
    }
}

fn diff_field_values<T>(field: &str, prior: &[FieldValue<T>], fresh: &[FieldValue<T>], changes: &mut BTreeMap<String, ChangeEntry>)
where
    T: PartialEq + serde::Serialize,
{
    for entry in fresh {
        let key = format!("{field}.{}", entry.source);
        match prior.iter().find(|p| p.source == entry.source) {
            None => {
                changes.insert(key, ChangeEntry::Added { value: serde_json::json!(entry.value) });
            }
            Some(old) if old.value != entry.value => {
                changes.insert(key, ChangeEntry::Changed { old: serde_json::json!(old.value), new: serde_json::json!(entry.value) });
            }
            Some(_) => {}
        }
    }
    for entry in prior {
        if !fresh.iter().any(|f| f.source == entry.source) {
            changes.insert(format!("{field}.{}", entry.source), ChangeEntry::Removed { value: serde_json::json!(entry.value) });
        }
    }
}

fn diff_latest_detection(prior: &[DatedValue], fresh: &[DatedValue], changes: &mut BTreeMap<String, ChangeEntry>) {
    for entry in fresh {
        let key = format!("latest_detection.{}.{}", entry.filter, entry.source);
        match prior.iter().find(|p| p.filter == entry.filter && p.source == entry.source) {
            None => {
                changes.insert(key, ChangeEntry::Added { value: serde_json::json!(entry) });
            }
            Some(old)
                if (old.value - entry.value).abs() > f64::EPSILON
                    || old.date != entry.date
                    || old.mag_rate != entry.mag_rate =>
            {
                changes.insert(key, ChangeEntry::Changed { old: serde_json::json!(old), new: serde_json::json!(entry) });
            }
            Some(_) => {}
        }
    }
    for entry in prior {
        if !fresh.iter().any(|f| f.filter == entry.filter && f.source == entry.source) {
            changes.insert(format!("latest_detection.{}.{}", entry.filter, entry.source), ChangeEntry::Removed { value: serde_json::json!(entry) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarxiv_common::Source;

    #[test]
    fn no_prior_document_is_new_entry_with_full_additions() {
        let mut fresh = ObjectMetadata::empty("2025abc");
        fresh.identifiers.push(IdentifierEntry { name: "ZTF-A".into(), source: Source::Ztf });
        let summary = diff_object(None, &fresh);
        assert_eq!(summary.status, NoticeStatus::NewEntry);
        assert!(summary.changes.contains_key("identifiers.ZTF-A"));
    }

    #[test]
    fn unchanged_fields_produce_no_entries() {
        let mut meta = ObjectMetadata::empty("2025abc");
        meta.redshift.push(FieldValue { value: 0.05, source: "tns".into() });
        let summary = diff_object(Some(&meta), &meta);
        assert_eq!(summary.status, NoticeStatus::UpdatedEntry);
        assert!(!summary.is_substantive());
    }

    #[test]
    fn changed_redshift_value_is_reported() {
        let mut prior = ObjectMetadata::empty("2025abc");
        prior.redshift.push(FieldValue { value: 0.05, source: "tns".into() });
        let mut fresh = prior.clone();
        fresh.redshift[0].value = 0.06;
        let summary = diff_object(Some(&prior), &fresh);
        assert!(matches!(summary.changes.get("redshift.tns"), Some(ChangeEntry::Changed { .. })));
    }
}
