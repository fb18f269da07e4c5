//! End-to-end scenario tests against `MockStore`/`TestAdapter`, covering the
//! cases not already exercised by `matcher`'s own unit tests (S1, S3, S4).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tarxiv_common::{Alert, CitationSource, LightCurveRow, MatchCandidate, Source};
use tarxiv_pipeline::fusion::{Fusion, FusionWindow};
use tarxiv_pipeline::reconciler::Reconciler;
use tarxiv_pipeline::report::ReportMode;
use tarxiv_pipeline::sources::{FetchOutcome, SourceAdapter, SurveyMeta, TestAdapter};
use tarxiv_pipeline::store::MockStore;

fn citations() -> HashMap<Source, CitationSource> {
    let entry = |name: &str, alias: &str| CitationSource {
        name: name.to_string(),
        bibcode: "2020xxxx".to_string(),
        reference: "https://example.invalid".to_string(),
        alias: alias.to_string(),
    };
    HashMap::from([
        (Source::Ztf, entry("ZTF", "ztf")),
        (Source::Lsst, entry("LSST", "lsst")),
        (Source::Atlas, entry("ATLAS", "atlas")),
    ])
}

fn candidate(obj_id_1: &str, source_1: Source, obj_id_2: &str, source_2: Source) -> MatchCandidate {
    let now = Utc::now();
    MatchCandidate {
        obj_id_1: obj_id_1.to_string(),
        source_1,
        ra_deg_1: 180.0,
        dec_deg_1: 30.0,
        timestamp_1: now,
        obj_id_2: obj_id_2.to_string(),
        source_2,
        ra_deg_2: 180.0001,
        dec_deg_2: 30.0001,
        timestamp_2: now,
    }
}

fn alert_for(candidate: &MatchCandidate, which: u8) -> Alert {
    if which == 1 {
        Alert {
            obj_id: candidate.obj_id_1.clone(),
            source: candidate.source_1,
            raw: serde_json::json!({"ra_deg": candidate.ra_deg_1, "dec_deg": candidate.dec_deg_1}),
        }
    } else {
        Alert {
            obj_id: candidate.obj_id_2.clone(),
            source: candidate.source_2,
            raw: serde_json::json!({"ra_deg": candidate.ra_deg_2, "dec_deg": candidate.dec_deg_2}),
        }
    }
}

/// S2: a second survey's candidate extends an already-minted hit rather
/// than minting a new one.
#[tokio::test]
async fn s2_extends_an_existing_hit() {
    let store = Arc::new(MockStore::new());
    let reconciler = Reconciler::new(Arc::clone(&store), 6, citations(), ReportMode::default(), None);

    let first = candidate("ZTF-A", Source::Ztf, "LSST-B", Source::Lsst);
    let outcome = reconciler.reconcile(&first, alert_for(&first, 1), alert_for(&first, 2)).await.unwrap();
    let xmatch_id = outcome.hit.xmatch_id.clone();
    assert_eq!(outcome.hit.identifiers.len(), 2);

    let second = candidate("ZTF-A", Source::Ztf, "ATLAS-C", Source::Atlas);
    let outcome = reconciler.reconcile(&second, alert_for(&second, 1), alert_for(&second, 2)).await.unwrap();

    assert_eq!(outcome.hit.xmatch_id, xmatch_id, "the second candidate should extend, not replace, the first hit");
    assert_eq!(outcome.hit.identifiers.len(), 3);
    assert!(outcome.hit.identifiers.iter().any(|i| i.name == "ATLAS-C"));
    assert_eq!(store.hit_count(), 1, "exactly one hit should exist, not two");
}

/// S5: a candidate whose two identifiers already both belong to the same
/// hit is a benign duplicate, not a second hit and not a hard error.
#[tokio::test]
async fn s5_duplicate_candidate_is_a_benign_no_op() {
    let store = Arc::new(MockStore::new());
    let reconciler = Reconciler::new(Arc::clone(&store), 6, citations(), ReportMode::default(), None);

    let first = candidate("ZTF-A", Source::Ztf, "LSST-B", Source::Lsst);
    reconciler.reconcile(&first, alert_for(&first, 1), alert_for(&first, 2)).await.unwrap();

    let repeat = candidate("ZTF-A", Source::Ztf, "LSST-B", Source::Lsst);
    let result = reconciler.reconcile(&repeat, alert_for(&repeat, 1), alert_for(&repeat, 2)).await;

    assert!(matches!(result, Err(tarxiv_pipeline::error::PipelineError::DuplicateCrossMatch { .. })));
    assert_eq!(store.hit_count(), 1, "a duplicate candidate must not mint a second hit");
}

fn row(mjd: f64, mag: f64, survey: &str) -> LightCurveRow {
    LightCurveRow {
        mjd,
        mag: Some(mag),
        mag_err: Some(0.05),
        limit: None,
        fwhm: None,
        filter: "g".to_string(),
        detection: 1,
        tel_unit: "main".to_string(),
        survey: survey.to_string(),
        night: None,
    }
}

/// S6: fusing an anchor (TNS) object with one secondary survey merges
/// metadata and concatenates photometry into a single light curve.
#[tokio::test]
async fn s6_fuses_anchor_and_secondary_photometry() {
    let store = Arc::new(MockStore::new());

    let discovery = Utc::now() - chrono::Duration::days(30);
    let anchor_meta = SurveyMeta {
        ra_deg: Some(tarxiv_common::FieldValue { value: 180.0, source: "tns".to_string() }),
        dec_deg: Some(tarxiv_common::FieldValue { value: 30.0, source: "tns".to_string() }),
        discovery_date: Some(tarxiv_common::FieldValue { value: discovery, source: "tns".to_string() }),
        ..SurveyMeta::default()
    };
    let anchor = Arc::new(
        TestAdapter::new(Source::Tns).with_fixture("2025test", FetchOutcome::MetaOnly(anchor_meta)),
    ) as Arc<dyn SourceAdapter>;

    let secondary_rows = vec![
        row(tarxiv_common::time::datetime_to_mjd(discovery + chrono::Duration::days(1)), 19.8, "ztf"),
        row(tarxiv_common::time::datetime_to_mjd(discovery + chrono::Duration::days(5)), 19.2, "ztf"),
    ];
    let secondary = Arc::new(
        TestAdapter::new(Source::Ztf)
            .with_fixture("2025test", FetchOutcome::Full(SurveyMeta::default(), secondary_rows)),
    ) as Arc<dyn SourceAdapter>;

    let window = FusionWindow { prior_days: 7, active_days: 90 };
    let fusion = Fusion::new(store, anchor, vec![secondary], window, 5.0, None, ReportMode::default(), None);

    let (meta, lightcurve, summary) = fusion.build_object("2025test").await.unwrap().expect("anchor has a match");

    assert_eq!(meta.primary_name, "2025test");
    assert_eq!(lightcurve.len(), 2, "both ZTF rows fall inside the discovery window");
    assert!(!meta.peak_mag.is_empty(), "derived metrics should populate peak_mag from the fused light curve");
    assert!(summary.is_substantive(), "a brand new object should always produce a substantive change");
}

/// S6 variant: an object with no anchor match fuses to nothing.
#[tokio::test]
async fn s6_no_anchor_match_yields_none() {
    let store = Arc::new(MockStore::new());
    let anchor = Arc::new(TestAdapter::new(Source::Tns)) as Arc<dyn SourceAdapter>;
    let window = FusionWindow { prior_days: 7, active_days: 90 };
    let fusion = Fusion::new(store, anchor, Vec::new(), window, 5.0, None, ReportMode::default(), None);

    let result = fusion.build_object("unknown-object").await.unwrap();
    assert!(result.is_none());
}
