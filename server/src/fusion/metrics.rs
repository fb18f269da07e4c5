//! Derived photometric metrics grouped by `(filter, survey)`
//! (`spec.md` §4.4 step 5, `SPEC_FULL.md` §4.4b `mag_rate` detail), grounded
//! in `original_source/tarxiv/data_sources.py`'s `append_dynamic_values`.

use std::collections::BTreeMap;

use tarxiv_common::{time::mjd_to_datetime, DatedValue, LightCurveRow};

/// `peak_mag`, `latest_detection` (with `mag_rate`), and
/// `latest_nondetection`, one triple of entries per `(filter, survey)`
/// group present in `rows`.
#[must_use]
pub fn derived_metrics(rows: &[LightCurveRow]) -> (Vec<DatedValue>, Vec<DatedValue>, Vec<DatedValue>) {
    let mut groups: BTreeMap<(String, String), Vec<&LightCurveRow>> = BTreeMap::new();
    for row in rows {
        groups.entry((row.filter.clone(), row.survey.clone())).or_default().push(row);
    }

    let mut peak = Vec::new();
    let mut latest_detection = Vec::new();
    let mut latest_nondetection = Vec::new();

    for ((filter, survey), group) in groups {
        let detections: Vec<&LightCurveRow> = group.iter().copied().filter(|r| r.detection == 1).collect();
        let nondetections: Vec<&LightCurveRow> = group.iter().copied().filter(|r| r.detection == 0).collect();

        if let Some(brightest) = detections
            .iter()
            .filter_map(|r| r.mag.map(|m| (m, r.mjd)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
        {
            peak.push(DatedValue {
                filter: filter.clone(),
                value: brightest.0,
                date: mjd_to_datetime(brightest.1),
                source: survey.clone(),
                mag_rate: None,
            });
        }

        if let Some(latest) = detections.iter().max_by(|a, b| a.mjd.total_cmp(&b.mjd)) {
            let mag_rate = if survey == "atlas" {
                atlas_night_rate(&detections, &nondetections)
            } else {
                non_atlas_rate(&detections, &nondetections)
            };
            if let Some(mag) = latest.mag {
                latest_detection.push(DatedValue {
                    filter: filter.clone(),
                    value: mag,
                    date: mjd_to_datetime(latest.mjd),
                    source: survey.clone(),
                    mag_rate,
                });
            }
        }

        if let Some(latest) = nondetections.iter().max_by(|a, b| a.mjd.total_cmp(&b.mjd)) {
            if let Some(limit) = latest.limit {
                latest_nondetection.push(DatedValue {
                    filter: filter.clone(),
                    value: limit,
                    date: mjd_to_datetime(latest.mjd),
                    source: survey,
                    mag_rate: None,
                });
            }
        }
    }

    (peak, latest_detection, latest_nondetection)
}

/// "Rising from below limit": if a non-detection exists strictly before the
/// earliest detection and its `limit` is fainter than that detection's
/// `mag`, splice it in as a synthetic leading point.
fn rising_point(detections: &[&LightCurveRow], nondetections: &[&LightCurveRow]) -> Option<(f64, f64)> {
    let earliest = detections.iter().min_by(|a, b| a.mjd.total_cmp(&b.mjd))?;
    let earliest_mag = earliest.mag?;
    nondetections
        .iter()
        .filter(|n| n.mjd < earliest.mjd && n.limit.is_some_and(|l| l > earliest_mag))
        .max_by(|a, b| a.mjd.total_cmp(&b.mjd))
        .map(|n| (n.mjd, n.limit.unwrap()))
}

fn non_atlas_rate(detections: &[&LightCurveRow], nondetections: &[&LightCurveRow]) -> Option<f64> {
    let mut points: Vec<(f64, f64)> = Vec::new();
    let mut seen_mjd = std::collections::HashSet::new();
    let mut sorted: Vec<&&LightCurveRow> = detections.iter().collect();
    sorted.sort_by(|a, b| a.mjd.total_cmp(&b.mjd));
    for row in sorted {
        if let Some(mag) = row.mag {
            if seen_mjd.insert(row.mjd.to_bits()) {
                points.push((row.mjd, mag));
            }
        }
    }
    if points.len() < 2 {
        if let Some(rising) = rising_point(detections, nondetections) {
            points.insert(0, rising);
        }
    }
    rate_from_last_two(&points)
}

fn atlas_night_rate(detections: &[&LightCurveRow], nondetections: &[&LightCurveRow]) -> Option<f64> {
    let mut nights: BTreeMap<String, Vec<&LightCurveRow>> = BTreeMap::new();
    for row in detections {
        nights.entry(row.night.clone().unwrap_or_default()).or_default().push(row);
    }
    let mut points: Vec<(f64, f64)> = nights
        .values()
        .filter_map(|rows| {
            let mjd = median(rows.iter().map(|r| r.mjd).collect());
            let mag = median(rows.iter().filter_map(|r| r.mag).collect());
            mag.map(|m| (mjd, m))
        })
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    if points.len() < 2 {
        if let Some(rising) = rising_point(detections, nondetections) {
            points.insert(0, rising);
        }
    }
    rate_from_last_two(&points)
}

fn rate_from_last_two(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let (mjd_prev, mag_prev) = points[points.len() - 2];
    let (mjd_last, mag_last) = points[points.len() - 1];
    let dt = mjd_last - mjd_prev;
    if dt == 0.0 {
        return None;
    }
    Some(-(mag_last - mag_prev) / dt)
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 { (values[mid - 1] + values[mid]) / 2.0 } else { values[mid] })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(mjd: f64, mag: Option<f64>, limit: Option<f64>, detection: u8, filter: &str, survey: &str, night: Option<&str>) -> LightCurveRow {
        LightCurveRow {
            mjd,
            mag,
            mag_err: mag.map(|_| 0.05),
            limit,
            fwhm: None,
            filter: filter.to_string(),
            detection,
            tel_unit: "main".to_string(),
            survey: survey.to_string(),
            night: night.map(str::to_string),
        }
    }

    #[test]
    fn peak_mag_is_the_brightest_detection() {
        let rows = vec![
            row(60000.0, Some(20.1), None, 1, "g", "ztf", None),
            row(60010.0, Some(19.5), None, 1, "g", "ztf", None),
        ];
        let (peak, latest, _) = derived_metrics(&rows);
        assert_eq!(peak.len(), 1);
        assert!((peak[0].value - 19.5).abs() < 1e-9);
        assert!((latest[0].value - 19.5).abs() < 1e-9);
        assert!(latest[0].mag_rate.is_some());
    }

    #[test]
    fn latest_nondetection_takes_the_limit_value() {
        let rows = vec![
            row(60005.0, Some(19.8), None, 1, "o", "atlas", Some("58932")),
            row(60012.0, None, Some(20.5), 0, "o", "atlas", Some("58934")),
        ];
        let (_, _, nondet) = derived_metrics(&rows);
        assert_eq!(nondet.len(), 1);
        assert!((nondet[0].value - 20.5).abs() < 1e-9);
    }

    #[test]
    fn single_detection_has_no_mag_rate() {
        let rows = vec![row(60000.0, Some(20.0), None, 1, "g", "ztf", None)];
        let (_, latest, _) = derived_metrics(&rows);
        assert!(latest[0].mag_rate.is_none());
    }
}
