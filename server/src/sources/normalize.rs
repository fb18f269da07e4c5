//! Light-curve normalization rules every adapter applies before returning a
//! frame from its pull contract (`spec.md` §4.1).

use tarxiv_common::LightCurveRow;

/// Magnitudes reported negative with `abs(value) > 10` are sign-flip
/// artifacts from upstream parsers; replace with the absolute value.
#[must_use]
pub fn fix_sign_flip(mag: f64) -> f64 {
    if mag < 0.0 && mag.abs() > 10.0 {
        mag.abs()
    } else {
        mag
    }
}

/// `detection` is derived, not trusted from upstream: 1 iff both a finite
/// magnitude and a finite magnitude error are present, 0 if only a limit
/// exists.
#[must_use]
pub fn derive_detection(mag: Option<f64>, mag_err: Option<f64>) -> u8 {
    u8::from(mag.is_some_and(f64::is_finite) && mag_err.is_some_and(f64::is_finite))
}

/// Apply the sign-flip fix to every detection row's magnitude in place.
pub fn normalize_rows(rows: &mut [LightCurveRow]) {
    for row in rows {
        if let Some(mag) = row.mag {
            row.mag = Some(fix_sign_flip(mag));
        }
    }
}

/// ATLAS exposure names encode the telescope unit (first 3 chars) and the
/// observation night (next 5 chars), e.g. `02a58932o0512c` -> unit `02a`,
/// night `58932`.
#[must_use]
pub fn atlas_unit_and_night(expname: &str) -> (String, String) {
    let unit = expname.get(0..3).unwrap_or_default().to_string();
    let night = expname.get(3..8).unwrap_or_default().to_string();
    (unit, night)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_flip_corrects_large_negative_magnitudes() {
        assert!((fix_sign_flip(-18.5) - 18.5).abs() < 1e-9);
        assert!((fix_sign_flip(-2.0) - -2.0).abs() < 1e-9);
        assert!((fix_sign_flip(18.5) - 18.5).abs() < 1e-9);
    }

    #[test]
    fn detection_requires_both_mag_and_err() {
        assert_eq!(derive_detection(Some(18.0), Some(0.1)), 1);
        assert_eq!(derive_detection(None, None), 0);
        assert_eq!(derive_detection(Some(18.0), None), 0);
    }

    #[test]
    fn atlas_exposure_name_splits_unit_and_night() {
        let (unit, night) = atlas_unit_and_night("02a58932o0512c");
        assert_eq!(unit, "02a");
        assert_eq!(night, "58932");
    }
}
