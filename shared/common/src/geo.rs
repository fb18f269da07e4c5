//! Angular geometry: great-circle distance and sexagesimal formatting.

use crate::error::{Error, Result};

/// Great-circle angular distance between two RA/Dec points, in arcseconds.
///
/// Uses the spherical law of cosines, matching the join predicate's formula:
/// `d = arccos(sin d1 sin d2 + cos d1 cos d2 cos(a1 - a2))`.
#[must_use]
pub fn angular_distance_arcsec(ra1_deg: f64, dec1_deg: f64, ra2_deg: f64, dec2_deg: f64) -> f64 {
    let d1 = dec1_deg.to_radians();
    let d2 = dec2_deg.to_radians();
    let da = (ra1_deg - ra2_deg).to_radians();

    let cos_d = d1.sin().mul_add(d2.sin(), d1.cos() * d2.cos() * da.cos());
    // Clamp for float noise near identical coordinates (cos_d slightly > 1).
    cos_d.clamp(-1.0, 1.0).acos().to_degrees() * 3600.0
}

/// Declination quantized to 3 decimal places, matching the matcher's
/// fast pre-filter (`CAST(dec_deg AS DECIMAL(10,3))` in the original join).
#[must_use]
pub fn quantize_dec(dec_deg: f64) -> i64 {
    (dec_deg * 1000.0).round() as i64
}

/// Convert RA/Dec in degrees to sexagesimal `(ra_hms, dec_dms)` strings,
/// colon-separated, matching `astropy`'s `to_string("hmsdms", sep=":")`.
///
/// # Errors
/// Returns an error if `dec_deg` is outside `[-90, 90]` or `ra_deg` is
/// outside `[0, 360)`.
pub fn deg2sex(ra_deg: f64, dec_deg: f64) -> Result<(String, String)> {
    if !(-90.0..=90.0).contains(&dec_deg) {
        return Err(Error::InvalidDeclination(dec_deg));
    }
    if !(0.0..360.0).contains(&ra_deg) {
        return Err(Error::InvalidRightAscension(ra_deg));
    }

    let ra_hours = ra_deg / 15.0;
    let ra_h = ra_hours.trunc();
    let ra_m_full = (ra_hours - ra_h) * 60.0;
    let ra_m = ra_m_full.trunc();
    let ra_s = (ra_m_full - ra_m) * 60.0;
    let ra_hms = format!("{:02}:{:02}:{:05.2}", ra_h as i64, ra_m as i64, ra_s);

    let sign = if dec_deg < 0.0 { "-" } else { "+" };
    let dec_abs = dec_deg.abs();
    let dec_d = dec_abs.trunc();
    let dec_m_full = (dec_abs - dec_d) * 60.0;
    let dec_m = dec_m_full.trunc();
    let dec_s = (dec_m_full - dec_m) * 60.0;
    let dec_dms = format!("{sign}{:02}:{:02}:{:05.2}", dec_d as i64, dec_m as i64, dec_s);

    Ok((ra_hms, dec_dms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric() {
        let a = angular_distance_arcsec(180.0, 30.0, 180.0001, 30.00005);
        let b = angular_distance_arcsec(180.0001, 30.00005, 180.0, 30.0);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn distance_zero_for_identical_points() {
        let d = angular_distance_arcsec(10.0, -5.0, 10.0, -5.0);
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn distance_matches_known_offset() {
        // 0.01 deg offset in dec only is 36 arcsec.
        let d = angular_distance_arcsec(180.0, 30.0, 180.0, 30.01);
        assert!((d - 36.0).abs() < 1e-3);
    }

    #[test]
    fn quantize_rounds_to_millidegree() {
        assert_eq!(quantize_dec(29.99998), 30000);
        assert_eq!(quantize_dec(30.00005), 30000);
    }

    #[test]
    fn deg2sex_known_value() {
        let (ra, dec) = deg2sex(180.0, 30.0).unwrap();
        assert_eq!(ra, "12:00:00.00");
        assert_eq!(dec, "+30:00:00.00");
    }

    #[test]
    fn deg2sex_rejects_out_of_range_dec() {
        assert!(deg2sex(10.0, 91.0).is_err());
    }
}
