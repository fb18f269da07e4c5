//! MJD <-> UTC instant conversion and the pipeline's ISO-8601 rendering.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

/// `chrono`'s proleptic-Gregorian day ordinal (`num_days_from_ce`, 1-based at
/// 0001-01-01) minus this offset gives the Modified Julian Date at 0h UT of
/// that calendar day. Derived from the fixed relation `MJD = JD - 2400000.5`
/// and `JD(0001-01-01, 0h) = 1721425.5`.
const MJD_ORDINAL_OFFSET: f64 = 678_576.0;

/// Convert a Modified Julian Date to a UTC instant.
#[must_use]
pub fn mjd_to_datetime(mjd: f64) -> DateTime<Utc> {
    let day_mjd = mjd.floor();
    let frac_day = mjd - day_mjd;
    let ordinal = (day_mjd + MJD_ORDINAL_OFFSET) as i32;
    let date = NaiveDate::from_num_days_from_ce_opt(ordinal)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
    let millis_in_day = (frac_day * 86_400_000.0).round() as i64;
    let time = date.and_hms_opt(0, 0, 0).unwrap() + chrono::Duration::milliseconds(millis_in_day);
    Utc.from_utc_datetime(&time)
}

/// Convert a UTC instant to a Modified Julian Date.
#[must_use]
pub fn datetime_to_mjd(dt: DateTime<Utc>) -> f64 {
    let naive = dt.naive_utc();
    let ordinal = f64::from(naive.date().num_days_from_ce());
    let seconds_since_midnight =
        f64::from(naive.time().num_seconds_from_midnight()) + f64::from(naive.time().nanosecond()) / 1e9;
    (ordinal - MJD_ORDINAL_OFFSET) + seconds_since_midnight / 86_400.0
}

/// Render a UTC instant as `"YYYY-MM-DD HH:MM:SS"`, matching the pipeline's
/// single-space ISO-8601 rendering for `updated_at` and derived-metric dates.
#[must_use]
pub fn format_iso_space(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// `serde(with = "time::serde_iso_space")` for `DateTime<Utc>` fields that
/// spec.md §4.3/§4.4 mandate render as `"YYYY-MM-DD HH:MM:SS"` on the wire
/// and in the persisted store, rather than chrono's default RFC3339.
pub mod serde_iso_space {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    use super::format_iso_space;

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_iso_space(*dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S").map_err(D::Error::custom)?;
        Ok(Utc.from_utc_datetime(&naive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[test]
    fn mjd_roundtrip() {
        let dt = Utc.from_utc_datetime(
            &NaiveDateTime::parse_from_str("2023-02-25 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
        );
        let mjd = datetime_to_mjd(dt);
        let back = mjd_to_datetime(mjd);
        assert!((back - dt).num_seconds().abs() <= 1);
    }

    #[test]
    fn known_mjd_epoch() {
        // MJD 60000 at 0h UT is 2023-02-25.
        let dt = mjd_to_datetime(60000.0);
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2023-02-25");
    }

    #[test]
    fn iso_space_format() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_iso_space(dt), "2025-01-02 03:04:05");
    }

    #[test]
    fn serde_iso_space_roundtrips_through_json() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper(#[serde(with = "serde_iso_space")] DateTime<Utc>);

        let dt = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let json = serde_json::to_string(&Wrapper(dt)).unwrap();
        assert_eq!(json, "\"2025-01-02 03:04:05\"");

        let Wrapper(back) = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dt);
    }
}
