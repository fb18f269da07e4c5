//! Photometric light-curve rows.

use serde::{Deserialize, Serialize};

/// One photometric measurement. `mag`/`mag_err` are populated iff
/// `detection == 1`; otherwise `limit` is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurveRow {
    pub mjd: f64,
    pub mag: Option<f64>,
    pub mag_err: Option<f64>,
    pub limit: Option<f64>,
    pub fwhm: Option<f64>,
    pub filter: String,
    pub detection: u8,
    pub tel_unit: String,
    pub survey: String,
    /// ATLAS-only nightly grouping key derived from the exposure name;
    /// `None` for all other surveys.
    pub night: Option<String>,
}

impl LightCurveRow {
    #[must_use]
    pub const fn is_detection(&self) -> bool {
        self.detection == 1
    }
}

/// A time-ordered set of rows for one object, concatenated across every
/// contributing survey.
pub type LightCurve = Vec<LightCurveRow>;
