//! The declination-banded ring-buffer index the spatial matcher probes on
//! every arrival (`SPEC_FULL.md` §4.2 "Redesigned matcher internals").

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tarxiv_common::{geo::quantize_dec, DetectionEvent};

/// Declination bucket width used for partitioning, in quantized
/// (`dec * 1000`) units. One bucket per millidegree band.
const BUCKET_WIDTH: i64 = 1;

pub struct DeclinationIndex {
    buckets: DashMap<i64, Vec<DetectionEvent>>,
    window: Duration,
}

impl DeclinationIndex {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { buckets: DashMap::new(), window }
    }

    /// Bucket keys within `radius_deg` of `dec_key`, inclusive, used to find
    /// every candidate that could plausibly match.
    fn neighbor_keys(dec_key: i64, radius_deg: f64) -> Vec<i64> {
        let span = (radius_deg * 1000.0).ceil() as i64;
        (dec_key - span..=dec_key + span).step_by(BUCKET_WIDTH as usize).collect()
    }

    /// Evict entries older than the window from a single bucket.
    fn evict_stale(&self, key: i64, now: DateTime<Utc>) {
        if let Some(mut bucket) = self.buckets.get_mut(&key) {
            bucket.retain(|event| now.signed_duration_since(event.timestamp) <= self.window);
        }
    }

    /// Return every currently-buffered event within `radius_deg` declination
    /// of `dec_key` that hasn't aged out of the window, after lazily
    /// evicting stale entries from each touched bucket.
    pub fn candidates_near(&self, dec_key: i64, radius_deg: f64, now: DateTime<Utc>) -> Vec<DetectionEvent> {
        let mut out = Vec::new();
        for key in Self::neighbor_keys(dec_key, radius_deg) {
            self.evict_stale(key, now);
            if let Some(bucket) = self.buckets.get(&key) {
                out.extend(bucket.iter().cloned());
            }
        }
        out
    }

    /// Insert a newly-arrived event into its own bucket.
    pub fn insert(&self, event: DetectionEvent) {
        let key = quantize_dec(event.dec_deg);
        self.buckets.entry(key).or_default().push(event);
    }

    /// Total buffered event count across all buckets, for observability.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarxiv_common::Source;

    fn event(id: &str, source: Source, dec: f64, ts: DateTime<Utc>) -> DetectionEvent {
        DetectionEvent { obj_id: id.to_string(), source, ra_deg: 180.0, dec_deg: dec, timestamp: ts }
    }

    #[test]
    fn finds_neighbor_within_radius() {
        let idx = DeclinationIndex::new(Duration::hours(6));
        let now = Utc::now();
        idx.insert(event("ZTF-A", Source::Ztf, 30.0, now));

        let near = idx.candidates_near(quantize_dec(30.001), 0.01, now);
        assert_eq!(near.len(), 1);
    }

    #[test]
    fn evicts_entries_outside_window() {
        let idx = DeclinationIndex::new(Duration::hours(1));
        let old = Utc::now() - Duration::hours(2);
        idx.insert(event("ZTF-A", Source::Ztf, 30.0, old));

        let near = idx.candidates_near(quantize_dec(30.0), 0.01, Utc::now());
        assert!(near.is_empty());
    }
}
