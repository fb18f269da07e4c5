//! Spatial Stream Matcher (`SPEC_FULL.md` §4.2).

mod index;

pub use index::DeclinationIndex;

use chrono::{Duration, Utc};
use tarxiv_common::{
    geo::{angular_distance_arcsec, quantize_dec},
    DetectionEvent, MatchCandidate,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Configuration for the matcher's windowing and join predicate.
#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    pub window_hours: f64,
    pub radius_arcsec: f64,
}

pub struct SpatialMatcher {
    index: DeclinationIndex,
    config: MatcherConfig,
}

impl SpatialMatcher {
    #[must_use]
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            index: DeclinationIndex::new(Duration::milliseconds((config.window_hours * 3_600_000.0) as i64)),
            config,
        }
    }

    /// Apply the full join predicate (`SPEC_FULL.md` §4.2 items 1-4) to a
    /// newly-arrived event against the buffered index, returning every
    /// candidate pair produced, then insert the event into the index.
    pub fn on_arrival(&self, event: DetectionEvent) -> Vec<MatchCandidate> {
        let now = Utc::now();
        let radius_deg = self.config.radius_arcsec / 3600.0;
        let dec_key = quantize_dec(event.dec_deg);

        let candidates = self.index.candidates_near(dec_key, radius_deg, now);

        let mut out = Vec::new();
        for other in &candidates {
            if quantize_dec(other.dec_deg) != quantize_dec(event.dec_deg) {
                continue;
            }
            let distance = angular_distance_arcsec(event.ra_deg, event.dec_deg, other.ra_deg, other.dec_deg);
            if distance > self.config.radius_arcsec {
                continue;
            }
            if let Some(candidate) = MatchCandidate::from_ordered_pair(&event, other) {
                out.push(candidate);
            }
        }

        self.index.insert(event);
        out
    }

    #[must_use]
    pub fn buffered_event_count(&self) -> usize {
        self.index.len()
    }
}

/// Run the matcher's consume loop: read `DetectionEvent`s from `events`,
/// apply the join predicate, and forward every `MatchCandidate` produced to
/// `sink`. Exits once `events` closes or `token` is cancelled, flushing
/// whatever is already queued on `events` before returning
/// (`SPEC_FULL.md` §5 "Cancellation and shutdown").
pub async fn run(
    config: MatcherConfig,
    mut events: mpsc::Receiver<DetectionEvent>,
    sink: mpsc::Sender<MatchCandidate>,
    token: CancellationToken,
) {
    let matcher = SpatialMatcher::new(config);
    info!(status = "spatial_matcher_started", window_hours = config.window_hours, radius_arcsec = config.radius_arcsec, "spatial matcher started");

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                events.close();
                while let Some(event) = events.recv().await {
                    for candidate in matcher.on_arrival(event) {
                        if sink.send(candidate).await.is_err() {
                            break;
                        }
                    }
                }
                break;
            }
            maybe_event = events.recv() => {
                match maybe_event {
                    Some(event) => {
                        for candidate in matcher.on_arrival(event) {
                            if sink.send(candidate).await.is_err() {
                                debug!(status = "candidate_sink_closed", "match candidate sink closed, dropping candidate");
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    info!(status = "spatial_matcher_stopped", buffered = matcher.buffered_event_count(), "spatial matcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarxiv_common::Source;

    fn event(id: &str, source: Source, ra: f64, dec: f64) -> DetectionEvent {
        DetectionEvent { obj_id: id.to_string(), source, ra_deg: ra, dec_deg: dec, timestamp: Utc::now() }
    }

    fn matcher() -> SpatialMatcher {
        SpatialMatcher::new(MatcherConfig { window_hours: 6.0, radius_arcsec: 5.0 })
    }

    #[test]
    fn s1_first_cross_match_produces_one_candidate() {
        let m = matcher();
        assert!(m.on_arrival(event("ZTF-A", Source::Ztf, 180.0, 30.0)).is_empty());
        let candidates = m.on_arrival(event("LSST-B", Source::Lsst, 180.0001, 30.00005));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].obj_id_1, "LSST-B");
        assert_eq!(candidates[0].obj_id_2, "ZTF-A");
    }

    #[test]
    fn s3_same_source_never_matches() {
        let m = matcher();
        assert!(m.on_arrival(event("ZTF-A", Source::Ztf, 180.0, 30.0)).is_empty());
        assert!(m.on_arrival(event("ZTF-B", Source::Ztf, 180.0, 30.0)).is_empty());
    }

    #[test]
    fn s4_non_match_by_radius() {
        let m = matcher();
        assert!(m.on_arrival(event("ZTF-A", Source::Ztf, 180.0, 30.0)).is_empty());
        // ~52 arcsec offset, beyond the 5 arcsec radius.
        assert!(m.on_arrival(event("LSST-B", Source::Lsst, 180.01, 30.01)).is_empty());
    }
}
