//! Match Reconciler (`SPEC_FULL.md` §4.3).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Datelike;
use tarxiv_common::{
    geo::deg2sex, Alert, CitationSource, ChangeNotice, CoordEntry, CrossMatchHit, IdentifierEntry,
    MatchCandidate, NoticeStatus, NoticeTopic, Source, TimestampEntry,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::{CandidateConsumer, CommitToken};
use crate::error::PipelineError;
use crate::report::{LogstashSink, ReportMode, StatusEvent};
use crate::store::{CatalogStore, HitExtension, NewHitInput};

/// The outcome of reconciling one `MatchCandidate` against the store.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub hit: CrossMatchHit,
    pub status: NoticeStatus,
}

pub struct Reconciler<S: CatalogStore> {
    store: Arc<S>,
    id_width: usize,
    citations: HashMap<Source, CitationSource>,
    report_mode: ReportMode,
    logstash: Option<Arc<LogstashSink>>,
}

impl<S: CatalogStore> Reconciler<S> {
    #[must_use]
    pub fn new(
        store: Arc<S>,
        id_width: usize,
        citations: HashMap<Source, CitationSource>,
        report_mode: ReportMode,
        logstash: Option<Arc<LogstashSink>>,
    ) -> Self {
        Self { store, id_width, citations, report_mode, logstash }
    }

    fn citation_for(&self, source: Source) -> CitationSource {
        self.citations.get(&source).cloned().unwrap_or_else(|| CitationSource {
            name: source.as_str().to_string(),
            bibcode: String::new(),
            reference: String::new(),
            alias: source.as_str().to_string(),
        })
    }

    /// Reconcile one candidate: find or create its hit, extend it with the
    /// missing side, or reject it as a duplicate (`SPEC_FULL.md` §4.3 step 2).
    pub async fn reconcile(
        &self,
        candidate: &MatchCandidate,
        alert_1: Alert,
        alert_2: Alert,
    ) -> Result<ReconcileOutcome, PipelineError> {
        let (ra_hms_1, dec_dms_1) =
            deg2sex(candidate.ra_deg_1, candidate.dec_deg_1).map_err(|e| PipelineError::FatalInit(e.into()))?;
        let (ra_hms_2, dec_dms_2) =
            deg2sex(candidate.ra_deg_2, candidate.dec_deg_2).map_err(|e| PipelineError::FatalInit(e.into()))?;

        let existing = self
            .store
            .find_hits_by_identifiers(&[candidate.obj_id_1.as_str(), candidate.obj_id_2.as_str()])
            .await?;

        match existing.len() {
            0 => self.new_hit(candidate, &ra_hms_1, &dec_dms_1, &ra_hms_2, &dec_dms_2, alert_1, alert_2).await,
            1 => self.extend(candidate, &existing[0], &ra_hms_1, &dec_dms_1, &ra_hms_2, &dec_dms_2, alert_1, alert_2).await,
            _ => {
                let colliding_ids: Vec<String> = existing.iter().map(|h| h.xmatch_id.clone()).collect();
                StatusEvent::new("xmatch_collision")
                    .details(format!(
                        "obj_id_1={} obj_id_2={} colliding_ids={colliding_ids:?}",
                        candidate.obj_id_1, candidate.obj_id_2
                    ))
                    .emit_warn(self.report_mode, self.logstash.as_deref());
                self.extend(candidate, &existing[0], &ra_hms_1, &dec_dms_1, &ra_hms_2, &dec_dms_2, alert_1, alert_2).await
            }
        }
    }

    async fn new_hit(
        &self,
        candidate: &MatchCandidate,
        ra_hms_1: &str,
        dec_dms_1: &str,
        ra_hms_2: &str,
        dec_dms_2: &str,
        alert_1: Alert,
        alert_2: Alert,
    ) -> Result<ReconcileOutcome, PipelineError> {
        let mut sources = vec![self.citation_for(candidate.source_1)];
        let citation_2 = self.citation_for(candidate.source_2);
        if citation_2.alias != sources[0].alias {
            sources.push(citation_2);
        }

        let input = NewHitInput {
            identifiers: vec![
                IdentifierEntry { name: candidate.obj_id_1.clone(), source: candidate.source_1 },
                IdentifierEntry { name: candidate.obj_id_2.clone(), source: candidate.source_2 },
            ],
            coords: vec![
                CoordEntry {
                    ra_deg: candidate.ra_deg_1,
                    dec_deg: candidate.dec_deg_1,
                    ra_hms: ra_hms_1.to_string(),
                    dec_dms: dec_dms_1.to_string(),
                    source: candidate.source_1,
                },
                CoordEntry {
                    ra_deg: candidate.ra_deg_2,
                    dec_deg: candidate.dec_deg_2,
                    ra_hms: ra_hms_2.to_string(),
                    dec_dms: dec_dms_2.to_string(),
                    source: candidate.source_2,
                },
            ],
            timestamps: vec![
                TimestampEntry { value: candidate.timestamp_1, source: candidate.source_1 },
                TimestampEntry { value: candidate.timestamp_2, source: candidate.source_2 },
            ],
            sources,
        };

        let year = candidate.timestamp_1.year();
        let hit = self.store.mint_new_hit(year, self.id_width, input).await?;

        self.store.insert_alert(&alert_1).await?;
        self.store.insert_alert(&alert_2).await?;

        StatusEvent::new("new_cross_match_hit")
            .xmatch_id(hit.xmatch_id.clone())
            .emit_info(self.report_mode, self.logstash.as_deref());
        Ok(ReconcileOutcome { hit, status: NoticeStatus::NewEntry })
    }

    #[allow(clippy::too_many_arguments)]
    async fn extend(
        &self,
        candidate: &MatchCandidate,
        existing: &CrossMatchHit,
        ra_hms_1: &str,
        dec_dms_1: &str,
        ra_hms_2: &str,
        dec_dms_2: &str,
        alert_1: Alert,
        alert_2: Alert,
    ) -> Result<ReconcileOutcome, PipelineError> {
        let missing =
            existing.missing_identifiers(&[candidate.obj_id_1.as_str(), candidate.obj_id_2.as_str()]);

        if missing.is_empty() {
            return Err(PipelineError::DuplicateCrossMatch {
                obj_id_1: candidate.obj_id_1.clone(),
                obj_id_2: candidate.obj_id_2.clone(),
                existing_xmatch_id: existing.xmatch_id.clone(),
            });
        }

        let new_id = missing[0];
        let (identifier, coord, timestamp, citation, alert) = if new_id == candidate.obj_id_1 {
            (
                IdentifierEntry { name: candidate.obj_id_1.clone(), source: candidate.source_1 },
                CoordEntry {
                    ra_deg: candidate.ra_deg_1,
                    dec_deg: candidate.dec_deg_1,
                    ra_hms: ra_hms_1.to_string(),
                    dec_dms: dec_dms_1.to_string(),
                    source: candidate.source_1,
                },
                TimestampEntry { value: candidate.timestamp_1, source: candidate.source_1 },
                self.citation_for(candidate.source_1),
                alert_1,
            )
        } else {
            (
                IdentifierEntry { name: candidate.obj_id_2.clone(), source: candidate.source_2 },
                CoordEntry {
                    ra_deg: candidate.ra_deg_2,
                    dec_deg: candidate.dec_deg_2,
                    ra_hms: ra_hms_2.to_string(),
                    dec_dms: dec_dms_2.to_string(),
                    source: candidate.source_2,
                },
                TimestampEntry { value: candidate.timestamp_2, source: candidate.source_2 },
                self.citation_for(candidate.source_2),
                alert_2,
            )
        };

        let hit = self
            .store
            .extend_hit(&existing.xmatch_id, HitExtension { identifier, coord, timestamp, citation })
            .await?;
        self.store.insert_alert(&alert).await?;

        StatusEvent::new("cross_match_hit_extended")
            .xmatch_id(hit.xmatch_id.clone())
            .details(format!("new_identifier={new_id}"))
            .emit_info(self.report_mode, self.logstash.as_deref());
        Ok(ReconcileOutcome { hit, status: NoticeStatus::UpdatedEntry })
    }
}

/// One message the reconciler's consume loop processes: a candidate, both
/// sides' fully-fetched raw alerts, and the `spark-sink` offset to commit
/// once this job's transaction has actually completed.
pub struct ReconcileJob {
    pub candidate: MatchCandidate,
    pub alert_1: Alert,
    pub alert_2: Alert,
    pub commit: CommitToken,
}

/// Run a reconciler worker: consume `jobs`, reconcile each against the
/// store, publish a `ChangeNotice` for every successful outcome, and commit
/// the job's `spark-sink` offset only once that transaction has reached a
/// terminal outcome — success, benign duplicate, or logged error
/// (`SPEC_FULL.md` §4.3 step 4, §7). Mirrors a single consumer in the
/// reconciler's consumer group (`SPEC_FULL.md` §5): N of these run
/// concurrently, each independently pulling from the same upstream queue.
pub async fn run_worker<S: CatalogStore + 'static>(
    worker_id: usize,
    reconciler: Arc<Reconciler<S>>,
    consumer: Arc<CandidateConsumer>,
    mut jobs: mpsc::Receiver<ReconcileJob>,
    notices: mpsc::Sender<ChangeNotice>,
    token: CancellationToken,
) {
    info!(status = "reconciler_worker_started", worker_id, "reconciler worker started");
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                jobs.close();
                while let Some(job) = jobs.recv().await {
                    process_job(&reconciler, &consumer, job, &notices).await;
                }
                break;
            }
            maybe_job = jobs.recv() => {
                match maybe_job {
                    Some(job) => process_job(&reconciler, &consumer, job, &notices).await,
                    None => break,
                }
            }
        }
    }
    info!(status = "reconciler_worker_stopped", worker_id, "reconciler worker stopped");
}

async fn process_job<S: CatalogStore>(
    reconciler: &Reconciler<S>,
    consumer: &CandidateConsumer,
    job: ReconcileJob,
    notices: &mpsc::Sender<ChangeNotice>,
) {
    let ReconcileJob { candidate, alert_1, alert_2, commit } = job;
    match reconciler.reconcile(&candidate, alert_1, alert_2).await {
        Ok(outcome) => {
            let notice = ChangeNotice {
                key: outcome.hit.xmatch_id.clone(),
                topic: NoticeTopic::Xmatch,
                status: outcome.status,
                changes: std::collections::BTreeMap::new(),
                timestamp: outcome.hit.updated_at,
            };
            if notices.send(notice).await.is_err() {
                warn!(status = "change_notice_sink_closed", "change notice sink closed");
            }
        }
        Err(PipelineError::DuplicateCrossMatch { obj_id_1, obj_id_2, existing_xmatch_id }) => {
            // A benign poison-message outcome, not a retry — still commits below.
            StatusEvent::new("duplicate_cross_match")
                .xmatch_id(existing_xmatch_id)
                .details(format!("obj_id_1={obj_id_1} obj_id_2={obj_id_2}"))
                .emit_warn(reconciler.report_mode, reconciler.logstash.as_deref());
        }
        Err(e) => {
            StatusEvent::new("reconciler_failed")
                .error(e.to_string())
                .emit_error(reconciler.report_mode, reconciler.logstash.as_deref());
        }
    }
    consumer.commit(&commit);
}
