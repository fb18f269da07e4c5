//! tarxiv pipeline — binary entry point.
//!
//! Boots the catalog store, every Source Adapter's ingest leg, the spatial
//! matcher, a pool of reconciler workers, the light-curve fusion stage, and
//! the IMAP mailbox poller, then waits for SIGINT/SIGTERM to drain and exit
//! (`SPEC_FULL.md` §5 "Concurrency & Resource Model").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tarxiv_pipeline::bus::{publish_candidates, CandidateConsumer, KafkaProducer, SubscriberBus};
use tarxiv_pipeline::config::Config;
use tarxiv_pipeline::db;
use tarxiv_pipeline::fusion::{Fusion, FusionWindow};
use tarxiv_pipeline::mailbox::{self, MailboxConfig};
use tarxiv_pipeline::matcher::{self, MatcherConfig};
use tarxiv_pipeline::reconciler::{self, ReconcileJob, Reconciler};
use tarxiv_pipeline::report::{run_logstash_forwarder, LogstashSink, ReportMode};
use tarxiv_pipeline::sources::{AsasSnAdapter, AtlasAdapter, IngestConfig, LsstAdapter, SourceAdapter, TnsAdapter, ZtfAdapter};
use tarxiv_pipeline::store::{self, CatalogStore, PostgresStore};
use tarxiv_common::{Alert, ChangeNotice, CitationSource, DetectionEvent, MatchCandidate, Source};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const RECONCILER_WORKERS: usize = 4;

/// Static registry of each survey's citable reference, mirroring the role
/// `sources.json` plays in `original_source/tarxiv/data_sources.py`'s
/// `Survey.__init__` (the literal file did not survive distillation, so the
/// entries below are filled in directly rather than loaded from disk).
fn citation_registry() -> HashMap<Source, CitationSource> {
    let entry = |name: &str, bibcode: &str, alias: &str| CitationSource {
        name: name.to_string(),
        bibcode: bibcode.to_string(),
        reference: format!("https://ui.adsabs.harvard.edu/abs/{bibcode}"),
        alias: alias.to_string(),
    };
    HashMap::from([
        (Source::Atlas, entry("ATLAS", "2018PASP..130f4505T", "atlas")),
        (Source::Ztf, entry("ZTF", "2019PASP..131a8002B", "ztf")),
        (Source::AsasSn, entry("ASAS-SN", "2017PASP..129j4502K", "asas-sn")),
        (Source::Lsst, entry("LSST", "2019ApJ...873..111I", "lsst")),
        (Source::Tns, entry("TNS", "2017wfdh.confE..23S", "tns")),
    ])
}

fn survey_block<'a>(config: &'a Config, name: &str) -> Option<&'a tarxiv_pipeline::config::SurveyBlock> {
    config.settings.surveys.get(name)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "tarxiv_pipeline=info".into()),
        )
        .json()
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    info!(status = "starting", version = env!("CARGO_PKG_VERSION"), "starting tarxiv pipeline");

    let pool = db::create_pool(&config.database_url()).await?;
    db::run_migrations(&pool).await?;
    store::ensure_year_provisioned(&pool, store::current_year())
        .await
        .context("provisioning the current year's xmatch id counter")?;

    let store: Arc<PostgresStore> = Arc::new(PostgresStore::new(pool));

    let token = CancellationToken::new();
    let mut tasks = JoinSet::new();

    spawn_signal_handler(&mut tasks, token.clone());

    let bus = if config.has_hopskotch() {
        Some(Arc::new(SubscriberBus::new(
            &config.kafka_host,
            config.hopskotch_username.as_deref(),
            config.hopskotch_password.as_deref(),
        )?))
    } else {
        warn!(status = "hopskotch_not_configured", "hopskotch credentials not configured, change notices will not be published externally");
        None
    };

    // `DATABASE` reporting mode forwards pipeline events to Logstash
    // (`tarxiv_pipeline::report`), mirroring the original's
    // `AsynchronousLogstashHandler`. Absent when unconfigured or not requested.
    let logstash: Option<Arc<LogstashSink>> = if config.wants_logstash() {
        let host = config.settings.logstash_host.clone().expect("checked by wants_logstash");
        let port = config.settings.logstash_port.expect("checked by wants_logstash");
        let (tx, rx) = mpsc::channel::<serde_json::Value>(256);
        let forward_token = token.clone();
        tasks.spawn(async move { run_logstash_forwarder(host, port, rx, forward_token).await });
        Some(Arc::new(LogstashSink::new(tx)))
    } else {
        None
    };

    let tns_block = survey_block(&config, "tns").cloned().unwrap_or_default();
    let anchor: Arc<dyn SourceAdapter> = Arc::new(TnsAdapter::new(
        tns_block.url.clone().unwrap_or_else(|| "https://www.wis-tns.org".into()),
        config.tns_api_key.clone().unwrap_or_default(),
        config.tns_id.clone().unwrap_or_default(),
        "bot".to_string(),
        "tarxiv".to_string(),
        Duration::from_secs_f64(tns_block.rate_limit.unwrap_or(1.0)),
    ));

    let mut secondaries: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    let (event_tx, event_rx) = mpsc::channel::<DetectionEvent>(1024);

    if let Some(block) = survey_block(&config, "atlas") {
        let adapter: Arc<dyn SourceAdapter> =
            Arc::new(AtlasAdapter::new(block.url.clone().unwrap_or_default(), config.atlas_token.clone().unwrap_or_default()));
        spawn_ingest(&mut tasks, Arc::clone(&adapter), block, event_tx.clone(), token.clone());
        secondaries.push(adapter);
    }
    if let Some(block) = survey_block(&config, "ztf") {
        let adapter: Arc<dyn SourceAdapter> = Arc::new(ZtfAdapter::new(block.url.clone().unwrap_or_default()));
        spawn_ingest(&mut tasks, Arc::clone(&adapter), block, event_tx.clone(), token.clone());
        secondaries.push(adapter);
    }
    if let Some(block) = survey_block(&config, "asas_sn") {
        let adapter: Arc<dyn SourceAdapter> = Arc::new(AsasSnAdapter::new(block.url.clone().unwrap_or_default()));
        spawn_ingest(&mut tasks, Arc::clone(&adapter), block, event_tx.clone(), token.clone());
        secondaries.push(adapter);
    }
    if let Some(block) = survey_block(&config, "lsst") {
        let adapter: Arc<dyn SourceAdapter> = Arc::new(LsstAdapter::new(block.url.clone().unwrap_or_default()));
        spawn_ingest(&mut tasks, Arc::clone(&adapter), block, event_tx.clone(), token.clone());
        secondaries.push(adapter);
    }
    drop(event_tx);

    // Spatial matcher: consumes the merged detection stream, publishes
    // candidates onto the `spark-sink` topic.
    let (candidate_tx, candidate_rx) = mpsc::channel::<MatchCandidate>(1024);
    let matcher_config =
        MatcherConfig { window_hours: config.settings.xmatch_window_len, radius_arcsec: config.settings.xmatch_radius };
    {
        let token = token.clone();
        tasks.spawn(async move { matcher::run(matcher_config, event_rx, candidate_tx, token).await });
    }
    {
        let producer = KafkaProducer::new(&config.kafka_host)?;
        let topic = config.settings.xmatch_ingest_topic.clone();
        let token = token.clone();
        tasks.spawn(async move { publish_candidates(&producer, &topic, candidate_rx, token).await });
    }

    // Reconciler: re-subscribes to `spark-sink` as its own consumer group
    // and fans candidates out to a pool of workers with manual offset commit.
    let (notice_tx, mut notice_rx) = mpsc::channel::<ChangeNotice>(256);
    spawn_reconciler_pool(
        &mut tasks,
        Arc::clone(&store),
        citation_registry(),
        config.settings.xmatch_id_len,
        &config.kafka_host,
        config.settings.xmatch_ingest_topic.clone(),
        notice_tx,
        token.clone(),
        config.report_mode,
        logstash.clone(),
    );
    if let Some(bus) = bus.clone() {
        let token = token.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        notice_rx.close();
                        while let Some(notice) = notice_rx.recv().await {
                            bus.publish(&notice).await;
                        }
                        break;
                    }
                    maybe = notice_rx.recv() => {
                        match maybe {
                            Some(notice) => bus.publish(&notice).await,
                            None => break,
                        }
                    }
                }
            }
        });
    }

    // Light-curve fusion: on-demand triggers from the mailbox, plus a daily
    // sweep over already-active objects (`spec.md` §4.1's trigger paths).
    let window = FusionWindow {
        prior_days: tns_block.obj_prior_days.unwrap_or(7),
        active_days: tns_block.obj_active_days.unwrap_or(90),
    };
    let fetch_radius_arcsec = tns_block.fetch_radius_arcsec.unwrap_or(15.0);
    let fusion = Arc::new(Fusion::new(
        Arc::clone(&store),
        anchor,
        secondaries,
        window,
        fetch_radius_arcsec,
        bus,
        config.report_mode,
        logstash.clone(),
    ));

    let (name_tx, mut name_rx) = mpsc::channel::<String>(256);
    {
        let fusion = Arc::clone(&fusion);
        let token = token.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        name_rx.close();
                        while let Some(name) = name_rx.recv().await {
                            build_one(&fusion, &name).await;
                        }
                        break;
                    }
                    maybe = name_rx.recv() => {
                        match maybe {
                            Some(name) => build_one(&fusion, &name).await,
                            None => break,
                        }
                    }
                }
            }
        });
    }

    if let (Some(server), Some(username), Some(password), Some(imap_settings)) =
        (&config.imap_server, &config.imap_username, &config.imap_password, &config.settings.imap)
    {
        let mailbox_config = MailboxConfig {
            server: server.clone(),
            username: username.clone(),
            password: password.clone(),
            mailbox: imap_settings.mailbox.clone(),
            allowed_senders: imap_settings.allowed_senders.clone(),
            polling_interval: Duration::from_secs(imap_settings.polling_interval_secs),
        };
        let token = token.clone();
        tasks.spawn(async move {
            if let Err(e) = mailbox::run(mailbox_config, name_tx, token).await {
                error!(status = "mailbox_poller_failed", error = %e, "mailbox poller exited with an error");
            }
        });
    } else {
        info!(status = "imap_not_configured", "imap mailbox polling not configured, on-demand trigger path disabled");
        drop(name_tx);
    }

    spawn_daily_sweep(&mut tasks, Arc::clone(&store), Arc::clone(&fusion), token.clone());

    if let Ok(path) = std::env::var("TARXIV_BACKFILL_FILE") {
        spawn_backfill(&mut tasks, Arc::clone(&fusion), path, token.clone());
    }

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(status = "task_panicked", error = %e, "a pipeline task panicked");
        }
    }

    info!(status = "shutdown_complete", "tarxiv pipeline shutdown complete");
    Ok(())
}

async fn build_one<S: CatalogStore>(fusion: &Fusion<S>, primary_name: &str) {
    match fusion.build_object(primary_name).await {
        Ok(Some(_)) => info!(status = "fusion_complete", primary_name, "object fused"),
        Ok(None) => info!(status = "fusion_no_anchor_match", primary_name, "no anchor match, skipping"),
        Err(e) => error!(status = "fusion_failed", primary_name, error = %e, "fusion failed"),
    }
}

fn spawn_signal_handler(tasks: &mut JoinSet<()>, token: CancellationToken) {
    tasks.spawn(async move {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        #[cfg(unix)]
        let terminate = async {
            let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else { return };
            sig.recv().await;
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!(status = "received_sigint", "received SIGINT"),
            () = terminate => info!(status = "received_sigterm", "received SIGTERM"),
        }
        token.cancel();
    });
}

fn spawn_ingest(
    tasks: &mut JoinSet<()>,
    adapter: Arc<dyn SourceAdapter>,
    block: &tarxiv_pipeline::config::SurveyBlock,
    sink: mpsc::Sender<DetectionEvent>,
    token: CancellationToken,
) {
    let Some(endpoint) = block.kafka_endpoint.clone() else { return };
    let Some(group_id) = block.kafka_group_id.clone() else { return };
    let topics = block.kafka_topics.clone();
    let ingest_config = IngestConfig { kafka_endpoint: endpoint, kafka_topics: topics, kafka_group_id: group_id };
    let source = adapter.source();
    tasks.spawn(async move {
        if let Err(e) = adapter.ingest_alerts(&ingest_config, sink, token).await {
            error!(status = "ingest_loop_failed", %source, error = %e, "ingest loop exited with an error");
        }
    });
}

#[allow(clippy::too_many_arguments)]
fn spawn_reconciler_pool<S: CatalogStore + 'static>(
    tasks: &mut JoinSet<()>,
    store: Arc<S>,
    citations: HashMap<Source, CitationSource>,
    id_width: usize,
    kafka_host: &str,
    topic: String,
    notices: mpsc::Sender<ChangeNotice>,
    token: CancellationToken,
    report_mode: ReportMode,
    logstash: Option<Arc<LogstashSink>>,
) {
    let reconciler = Arc::new(Reconciler::new(store, id_width, citations, report_mode, logstash));
    let group_id = "tarxiv-reconciler".to_string();

    // Each worker owns its own `spark-sink` consumer in the same consumer
    // group, so the broker distributes partitions across the pool rather
    // than the pool sharing one connection (`SPEC_FULL.md` §5: "N of these
    // run concurrently, each independently pulling from the same upstream
    // queue").
    for worker_id in 0..RECONCILER_WORKERS {
        let consumer = match CandidateConsumer::new(kafka_host, &group_id, &topic) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                error!(status = "consumer_build_failed", worker_id, error = %e, "failed to build spark-sink consumer for reconciler worker");
                continue;
            }
        };

        let (job_tx, job_rx) = mpsc::channel::<ReconcileJob>(64);
        let reconciler = Arc::clone(&reconciler);
        let worker_consumer = Arc::clone(&consumer);
        let notices = notices.clone();
        let worker_token = token.clone();
        tasks.spawn(async move {
            reconciler::run_worker(worker_id, reconciler, worker_consumer, job_rx, notices, worker_token).await;
        });

        let feed_token = token.clone();
        tasks.spawn(async move {
            loop {
                let Some((candidate, commit)) = consumer.recv(&feed_token).await else { break };
                let alert_1 = Alert {
                    obj_id: candidate.obj_id_1.clone(),
                    source: candidate.source_1,
                    raw: serde_json::json!({
                        "ra_deg": candidate.ra_deg_1,
                        "dec_deg": candidate.dec_deg_1,
                        "timestamp": candidate.timestamp_1,
                    }),
                };
                let alert_2 = Alert {
                    obj_id: candidate.obj_id_2.clone(),
                    source: candidate.source_2,
                    raw: serde_json::json!({
                        "ra_deg": candidate.ra_deg_2,
                        "dec_deg": candidate.dec_deg_2,
                        "timestamp": candidate.timestamp_2,
                    }),
                };
                // The feeder only hands the job off; `commit` travels with it
                // and is only acknowledged once the worker's reconcile
                // transaction reaches a terminal outcome (`reconciler::process_job`).
                let job = ReconcileJob { candidate, alert_1, alert_2, commit };
                if job_tx.send(job).await.is_err() {
                    break;
                }
            }
        });
    }
}

/// One-shot bulk backfill: reads newline-separated primary names from `path`
/// and runs `build_object` for each under a concurrency cap, rather than the
/// one-at-a-time pace of the daily sweep or mailbox trigger (`spec.md` §4.1's
/// third trigger path, "a bulk backfill run over a supplied list of primary
/// names").
const BACKFILL_CONCURRENCY: usize = 8;

fn spawn_backfill<S: CatalogStore + 'static>(
    tasks: &mut JoinSet<()>,
    fusion: Arc<Fusion<S>>,
    path: String,
    token: CancellationToken,
) {
    tasks.spawn(async move {
        let names = match std::fs::read_to_string(&path) {
            Ok(raw) => raw.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect::<Vec<_>>(),
            Err(e) => {
                error!(status = "backfill_read_failed", path, error = %e, "failed to read backfill name list");
                return;
            }
        };
        info!(status = "backfill_starting", path, count = names.len(), "bulk backfill starting");

        futures::stream::iter(names)
            .map(|name| {
                let fusion = Arc::clone(&fusion);
                async move { build_one(&fusion, &name).await }
            })
            .buffer_unordered(BACKFILL_CONCURRENCY)
            .take_until(token.cancelled())
            .collect::<Vec<()>>()
            .await;

        info!(status = "backfill_complete", "bulk backfill complete");
    });
}

/// Periodic daily sweep over already-active objects (`spec.md` §4.1: "query
/// the Catalog Store's active-objects query ... and re-run `build_object`
/// for each").
fn spawn_daily_sweep<S: CatalogStore + 'static>(
    tasks: &mut JoinSet<()>,
    store: Arc<S>,
    fusion: Arc<Fusion<S>>,
    token: CancellationToken,
) {
    tasks.spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(24 * 3600));
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    match store.active_object_names(90).await {
                        Ok(names) => {
                            info!(status = "daily_sweep_starting", count = names.len(), "daily sweep starting");
                            for name in names {
                                build_one(&fusion, &name).await;
                            }
                        }
                        Err(e) => error!(status = "daily_sweep_failed", error = %e, "daily sweep failed to list active objects"),
                    }
                }
            }
        }
    });
}
