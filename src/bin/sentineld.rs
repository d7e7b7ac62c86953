//! sentineld - PPE compliance monitoring daemon
//!
//! This daemon:
//! 1. Loads configuration (SENTINEL_CONFIG file + SENTINEL_* environment)
//! 2. Runs one processing thread per configured source
//! 3. Persists deduplicated violations from every source through one store
//! 4. Keeps a live feed of recent verdicts and logs its statistics
//! 5. Reloads the policy file when it changes on disk
//! 6. Enforces log retention

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ppe_sentinel::config::SourceSettings;
use ppe_sentinel::{
    now_ms, ComplianceVerdict, EventDeduplicator, FrameSkipScheduler, Housekeeping, LiveFeed,
    PerceptionAdapter, PolicyStore, PolicyWatcher, ReplayLog, SentinelConfig, SourcePipeline,
    SqliteViolationLogStore, SyntheticSource, ViolationLogStore,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

enum Message {
    Cycle {
        source: String,
        verdicts: Vec<ComplianceVerdict>,
        events: Vec<ComplianceVerdict>,
    },
    SourceEnded(String),
    Shutdown,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SentinelConfig::load()?;
    let policy = Arc::new(PolicyStore::new(cfg.policy.initial_policy())?);
    let mut store = SqliteViolationLogStore::open(&cfg.db_path)?;
    let mut feed = LiveFeed::default();
    let mut upkeep = Housekeeping::new(
        cfg.policy.watch_path.clone().map(PolicyWatcher::new),
        cfg.retention,
        Instant::now(),
    );

    log::info!("sentineld running. writing to {}", cfg.db_path);
    if let Some(watcher) = upkeep.watcher() {
        log::info!("watching policy file {}", watcher.path().display());
    }
    upkeep.reload_policy(&policy);
    log::info!(
        "skip_frames={}, cooldown={}s, required_gear=[{}]",
        cfg.skip_frames,
        cfg.cooldown.as_secs(),
        ppe_sentinel::gear::gear_names(&policy.snapshot().required_gear).join(", ")
    );

    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel::<Message>();
    {
        let running = Arc::clone(&running);
        let tx = tx.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
            let _ = tx.send(Message::Shutdown);
        })
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    for settings in &cfg.sources {
        let replay = match &settings.replay_path {
            Some(path) => Some(ReplayLog::open(path)?),
            None => None,
        };
        let source = open_source(settings, replay.as_deref())?;
        let pipeline = build_pipeline(&cfg, settings, replay, Arc::clone(&policy))?;
        let tx = tx.clone();
        let running = Arc::clone(&running);
        let fps = settings.target_fps;
        let handle = std::thread::Builder::new()
            .name(settings.id.clone())
            .spawn(move || run_source(pipeline, source, fps, tx, running))
            .map_err(|e| anyhow!("failed to spawn source thread: {}", e))?;
        workers.push(handle);
    }
    drop(tx);

    let mut active_sources = workers.len();
    let mut event_count = 0u64;

    while active_sources > 0 {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Message::Cycle {
                source,
                verdicts,
                events,
            }) => {
                feed.push_cycle(&source, &verdicts);
                if !events.is_empty() {
                    match store.append_verdicts(&events, &source) {
                        Ok(written) => {
                            event_count += written as u64;
                            for ev in &events {
                                log::info!(
                                    "violation #{}: source={} person={} missing=[{}]",
                                    event_count,
                                    source,
                                    ev.track_id(),
                                    ppe_sentinel::gear::gear_names(ev.missing()).join(", ")
                                );
                            }
                        }
                        Err(e) => {
                            log::error!("failed to persist {} events: {}", events.len(), e)
                        }
                    }
                }
            }
            Ok(Message::SourceEnded(source)) => {
                log::info!("source {} ended", source);
                active_sources -= 1;
            }
            Ok(Message::Shutdown) => {
                log::info!("shutdown signal received, stopping sources...");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        match now_ms() {
            Ok(wall_ms) => {
                upkeep.tick(Instant::now(), wall_ms, &policy, &mut store, &feed);
            }
            Err(e) => log::error!("clock unavailable: {}", e),
        }
    }

    running.store(false, Ordering::SeqCst);
    for handle in workers {
        if handle.join().is_err() {
            log::error!("source thread panicked");
        }
    }
    log::info!("sentineld stopped after {} events", event_count);
    Ok(())
}

fn build_pipeline(
    cfg: &SentinelConfig,
    settings: &SourceSettings,
    replay: Option<Arc<ReplayLog>>,
    policy: Arc<PolicyStore>,
) -> Result<SourcePipeline> {
    let perception = match replay {
        Some(log) => PerceptionAdapter::replay(log, settings.equipment),
        None => PerceptionAdapter::stub(settings.equipment),
    };
    log::info!("{}: perception {}", settings.id, perception.describe());
    Ok(SourcePipeline::new(
        settings.id.clone(),
        FrameSkipScheduler::new(cfg.skip_frames),
        perception,
        EventDeduplicator::new(cfg.cooldown, cfg.dedup_max_keys),
        policy,
    ))
}

fn open_source(settings: &SourceSettings, replay: Option<&ReplayLog>) -> Result<SyntheticSource> {
    let mut source = SyntheticSource::new(settings.synthetic_config(replay)?)?;
    source.connect()?;
    Ok(source)
}

fn run_source(
    mut pipeline: SourcePipeline,
    mut source: SyntheticSource,
    target_fps: u32,
    tx: Sender<Message>,
    running: Arc<AtomicBool>,
) {
    let frame_interval = Duration::from_millis(1000 / u64::from(target_fps.max(1)));
    let mut last_health_log = Instant::now();

    if let Err(e) = pipeline.perception_mut().warm_up() {
        log::warn!("{}: perception warm-up failed: {}", pipeline.source_id(), e);
    }

    while running.load(Ordering::SeqCst) {
        let cycle_started = Instant::now();
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                log::error!("{}: frame read failed: {}", pipeline.source_id(), e);
                break;
            }
        };

        let report = pipeline.process_frame(&frame);
        if !report.verdicts.is_empty() {
            let sent = tx.send(Message::Cycle {
                source: pipeline.source_id().to_string(),
                verdicts: report.verdicts,
                events: report.events,
            });
            if sent.is_err() {
                break;
            }
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = pipeline.stats();
            let capture = source.stats();
            log::info!(
                "{} health={} frames={} inference={} failures={} events={} url={}",
                pipeline.source_id(),
                source.is_healthy(),
                capture.frames_captured,
                stats.inference_cycles,
                stats.inference_failures,
                stats.events,
                capture.url
            );
            last_health_log = Instant::now();
        }

        std::thread::sleep(frame_interval.saturating_sub(cycle_started.elapsed()));
    }

    let _ = tx.send(Message::SourceEnded(pipeline.source_id().to_string()));
}
