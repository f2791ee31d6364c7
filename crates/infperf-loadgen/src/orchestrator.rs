//! Stage orchestrator (C6): sequences stages, drives the optional sweep
//! pre-stage, and honors SIGINT. This is the seam where every other
//! component of the load orchestrator meets — scheduler, queue, worker
//! pool, circuit breakers, and the lifecycle collector.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use infperf_breaker::{CircuitBreaker, CircuitBreakerLayer};
use infperf_client::{ClientConfig, HttpClientAdapter};
use infperf_core::clock;
use infperf_core::config::{CircuitBreakerConfig, LoadConfig, LoadStage, LoadType, MultiLoraConfig};
use infperf_core::model::{LifecycleRecord, ScheduledRequest, StageRuntimeInfo, StageStatus};
use infperf_core::traits::{DatasetSource, Tokenizer};
use infperf_scheduler::{ConstantScheduler, PoissonScheduler, Scheduler, TraceEntry, TraceReplayScheduler, read_trace_file};

use crate::collector::LifecycleCollector;
use crate::queue::RequestQueue;
use crate::signals::RunSignals;
use crate::sweep;
use crate::worker::run_worker;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("circuit breaker setup failed: {0}")]
    Breaker(#[from] infperf_breaker::Error),
    #[error("http client setup failed: {0}")]
    Client(#[from] infperf_client::Error),
    #[error("trace scheduler setup failed: {0}")]
    Scheduler(#[from] infperf_scheduler::Error),
    #[error("sweep planning failed: {0}")]
    Sweep(#[from] sweep::Error),
    #[error("failed to install SIGINT handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Everything the orchestrator needs beyond the load config itself: the
/// Prometheus scrape interval, when enabled, sets a floor on the
/// inter-stage sleep so stage windows don't alias the scrape.
pub struct RunConfig {
    pub load: LoadConfig,
    pub prometheus_scrape_interval: Option<f64>,
}

pub struct RunOutcome {
    pub records: Vec<LifecycleRecord>,
    pub stages: Vec<StageRuntimeInfo>,
}

/// Drives the full run: starts the worker pool, runs the sweep pre-stage if
/// configured, sequences the remaining stages, and tears everything down.
/// Returns whatever was collected even on a stage failure or SIGINT — a
/// partial report is still a report.
pub async fn run(
    run_config: &RunConfig,
    breaker_configs: &[CircuitBreakerConfig],
    client_config: ClientConfig,
    mut dataset: Box<dyn DatasetSource>,
    tokenizer: Arc<dyn Tokenizer>,
) -> Result<RunOutcome, Error> {
    clock::init_epoch();
    let load = &run_config.load;

    let num_workers = load.num_workers.max(1) as usize;
    let queue = Arc::new(RequestQueue::new(num_workers));
    let signals = RunSignals::new(load.worker_max_concurrency);

    let breakers: Vec<CircuitBreaker> = breaker_configs.iter().map(CircuitBreaker::new).collect::<Result<_, _>>()?;
    let breaker_layer = Arc::new(Mutex::new(CircuitBreakerLayer::new(breakers)));

    let (collector, records, collector_task) = LifecycleCollector::spawn(Arc::clone(&breaker_layer));

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))?;
    }

    let mut worker_handles = Vec::with_capacity(num_workers);
    for worker_id in 0..num_workers {
        let client = Arc::new(HttpClientAdapter::new(client_config.clone())?);
        let handle = tokio::spawn(run_worker(
            worker_id,
            Arc::clone(&queue),
            signals.clone(),
            client,
            Arc::clone(&tokenizer),
            collector.handle(),
        ));
        worker_handles.push(handle);
    }

    let trace_entries: Vec<TraceEntry> = match (&load.load_type, &load.trace) {
        (LoadType::TraceReplay, Some(trace_cfg)) => read_trace_file(Path::new(&trace_cfg.path))?,
        _ => Vec::new(),
    };

    let mut request_id_counter: u64 = 0;
    let mut stages_info = Vec::new();

    let stage_defs = match &load.sweep {
        Some(sweep_cfg) => {
            let sweep_stage = LoadStage {
                rate: Some(sweep_cfg.num_requests as f64 / 5.0),
                duration: Some(5),
                num_requests: None,
                concurrency_level: None,
            };
            let mut samples = Vec::new();
            let info = run_one_stage(
                -1,
                &sweep_stage,
                load,
                &trace_entries,
                dataset.as_mut(),
                &queue,
                &signals,
                &breaker_layer,
                &interrupted,
                &mut request_id_counter,
                Some(sweep_cfg.timeout),
                Some(&mut samples),
            )
            .await;
            let sweep_failed = matches!(info.status, StageStatus::Failed);
            stages_info.push(info);
            if sweep_failed {
                teardown(&signals, worker_handles).await;
                collector.close();
                let _ = collector_task.await;
                return Ok(RunOutcome { records: drain_records(&records), stages: stages_info });
            }
            let saturation = sweep::compute_saturation(&samples, sweep_cfg.timeout, sweep_cfg.saturation_percentile)?;
            tracing::info!(saturation, "sweep planner estimated saturation");
            sweep::plan_stages(saturation, sweep_cfg).into_iter().enumerate().map(|(i, s)| (i as i64, s)).collect::<Vec<_>>()
        }
        None => load.stages.iter().cloned().enumerate().map(|(i, s)| (i as i64, s)).collect(),
    };

    let effective_interval = load.interval.max(run_config.prometheus_scrape_interval.unwrap_or(0.0));
    let last_index = stage_defs.len().saturating_sub(1);

    for (idx, (stage_id, stage)) in stage_defs.iter().enumerate() {
        let info = run_one_stage(
            *stage_id,
            stage,
            load,
            &trace_entries,
            dataset.as_mut(),
            &queue,
            &signals,
            &breaker_layer,
            &interrupted,
            &mut request_id_counter,
            None,
            None,
        )
        .await;
        let completed = matches!(info.status, StageStatus::Completed);
        stages_info.push(info);
        // A breaker opening or SIGINT fails the current stage and the
        // remaining stages are skipped, not attempted.
        if !completed {
            break;
        }
        if idx < last_index {
            tokio::time::sleep(Duration::from_secs_f64(effective_interval)).await;
        }
    }

    teardown(&signals, worker_handles).await;
    collector.close();
    let _ = collector_task.await;

    Ok(RunOutcome { records: drain_records(&records), stages: stages_info })
}

/// Runs one stage end-to-end: enqueue, poll to completion/timeout/breaker-
/// open/SIGINT, cancel-and-drain on non-success, and finalize the runtime
/// bracket. Shared verbatim by regular stages and the sweep burst (which is
/// just stage `-1` with a timeout and an active-request sampler attached).
#[allow(clippy::too_many_arguments)]
async fn run_one_stage(
    stage_id: i64,
    stage: &LoadStage,
    load: &LoadConfig,
    trace_entries: &[TraceEntry],
    dataset: &mut dyn DatasetSource,
    queue: &Arc<RequestQueue>,
    signals: &RunSignals,
    breakers: &Arc<Mutex<CircuitBreakerLayer>>,
    interrupted: &Arc<AtomicBool>,
    request_id_counter: &mut u64,
    timeout: Option<f64>,
    mut active_sampler: Option<&mut Vec<(f64, u64)>>,
) -> StageRuntimeInfo {
    if matches!(load.load_type, LoadType::Concurrent) {
        if let Some(level) = stage.concurrency_level {
            signals.max_concurrency.store(level, Ordering::SeqCst);
        }
    }
    signals.set_request_phase(true);
    signals.reset_finished_counter();

    let start_wallclock = jiff::Timestamp::now();
    let start_ts = clock::now() + 1.0;
    let rate = stage.rate.unwrap_or(0.0);

    let num_requests: u64 = if let Some(n) = dataset.count() {
        n as u64
    } else if matches!(load.load_type, LoadType::Concurrent) {
        stage.num_requests.unwrap_or(0)
    } else {
        (rate * stage.duration.unwrap_or(0) as f64).floor().max(0.0) as u64
    };

    let seed = fastrand::u64(..);
    let mut scheduler: Box<dyn Scheduler> = match load.load_type {
        LoadType::Constant => Box::new(ConstantScheduler::new(rate.max(f64::MIN_POSITIVE), seed, start_ts)),
        LoadType::Poisson => Box::new(PoissonScheduler::new(rate.max(f64::MIN_POSITIVE), seed, start_ts)),
        LoadType::TraceReplay => Box::new(TraceReplayScheduler::new(trace_entries.to_vec(), start_ts)),
        LoadType::Concurrent => Box::new(ConstantScheduler::new(1.0, seed, start_ts)),
    };

    let mut pushed = 0u64;
    for _ in 0..num_requests {
        let Some(item) = dataset.next_item() else { break };
        let scheduled_ts = if matches!(load.load_type, LoadType::Concurrent) { start_ts } else { scheduler.next() };
        let adapter = pick_adapter(load.lora_traffic_split.as_deref());
        let request_id = *request_id_counter;
        *request_id_counter += 1;
        let channel = queue.route(item.preferred_worker_id);
        queue.put(
            ScheduledRequest {
                request_id,
                stage_id,
                spec: item.spec,
                scheduled_ts,
                adapter,
                preferred_worker_id: item.preferred_worker_id,
            },
            channel,
        );
        pushed += 1;
    }

    // The sweep planner needs 2 Hz samples of the active-request count;
    // regular stages just poll at 1 Hz.
    let poll_interval = if active_sampler.is_some() { Duration::from_millis(500) } else { Duration::from_secs(1) };
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let status = loop {
        ticker.tick().await;
        if let Some(samples) = active_sampler.as_deref_mut() {
            samples.push((clock::now() - start_ts, signals.active_count()));
        }
        if signals.finished_count() >= pushed {
            break StageStatus::Completed;
        }
        if let Some(timeout) = timeout {
            if clock::now() - start_ts >= timeout {
                break StageStatus::TimedOut;
            }
        }
        if breakers.lock().unwrap().any_open() {
            break StageStatus::Failed;
        }
        if interrupted.load(Ordering::SeqCst) {
            break StageStatus::Failed;
        }
    };

    if !matches!(status, StageStatus::Completed) {
        signals.set_cancel_signal(true);
        while signals.active_count() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        queue.drain(None);
        signals.set_cancel_signal(false);
    }

    signals.set_request_phase(false);
    let queue_for_join = Arc::clone(queue);
    let _ = tokio::task::spawn_blocking(move || queue_for_join.join(None)).await;

    StageRuntimeInfo {
        stage_id,
        rate,
        start_wallclock,
        end_wallclock: Some(jiff::Timestamp::now()),
        status,
        concurrency_level: stage.concurrency_level,
    }
}

/// Weighted draw over `load.lora_traffic_split` (validated to sum to 1.0 at
/// config load time); `None` when no split is configured, matching
/// untagged, non-LoRA traffic.
fn pick_adapter(split: Option<&[MultiLoraConfig]>) -> Option<String> {
    let split = split?;
    if split.is_empty() {
        return None;
    }
    let total: f64 = split.iter().map(|c| c.split).sum();
    if total <= 0.0 {
        return None;
    }
    let mut r = fastrand::f64() * total;
    for c in split {
        if r < c.split {
            return Some(c.name.clone());
        }
        r -= c.split;
    }
    split.last().map(|c| c.name.clone())
}

/// Teardown: unstick any worker waiting on a `request_phase` transition,
/// flip `stop_signal`, give workers a second to notice and exit on their
/// own, then abort the stragglers.
async fn teardown(signals: &RunSignals, handles: Vec<tokio::task::JoinHandle<()>>) {
    signals.set_stop_signal(true);
    signals.set_request_phase(false);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline && handles.iter().any(|h| !h.is_finished()) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    for h in &handles {
        if !h.is_finished() {
            h.abort();
        }
    }
    for h in handles {
        let _ = h.await;
    }
}

fn drain_records(records: &Arc<Mutex<Vec<LifecycleRecord>>>) -> Vec<LifecycleRecord> {
    std::mem::take(&mut *records.lock().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use infperf_core::config::MultiLoraConfig;

    #[test]
    fn pick_adapter_returns_none_without_split() {
        assert_eq!(pick_adapter(None), None);
    }

    #[test]
    fn pick_adapter_always_picks_a_configured_name() {
        let split = vec![
            MultiLoraConfig { name: "a".into(), split: 0.25 },
            MultiLoraConfig { name: "b".into(), split: 0.75 },
        ];
        for _ in 0..100 {
            let picked = pick_adapter(Some(&split)).unwrap();
            assert!(picked == "a" || picked == "b");
        }
    }
}
