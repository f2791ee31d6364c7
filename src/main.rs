//! `infperf`: a closed-loop load-testing harness for OpenAI-compatible LLM
//! inference servers. Reads a YAML config, runs the configured load stages
//! (or a sweep pre-stage that plans them), and writes lifecycle/Prometheus
//! reports to the configured storage backend.

mod args;

use std::sync::Arc;

use clap::Parser;
use infperf_core::config::{ApiType, CircuitBreakerConfig, Config};
use infperf_core::traits::{DatasetSource, PrometheusClient, ReportSink, Tokenizer};
use infperf_loadgen::orchestrator::{self, RunConfig, RunOutcome};
use infperf_report::mock::{MockDataset, WhitespaceTokenizer};
use infperf_report::prometheus::NullPrometheusClient;
use infperf_report::sink::LocalFileReportSink;
use tracing::{error, info};

use crate::args::Args;

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Core(#[from] infperf_core::Error),
    #[error("{0}")]
    Orchestrator(#[from] orchestrator::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    enable_logging(&args);

    let config = load_config(&args.config).unwrap_or_else(|e| {
        error!("loading config '{}': {e}", args.config);
        std::process::exit(1);
    });

    if args.dry_run {
        let merged = serde_yaml::to_string(&config).unwrap_or_else(|e| {
            error!("serializing merged config: {e}");
            std::process::exit(1);
        });
        println!("{merged}");
        return;
    }

    if let Err(e) = run(config).await {
        error!("run failed: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: &str) -> Result<Config, CliError> {
    let text = std::fs::read_to_string(path)?;
    Config::load_merged(&text).map_err(CliError::Core)
}

async fn run(config: Config) -> Result<(), CliError> {
    infperf_core::clock::init_epoch();

    let server = config.server.clone().ok_or_else(|| CliError::Core(infperf_core::Error::Config("server not configured".into())))?;

    if server.model_name.is_none() && !matches!(server.server_type, infperf_core::config::ServerType::Mock) {
        return Err(CliError::Core(infperf_core::Error::Setup(
            "server.model_name must be set (automatic model discovery is out of scope)".into(),
        )));
    }

    let client_config = infperf_client::ClientConfig {
        base_url: server.base_url.clone(),
        model_name: server.model_name.clone().unwrap_or_else(|| "default".to_string()),
        default_max_tokens: config.api.max_tokens,
        ignore_eos: server.ignore_eos,
        streaming: config.api.streaming,
        api_key: server.api_key.clone(),
        headers: config.api.headers.clone().unwrap_or_default().into_iter().collect(),
        request_timeout: config.load.request_timeout.map(std::time::Duration::from_secs_f64),
        worker_max_tcp_connections: config.load.worker_max_tcp_connections as usize,
    };

    let dataset: Box<dyn DatasetSource> = Box::new(MockDataset::new(matches!(config.api.api_type, ApiType::Chat), None));
    let tokenizer: Arc<dyn Tokenizer> = Arc::new(WhitespaceTokenizer);

    let breaker_configs = selected_circuit_breakers(&config);
    let prometheus_scrape_interval = config
        .metrics
        .as_ref()
        .and_then(|m| m.prometheus.as_ref())
        .map(|p| p.scrape_interval as f64);

    let run_config = RunConfig { load: config.load.clone(), prometheus_scrape_interval };

    info!(base_url = %server.base_url, "starting load run");
    let outcome = orchestrator::run(&run_config, &breaker_configs, client_config, dataset, tokenizer).await?;

    write_reports(&config, &outcome).await?;
    Ok(())
}

/// `circuit_breakers` holds every breaker definition; `load.circuit_breakers`
/// names the subset actually wired in for this run.
fn selected_circuit_breakers(config: &Config) -> Vec<CircuitBreakerConfig> {
    let Some(all) = &config.circuit_breakers else { return Vec::new() };
    let selected: std::collections::HashSet<&str> = config.load.circuit_breakers.iter().map(String::as_str).collect();
    all.iter().filter(|b| selected.contains(b.name.as_str())).cloned().collect()
}

async fn write_reports(config: &Config, outcome: &RunOutcome) -> Result<(), CliError> {
    let storage = config.storage.clone().unwrap_or_default();
    let sink = LocalFileReportSink::new(
        storage.local_storage.path.clone(),
        storage.local_storage.report_file_prefix.clone(),
    )?;

    let report_cfg = &config.report.request_lifecycle;
    let report = infperf_report::build_report(&outcome.records, report_cfg);

    if report_cfg.summary {
        let value = serde_json::to_value(&report.overall)?;
        sink.write("summary_lifecycle_metrics", &value)?;
    }

    if let Some(per_stage) = &report.per_stage {
        for (stage_id, summary) in per_stage {
            let value = serde_json::to_value(summary)?;
            sink.write(&format!("stage_{stage_id}_lifecycle_metrics"), &value)?;
        }
    }

    if report_cfg.per_request {
        let value = serde_json::to_value(&outcome.records)?;
        sink.write("per_request_lifecycle_metrics", &value)?;
    }

    if let Some(prometheus_cfg) = &config.report.prometheus {
        let client = NullPrometheusClient;
        if prometheus_cfg.summary {
            if let (Some(first), Some(last)) = (outcome.stages.first(), outcome.stages.last()) {
                let end = last.end_wallclock.unwrap_or(last.start_wallclock);
                let snapshot = client.scrape(first.start_wallclock, end).await.map_err(CliError::Core)?;
                sink.write("summary_prometheus_metrics", &serde_json::to_value(&snapshot.metrics)?)?;
            }
        }
        if prometheus_cfg.per_stage {
            for stage in &outcome.stages {
                let end = stage.end_wallclock.unwrap_or(stage.start_wallclock);
                let snapshot = client.scrape(stage.start_wallclock, end).await.map_err(CliError::Core)?;
                sink.write(&format!("stage_{}_prometheus_metrics", stage.stage_id), &serde_json::to_value(&snapshot.metrics)?)?;
            }
        }
    }

    Ok(())
}

fn enable_logging(args: &Args) {
    let mut builder = tracing_subscriber::fmt().compact();

    if args.quiet {
        builder = builder.with_max_level(tracing::Level::ERROR);
    } else {
        match args.verbose {
            2.. => builder = builder.with_max_level(tracing::Level::TRACE),
            1 => builder = builder.with_max_level(tracing::Level::DEBUG),
            _ => builder = builder.with_max_level(tracing::Level::INFO),
        }
    }

    builder.init();
}
