//! Summarizer (C8): reduces a flat list of `LifecycleRecord`s into
//! summary/per-stage/per-adapter/per-adapter-stage report views, using
//! `infperf_core::stats` for every percentile so the numbers match the
//! sweep planner's saturation estimate bit for bit.

use std::collections::BTreeMap;

use infperf_core::config::RequestLifecycleReportConfig;
use infperf_core::model::LifecycleRecord;
use infperf_core::stats::{self, MetricSummary};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ThroughputBlock {
    pub input_tokens_per_sec: f64,
    pub output_tokens_per_sec: f64,
    pub total_tokens_per_sec: f64,
    pub requests_per_sec: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SuccessBlock {
    pub count: u64,
    pub request_latency: Option<MetricSummary>,
    pub normalized_time_per_output_token: Option<MetricSummary>,
    pub time_per_output_token: Option<MetricSummary>,
    pub time_to_first_token: Option<MetricSummary>,
    pub inter_token_latency: Option<MetricSummary>,
    pub prompt_len: Option<MetricSummary>,
    pub output_len: Option<MetricSummary>,
    pub throughput: ThroughputBlock,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureBlock {
    pub count: u64,
    /// Keyed by `RequestError::kind`, e.g. `"timeout"`, `"network"`, `"500 ..."`.
    pub error_kinds: BTreeMap<String, u64>,
    pub request_latency: Option<MetricSummary>,
}

/// The group-wide numbers that apply regardless of success: how many
/// requests fell in the group, how long sending them took, and how close
/// the scheduler's intended timestamps were hit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadMeta {
    pub count: u64,
    pub send_duration: f64,
    pub achieved_rate: f64,
    pub schedule_accuracy: Option<MetricSummary>,
}

/// One group's worth of numbers, shaped to match the reference dataset's own
/// report files: `load_summary` for the group-wide counters, `successes` and
/// `failures` for the metrics split by outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub load_summary: LoadMeta,
    pub successes: SuccessBlock,
    pub failures: FailureBlock,
}

/// The full nested report: one overall `LoadSummary` plus whichever
/// optional breakdowns
/// `RequestLifecycleReportConfig` turns on.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub overall: LoadSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_stage: Option<BTreeMap<i64, LoadSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_adapter: Option<BTreeMap<String, LoadSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_adapter_stage: Option<BTreeMap<String, BTreeMap<i64, LoadSummary>>>,
}

/// Builds the complete report for `records` per `config`'s enabled views.
/// `summary`/`per_stage`/`per_adapter`/`per_adapter_stage` each gate one
/// field independently, matching the config's own names.
pub fn build_report(records: &[LifecycleRecord], config: &RequestLifecycleReportConfig) -> Report {
    let refs: Vec<&LifecycleRecord> = records.iter().collect();
    let overall = summarize_group(&refs, &config.percentiles);

    let per_stage = config.per_stage.then(|| group_by(&refs, |r| r.stage_id, &config.percentiles));

    let per_adapter = config.per_adapter.then(|| {
        group_by(&refs, |r| r.info.adapter.clone().unwrap_or_else(|| "none".to_string()), &config.percentiles)
    });

    let per_adapter_stage = config.per_adapter_stage.then(|| {
        let mut by_adapter: BTreeMap<String, Vec<&LifecycleRecord>> = BTreeMap::new();
        for r in &refs {
            let key = r.info.adapter.clone().unwrap_or_else(|| "none".to_string());
            by_adapter.entry(key).or_default().push(r);
        }
        by_adapter.into_iter().map(|(adapter, rs)| (adapter, group_by(&rs, |r| r.stage_id, &config.percentiles))).collect()
    });

    Report {
        overall,
        per_stage: if config.summary || config.per_stage { per_stage } else { None },
        per_adapter,
        per_adapter_stage,
    }
}

fn group_by<K: Ord, F: Fn(&LifecycleRecord) -> K>(
    records: &[&LifecycleRecord],
    key_fn: F,
    percentiles: &[f64],
) -> BTreeMap<K, LoadSummary> {
    let mut groups: BTreeMap<K, Vec<&LifecycleRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(key_fn(r)).or_default().push(r);
    }
    groups.into_iter().map(|(k, rs)| (k, summarize_group(&rs, percentiles))).collect()
}

/// The per-group reduction: `send_duration` is the span between the first
/// and last request actually sent (`start_ts`), not the scheduled window,
/// so `achieved_rate` reflects what the client did rather than what it
/// intended.
fn summarize_group(records: &[&LifecycleRecord], percentiles: &[f64]) -> LoadSummary {
    let count = records.len() as u64;
    if count == 0 {
        return LoadSummary::default();
    }

    let min_start = records.iter().map(|r| r.start_ts).fold(f64::INFINITY, f64::min);
    let max_start = records.iter().map(|r| r.start_ts).fold(f64::NEG_INFINITY, f64::max);
    let send_duration = (max_start - min_start).max(0.0);
    let achieved_rate = if send_duration > 0.0 { count as f64 / send_duration } else { 0.0 };

    let mut schedule_errors: Vec<f64> = records.iter().map(|r| r.schedule_error()).collect();
    let schedule_accuracy = stats::summarize(&mut schedule_errors, percentiles);

    let success_records: Vec<&&LifecycleRecord> = records.iter().filter(|r| r.is_success()).collect();
    let failure_records: Vec<&&LifecycleRecord> = records.iter().filter(|r| !r.is_success()).collect();

    let successes = summarize_success(&success_records, percentiles, send_duration);
    let failures = summarize_failure(&failure_records, percentiles);

    LoadSummary {
        load_summary: LoadMeta { count, send_duration, achieved_rate, schedule_accuracy },
        successes,
        failures,
    }
}

fn summarize_success(records: &[&&LifecycleRecord], percentiles: &[f64], send_duration: f64) -> SuccessBlock {
    let count = records.len() as u64;
    if count == 0 {
        return SuccessBlock::default();
    }

    let mut latencies: Vec<f64> = records.iter().map(|r| r.request_latency()).collect();
    let mut ntpot: Vec<f64> = records.iter().map(|r| r.normalized_time_per_output_token()).collect();
    let mut tpot: Vec<f64> = records.iter().filter_map(|r| r.time_per_output_token()).collect();
    let mut ttft: Vec<f64> = records.iter().filter_map(|r| r.time_to_first_token()).collect();
    let mut itl: Vec<f64> = records.iter().flat_map(|r| r.inter_token_latencies()).collect();
    let mut prompt_len: Vec<f64> = records.iter().map(|r| r.info.input_tokens as f64).collect();
    let mut output_len: Vec<f64> = records.iter().map(|r| r.info.output_tokens as f64).collect();

    let input_tokens: f64 = records.iter().map(|r| r.info.input_tokens as f64).sum();
    let output_tokens: f64 = records.iter().map(|r| r.info.output_tokens as f64).sum();
    let throughput = if send_duration > 0.0 {
        ThroughputBlock {
            input_tokens_per_sec: input_tokens / send_duration,
            output_tokens_per_sec: output_tokens / send_duration,
            total_tokens_per_sec: (input_tokens + output_tokens) / send_duration,
            requests_per_sec: count as f64 / send_duration,
        }
    } else {
        ThroughputBlock::default()
    };

    SuccessBlock {
        count,
        request_latency: stats::summarize(&mut latencies, percentiles),
        normalized_time_per_output_token: stats::summarize(&mut ntpot, percentiles),
        time_per_output_token: stats::summarize(&mut tpot, percentiles),
        time_to_first_token: stats::summarize(&mut ttft, percentiles),
        inter_token_latency: stats::summarize(&mut itl, percentiles),
        prompt_len: stats::summarize(&mut prompt_len, percentiles),
        output_len: stats::summarize(&mut output_len, percentiles),
        throughput,
    }
}

fn summarize_failure(records: &[&&LifecycleRecord], percentiles: &[f64]) -> FailureBlock {
    let count = records.len() as u64;
    if count == 0 {
        return FailureBlock::default();
    }
    let mut error_kinds: BTreeMap<String, u64> = BTreeMap::new();
    for r in records {
        if let Some(err) = &r.error {
            *error_kinds.entry(err.kind.clone()).or_insert(0) += 1;
        }
    }
    let mut latencies: Vec<f64> = records.iter().map(|r| r.request_latency()).collect();
    FailureBlock { count, error_kinds, request_latency: stats::summarize(&mut latencies, percentiles) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infperf_core::model::InferenceInfo;

    fn record(id: u64, stage_id: i64, start_ts: f64, end_ts: f64, output_tokens: u32, failed: bool) -> LifecycleRecord {
        LifecycleRecord {
            request_id: id,
            stage_id,
            scheduled_ts: start_ts - 0.01,
            start_ts,
            end_ts,
            request_payload: String::new(),
            response_payload: String::new(),
            info: InferenceInfo { input_tokens: 10, output_tokens, output_token_ts: vec![start_ts + 0.1, start_ts + 0.2], adapter: None },
            error: failed.then(|| infperf_core::model::RequestError { kind: "timeout".into(), message: "x".into() }),
        }
    }

    fn default_config() -> RequestLifecycleReportConfig {
        RequestLifecycleReportConfig::default()
    }

    #[test]
    fn empty_records_produce_zeroed_summary() {
        let report = build_report(&[], &default_config());
        assert_eq!(report.overall.load_summary.count, 0);
        assert_eq!(report.overall.successes.count, 0);
    }

    #[test]
    fn counts_successes_and_failures_separately() {
        let records = vec![
            record(0, 0, 0.0, 1.0, 20, false),
            record(1, 0, 0.5, 1.6, 15, false),
            record(2, 0, 1.0, 1.2, 0, true),
        ];
        let report = build_report(&records, &default_config());
        assert_eq!(report.overall.load_summary.count, 3);
        assert_eq!(report.overall.successes.count, 2);
        assert_eq!(report.overall.failures.count, 1);
        assert_eq!(report.overall.failures.error_kinds["timeout"], 1);
        assert!(report.overall.successes.time_to_first_token.is_some());
    }

    #[test]
    fn per_stage_groups_by_stage_id() {
        let records = vec![record(0, 0, 0.0, 1.0, 10, false), record(1, 1, 2.0, 3.0, 10, false)];
        let mut cfg = default_config();
        cfg.per_stage = true;
        let report = build_report(&records, &cfg);
        let per_stage = report.per_stage.unwrap();
        assert_eq!(per_stage.len(), 2);
        assert_eq!(per_stage[&0].load_summary.count, 1);
        assert_eq!(per_stage[&1].load_summary.count, 1);
    }

    #[test]
    fn per_adapter_falls_back_to_none_bucket() {
        let records = vec![record(0, 0, 0.0, 1.0, 10, false)];
        let mut cfg = default_config();
        cfg.per_adapter = true;
        let report = build_report(&records, &cfg);
        let per_adapter = report.per_adapter.unwrap();
        assert!(per_adapter.contains_key("none"));
    }
}
