//! YAML config surface, loaded with `serde_yaml` into a struct whose every
//! field is `#[serde(default)]`-backed so "merged over defaults" holds by
//! construction: `Config::default()` serialized then re-parsed is
//! byte-for-byte-equivalent.

use serde::{Deserialize, Serialize};

use crate::error::Error;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    Completion,
    Chat,
}

impl Default for ApiType {
    fn default() -> Self {
        ApiType::Completion
    }
}

fn default_max_tokens() -> u32 {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    #[serde(rename = "type")]
    pub api_type: ApiType,
    pub streaming: bool,
    pub headers: Option<std::collections::BTreeMap<String, String>>,
    /// Fallback `max_tokens` sent when a request's own `RequestSpec` doesn't
    /// set one (e.g. the mock dataset).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig { api_type: ApiType::default(), streaming: false, headers: None, max_tokens: default_max_tokens() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Mock,
    ShareGpt,
    Synthetic,
    Random,
    SharedPrefix,
    CnnDailymail,
    InfinityInstruct,
    BillsumConversations,
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Mock
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub path: Option<String>,
    pub input_distribution: Option<Distribution>,
    pub output_distribution: Option<Distribution>,
    pub shared_prefix: Option<SharedPrefixConfig>,
    pub trace: Option<TraceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    pub mean: f64,
    pub std: f64,
    #[serde(default)]
    pub min: Option<u32>,
    #[serde(default)]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedPrefixConfig {
    #[serde(default)]
    pub num_groups: u32,
    #[serde(default)]
    pub num_prompts_per_group: u32,
    #[serde(default)]
    pub shared_prefix_tokens: u32,
    #[serde(default)]
    pub suffix_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadType {
    Constant,
    Poisson,
    TraceReplay,
    Concurrent,
}

impl Default for LoadType {
    fn default() -> Self {
        LoadType::Constant
    }
}

/// One load stage. `rate`/`duration` drive `constant`/`poisson`/
/// `trace_replay`; `num_requests`/`concurrency_level` drive `concurrent`.
/// Which fields are meaningful is validated against `LoadConfig::type`
/// rather than split into two stage types, to keep the wire config flat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadStage {
    pub rate: Option<f64>,
    pub duration: Option<u64>,
    pub num_requests: Option<u64>,
    pub concurrency_level: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageGenType {
    Geometric,
    Linear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(rename = "type")]
    pub gen_type: StageGenType,
    #[serde(default = "default_sweep_num_requests")]
    pub num_requests: u64,
    #[serde(default = "default_sweep_timeout")]
    pub timeout: f64,
    #[serde(default = "default_sweep_num_stages")]
    pub num_stages: u32,
    #[serde(default = "default_sweep_stage_duration")]
    pub stage_duration: u64,
    #[serde(default = "default_sweep_saturation_percentile")]
    pub saturation_percentile: f64,
}

fn default_sweep_num_requests() -> u64 {
    2000
}
fn default_sweep_timeout() -> f64 {
    60.0
}
fn default_sweep_num_stages() -> u32 {
    5
}
fn default_sweep_stage_duration() -> u64 {
    180
}
fn default_sweep_saturation_percentile() -> f64 {
    95.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiLoraConfig {
    pub name: String,
    pub split: f64,
}

fn default_num_workers() -> u32 {
    std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(1).max(1)
}
fn default_worker_max_concurrency() -> u32 {
    100
}
fn default_worker_max_tcp_connections() -> u32 {
    2500
}
fn default_interval() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    #[serde(rename = "type")]
    pub load_type: LoadType,
    #[serde(default = "default_interval")]
    pub interval: f64,
    pub stages: Vec<LoadStage>,
    pub sweep: Option<SweepConfig>,
    #[serde(default = "default_num_workers")]
    pub num_workers: u32,
    #[serde(default = "default_worker_max_concurrency")]
    pub worker_max_concurrency: u32,
    #[serde(default = "default_worker_max_tcp_connections")]
    pub worker_max_tcp_connections: u32,
    pub trace: Option<TraceConfig>,
    pub circuit_breakers: Vec<String>,
    pub request_timeout: Option<f64>,
    pub lora_traffic_split: Option<Vec<MultiLoraConfig>>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig {
            load_type: LoadType::default(),
            interval: default_interval(),
            stages: Vec::new(),
            sweep: None,
            num_workers: default_num_workers(),
            worker_max_concurrency: default_worker_max_concurrency(),
            worker_max_tcp_connections: default_worker_max_tcp_connections(),
            trace: None,
            circuit_breakers: Vec::new(),
            request_timeout: None,
            lora_traffic_split: None,
        }
    }
}

impl LoadConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.load_type == LoadType::Concurrent && self.sweep.is_some() {
            return Err(Error::Config("cannot have sweep config with concurrent load type".into()));
        }
        if self.load_type == LoadType::TraceReplay {
            match &self.trace {
                Some(trace) if std::path::Path::new(&trace.path).is_file() => {}
                Some(trace) => return Err(Error::Config(format!("trace file '{}' not found", trace.path))),
                None => return Err(Error::Config("trace_replay load type requires load.trace.path".into())),
            }
        }
        for (i, stage) in self.stages.iter().enumerate() {
            match self.load_type {
                LoadType::Concurrent => {
                    if stage.num_requests.is_none() || stage.concurrency_level.is_none() {
                        return Err(Error::Config(format!(
                            "stage {i}: concurrent load type requires num_requests and concurrency_level"
                        )));
                    }
                }
                _ => {
                    if stage.rate.is_none() || stage.duration.is_none() {
                        return Err(Error::Config(format!("stage {i}: {:?} load type requires rate and duration", self.load_type)));
                    }
                }
            }
        }
        if let Some(split) = &self.lora_traffic_split {
            let total: f64 = split.iter().map(|c| c.split).sum();
            if (total - 1.0).abs() > 1e-6 {
                return Err(Error::Config("lora traffic split does not sum to 1.0".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusClientConfig {
    pub url: Option<String>,
    pub google_managed: bool,
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval: u32,
    pub filters: Vec<String>,
}

fn default_scrape_interval() -> u32 {
    15
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub prometheus: Option<PrometheusClientConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestLifecycleReportConfig {
    pub summary: bool,
    pub per_stage: bool,
    pub per_request: bool,
    pub per_adapter: bool,
    pub per_adapter_stage: bool,
    pub percentiles: Vec<f64>,
}

impl Default for RequestLifecycleReportConfig {
    fn default() -> Self {
        RequestLifecycleReportConfig {
            summary: true,
            per_stage: true,
            per_request: false,
            per_adapter: true,
            per_adapter_stage: false,
            percentiles: vec![0.1, 1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 90.0, 95.0, 99.0, 99.9],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusReportConfig {
    pub summary: bool,
    pub per_stage: bool,
}

impl Default for PrometheusReportConfig {
    fn default() -> Self {
        PrometheusReportConfig { summary: true, per_stage: false }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub request_lifecycle: RequestLifecycleReportConfig,
    pub prometheus: Option<PrometheusReportConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageBackendConfig {
    pub path: String,
    pub report_file_prefix: Option<String>,
}

impl Default for StorageBackendConfig {
    fn default() -> Self {
        StorageBackendConfig { path: "reports".into(), report_file_prefix: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketStorageConfig {
    #[serde(flatten)]
    pub base: StorageBackendConfig,
    pub bucket_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub local_storage: StorageBackendConfig,
    pub google_cloud_storage: Option<BucketStorageConfig>,
    pub simple_storage_service: Option<BucketStorageConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    Vllm,
    Sglang,
    Tgi,
    Mock,
}

impl Default for ServerType {
    fn default() -> Self {
        ServerType::Mock
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub model_name: Option<String>,
    pub base_url: String,
    #[serde(default = "default_true")]
    pub ignore_eos: bool,
    pub api_key: Option<String>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            server_type: ServerType::default(),
            model_name: None,
            base_url: "http://localhost:8000".into(),
            ignore_eos: true,
            api_key: None,
            cert_path: None,
            key_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub pretrained_model_name_or_path: Option<String>,
    pub trust_remote_code: Option<bool>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    Consecutive { threshold: u32 },
    RateOverWindow { window_sec: f64, threshold: f64, #[serde(default)] min_samples: u32 },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBreakerMetricsConfig {
    #[serde(default)]
    pub matches: Vec<String>,
    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub name: String,
    pub metrics: CircuitBreakerMetricsConfig,
    pub triggers: Vec<TriggerSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub data: DataConfig,
    pub load: LoadConfig,
    pub metrics: Option<MetricsConfig>,
    pub report: ReportConfig,
    pub storage: Option<StorageConfig>,
    pub server: Option<ServerConfig>,
    pub tokenizer: Option<TokenizerConfig>,
    pub circuit_breakers: Option<Vec<CircuitBreakerConfig>>,
}

impl Config {
    /// Parses `yaml_text` merged over `Config::default()` (deep merge of the
    /// YAML mapping: keyed fields override, nested maps recurse).
    pub fn load_merged(yaml_text: &str) -> Result<Config, Error> {
        let override_value: serde_yaml::Value = serde_yaml::from_str(yaml_text)?;
        let default_value = serde_yaml::to_value(Config::default())?;
        let merged = deep_merge(default_value, override_value);
        let config: Config = serde_yaml::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.load.validate()?;
        if self.server.is_none() {
            return Err(Error::Config("server.base_url must be set".into()));
        }
        if let Some(breakers) = &self.circuit_breakers {
            let configured: std::collections::HashSet<_> = breakers.iter().map(|b| b.name.as_str()).collect();
            for name in &self.load.circuit_breakers {
                if !configured.contains(name.as_str()) {
                    return Err(Error::Config(format!("load.circuit_breakers references unknown breaker '{name}'")));
                }
            }
        } else if !self.load.circuit_breakers.is_empty() {
            return Err(Error::Config("load.circuit_breakers set but no circuit_breakers configured".into()));
        }
        Ok(())
    }
}

fn deep_merge(base: serde_yaml::Value, over: serde_yaml::Value) -> serde_yaml::Value {
    match (base, over) {
        (serde_yaml::Value::Mapping(mut base_map), serde_yaml::Value::Mapping(over_map)) => {
            for (k, v) in over_map {
                let merged = match base_map.remove(&k) {
                    Some(base_v) => deep_merge(base_v, v),
                    None => v,
                };
                base_map.insert(k, merged);
            }
            serde_yaml::Value::Mapping(base_map)
        }
        (_, over) => over,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let merged = Config::load_merged(&yaml).expect_err("missing server.base_url should fail validate");
        match merged {
            Error::Config(_) => {}
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn merge_overrides_nested_fields_only() {
        let yaml = r#"
server:
  base_url: "http://example:8000"
load:
  type: poisson
"#;
        let cfg = Config::load_merged(yaml).unwrap();
        assert_eq!(cfg.load.load_type, LoadType::Poisson);
        assert_eq!(cfg.load.num_workers, default_num_workers());
        assert_eq!(cfg.server.unwrap().base_url, "http://example:8000");
    }

    #[test]
    fn lora_split_must_sum_to_one() {
        let yaml = r#"
server:
  base_url: "http://example:8000"
load:
  lora_traffic_split:
    - name: a
      split: 0.25
    - name: b
      split: 0.5
"#;
        let err = Config::load_merged(yaml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn concurrent_stage_requires_num_requests_and_concurrency() {
        let yaml = r#"
server:
  base_url: "http://example:8000"
load:
  type: concurrent
  stages:
    - rate: 5
      duration: 10
"#;
        let err = Config::load_merged(yaml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
