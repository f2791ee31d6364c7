//! Declarative circuit breakers (C7). Each breaker pattern-matches every
//! `LifecycleRecord` against JMESPath boolean expressions and feeds the
//! match outcome to one or more triggers; any trigger firing opens the
//! breaker.

mod trigger;

pub use trigger::{HitSample, Trigger, build_trigger};

use infperf_core::config::CircuitBreakerConfig;
use infperf_core::model::LifecycleRecord;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid jmespath expression '{expr}': {source}")]
    InvalidExpression { expr: String, #[source] source: jmespatch::JmespathError },
}

/// A single named breaker: OR-semantics `matches`, OR-semantics `rules`,
/// OR-semantics triggers. Once open, stays open until `reset()` is called
/// externally — the orchestrator never resets a breaker automatically.
pub struct CircuitBreaker {
    name: String,
    matches: Vec<jmespatch::Expression<'static>>,
    rules: Vec<jmespatch::Expression<'static>>,
    triggers: Vec<Box<dyn Trigger>>,
    open: bool,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Result<Self, Error> {
        let compile = |exprs: &[String]| -> Result<Vec<jmespatch::Expression<'static>>, Error> {
            exprs
                .iter()
                .map(|e| {
                    jmespatch::compile(e).map_err(|source| Error::InvalidExpression { expr: e.clone(), source })
                })
                .collect()
        };
        Ok(CircuitBreaker {
            name: config.name.clone(),
            matches: compile(&config.metrics.matches)?,
            rules: compile(&config.metrics.rules)?,
            triggers: config.triggers.iter().map(build_trigger).collect(),
            open: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Feeds one record. Records that don't match any `matches` expression
    /// are ignored outright — they never reach a trigger.
    pub fn feed(&mut self, record: &LifecycleRecord) {
        let value = match serde_json::to_value(record) {
            Ok(v) => v,
            Err(_) => return,
        };
        if !Self::any_matches(&self.matches, &value) {
            return;
        }
        let hit = self.rules.is_empty() || Self::any_matches(&self.rules, &value);
        let sample = HitSample { ts: jiff::Timestamp::now(), hit };
        for trigger in self.triggers.iter_mut() {
            trigger.update(sample);
            if trigger.fired() {
                self.open = true;
            }
        }
    }

    fn any_matches(exprs: &[jmespatch::Expression<'static>], value: &serde_json::Value) -> bool {
        exprs.iter().any(|expr| match expr.search(value.clone()) {
            Ok(result) => result.is_truthy(),
            Err(e) => {
                tracing::debug!(error = %e, "jmespath evaluation failed, treating as no match");
                false
            }
        })
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn reset(&mut self) {
        self.open = false;
        for trigger in self.triggers.iter_mut() {
            trigger.reset();
        }
    }
}

/// Holds every breaker active for a run. The orchestrator feeds records
/// through `feed_all` and polls `any_open` between ticks; multiple breakers
/// use OR semantics for that decision.
#[derive(Default)]
pub struct CircuitBreakerLayer {
    breakers: Vec<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    pub fn new(breakers: Vec<CircuitBreaker>) -> Self {
        CircuitBreakerLayer { breakers }
    }

    pub fn feed_all(&mut self, record: &LifecycleRecord) {
        for breaker in self.breakers.iter_mut() {
            breaker.feed(record);
        }
    }

    pub fn any_open(&self) -> bool {
        self.breakers.iter().any(|b| b.is_open())
    }

    pub fn open_breaker_names(&self) -> Vec<&str> {
        self.breakers.iter().filter(|b| b.is_open()).map(|b| b.name()).collect()
    }

    pub fn reset_all(&mut self) {
        for breaker in self.breakers.iter_mut() {
            breaker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infperf_core::config::{CircuitBreakerMetricsConfig, TriggerSpec};
    use infperf_core::model::{InferenceInfo, RequestError};

    fn failing_record() -> LifecycleRecord {
        LifecycleRecord {
            request_id: 1,
            stage_id: 0,
            scheduled_ts: 0.0,
            start_ts: 0.0,
            end_ts: 0.1,
            request_payload: "{}".into(),
            response_payload: String::new(),
            info: InferenceInfo::default(),
            error: Some(RequestError { kind: "http_error".into(), message: "500".into() }),
        }
    }

    fn success_record() -> LifecycleRecord {
        LifecycleRecord {
            request_id: 2,
            stage_id: 0,
            scheduled_ts: 0.0,
            start_ts: 0.0,
            end_ts: 0.1,
            request_payload: "{}".into(),
            response_payload: "{}".into(),
            info: InferenceInfo::default(),
            error: None,
        }
    }

    fn consecutive_breaker(threshold: u32) -> CircuitBreaker {
        let config = CircuitBreakerConfig {
            name: "errors".into(),
            metrics: CircuitBreakerMetricsConfig { matches: vec!["error".into()], rules: vec![] },
            triggers: vec![TriggerSpec::Consecutive { threshold }],
        };
        CircuitBreaker::new(&config).unwrap()
    }

    #[test]
    fn opens_after_n_consecutive_hits_never_earlier() {
        let mut breaker = consecutive_breaker(3);
        breaker.feed(&failing_record());
        assert!(!breaker.is_open());
        breaker.feed(&failing_record());
        assert!(!breaker.is_open());
        breaker.feed(&failing_record());
        assert!(breaker.is_open());
    }

    #[test]
    fn success_records_are_ignored_by_the_error_matcher() {
        let mut breaker = consecutive_breaker(2);
        breaker.feed(&success_record());
        breaker.feed(&success_record());
        assert!(!breaker.is_open());
    }

    #[test]
    fn reset_clears_open_and_trigger_state() {
        let mut breaker = consecutive_breaker(2);
        breaker.feed(&failing_record());
        breaker.feed(&failing_record());
        assert!(breaker.is_open());
        breaker.reset();
        assert!(!breaker.is_open());
        breaker.feed(&failing_record());
        assert!(!breaker.is_open());
    }

    #[test]
    fn rate_over_window_breaker_opens_once_threshold_crossed() {
        let config = CircuitBreakerConfig {
            name: "rate".into(),
            metrics: CircuitBreakerMetricsConfig { matches: vec!["error != null".into()], rules: vec![] },
            triggers: vec![TriggerSpec::RateOverWindow { window_sec: 60.0, threshold: 0.5, min_samples: 2 }],
        };
        let mut breaker = CircuitBreaker::new(&config).unwrap();
        breaker.feed(&failing_record());
        assert!(!breaker.is_open());
        breaker.feed(&success_record());
        // only 1/2 samples matched `matches` (success doesn't match), so min_samples not met via matched feed alone
        breaker.feed(&failing_record());
        assert!(breaker.is_open());
    }
}
