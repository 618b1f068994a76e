mod human;
mod json;

pub use self::{human::HumanReporter, json::JsonlReporter};

use std::time::Duration;

use crate::{
    backend::PoolStats,
    config::{Scenario, StressConfig},
    stress::{driver::StressOutcome, validate::ValidationError},
};

pub trait Reporter: Send {
    fn on_sample(&mut self, ev: &SampleEvent);
    fn finish(&mut self, summary: &RunSummary);
}

#[derive(Debug)]
pub struct SampleEvent {
    pub index: usize,
    pub latency: Duration,
}

#[derive(Debug, serde::Serialize)]
pub struct RunSummary {
    pub scenario: String,
    pub target_qps: u32,
    pub duration_secs: f64,
    pub samples: usize,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub pool_active: usize,
    pub pool_pooled: usize,
    pub pass: bool,
    pub failure: Option<String>,
}

impl RunSummary {
    pub fn new(
        scenario: Scenario,
        cfg: &StressConfig,
        outcome: &StressOutcome,
        stats: PoolStats,
        verdict: &Result<(), ValidationError>,
    ) -> Self {
        Self {
            scenario: format!("{scenario:?}"),
            target_qps: cfg.target_qps,
            duration_secs: cfg.duration.as_secs_f64(),
            samples: outcome.samples.len(),
            mean_ms: outcome.mean().as_secs_f64() * 1e3,
            min_ms: outcome.min().as_secs_f64() * 1e3,
            max_ms: outcome.max().as_secs_f64() * 1e3,
            p95_ms: outcome.p95().as_secs_f64() * 1e3,
            pool_active: stats.active,
            pool_pooled: stats.pooled,
            pass: verdict.is_ok(),
            failure: verdict.as_ref().err().map(|err| err.to_string()),
        }
    }
}
