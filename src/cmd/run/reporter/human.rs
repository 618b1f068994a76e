use super::{Reporter, RunSummary, SampleEvent};

pub struct HumanReporter;

impl HumanReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for HumanReporter {
    fn on_sample(&mut self, _ev: &SampleEvent) {}

    fn finish(&mut self, summary: &RunSummary) {
        println!(
            "scenario={} qps={} duration={:.1}s samples={}",
            summary.scenario, summary.target_qps, summary.duration_secs, summary.samples,
        );
        println!(
            "latency mean={:.2}ms min={:.2}ms max={:.2}ms p95={:.2}ms",
            summary.mean_ms, summary.min_ms, summary.max_ms, summary.p95_ms,
        );
        println!(
            "pool active={} pooled={}",
            summary.pool_active, summary.pool_pooled,
        );
        match &summary.failure {
            None => println!("PASS"),
            Some(reason) => println!("FAIL: {reason}"),
        }
    }
}
