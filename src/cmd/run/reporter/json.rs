use super::{Reporter, RunSummary, SampleEvent};

pub struct JsonlReporter {
    emit_events: bool,
}

impl JsonlReporter {
    pub fn new(emit_events: bool) -> Self {
        Self { emit_events }
    }
}

impl Reporter for JsonlReporter {
    fn on_sample(&mut self, ev: &SampleEvent) {
        if self.emit_events {
            let line = serde_json::json!({
                "type": "sample",
                "index": ev.index,
                "latency_ms": ev.latency.as_secs_f64() * 1e3,
            });
            println!("{line}");
        }
    }

    fn finish(&mut self, summary: &RunSummary) {
        let line = serde_json::json!({
            "type": "final",
            "summary": summary,
        });
        println!("{line}");
    }
}
