use std::time::Duration;

use crate::{backend::sim::SimConfig, stress::validate::Acceptance};

use super::StressOverrides;

/// High level stress scenarios.
/// Each scenario is a preset of workload shape, backend behavior, and the
/// acceptance range its latency figure is checked against.
#[derive(Debug, Clone, Copy, clap::ValueEnum, Default)]
pub enum Scenario {
    /// Sustained single-row ephemeral inserts.
    /// Used to measure steady-state write latency against a warm pool.
    #[default]
    WriteStress,

    /// Five concurrent inserts sharing one command inside one transaction.
    /// Used to exercise per-task parameter isolation under contention.
    ParallelTransaction,
}

impl Scenario {
    /// The workload preset this scenario starts from.
    /// Manually defined parameters overwrite these.
    pub fn stress_defaults(self) -> StressOverrides {
        match self {
            Scenario::WriteStress => {
                // One hundred ephemeral writes per second for ten seconds.
                StressOverrides {
                    qps: Some(100),
                    duration: Some(10.),
                    concurrency: None,
                    jitter: None,
                    reset_deadline: Some(5.),
                }
            }

            Scenario::ParallelTransaction => {
                // Transactions are heavier than single writes, so the rate is
                // lower; each tick fans out five inserts internally.
                StressOverrides {
                    qps: Some(20),
                    duration: Some(10.),
                    concurrency: Some(32),
                    jitter: None,
                    reset_deadline: Some(5.),
                }
            }
        }
    }

    /// Behavior of the simulated backend under this scenario.
    pub fn backend_profile(self) -> SimConfig {
        match self {
            Scenario::WriteStress => {
                // Fixed service time, no injected faults.
                // The latency figure should be pure backend response time.
                SimConfig {
                    base_latency: Duration::from_millis(75),
                    transient_ratio: 0.0,
                }
            }

            Scenario::ParallelTransaction => {
                // Occasional injected contention so the retry path runs.
                SimConfig {
                    base_latency: Duration::from_millis(75),
                    transient_ratio: 0.01,
                }
            }
        }
    }

    /// Range the measured mean latency must fall into for the run to pass.
    pub fn acceptance(self) -> Acceptance {
        match self {
            Scenario::WriteStress => Acceptance {
                latency: Duration::ZERO..=Duration::from_millis(150),
            },
            Scenario::ParallelTransaction => Acceptance {
                latency: Duration::ZERO..=Duration::from_millis(400),
            },
        }
    }
}
