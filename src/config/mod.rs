use std::time::Duration;

use tracing::info;

use crate::backend::PoolLimits;

mod scenario;

pub use self::scenario::Scenario;

/// Stress run overrides as provided on the command line.
/// Unset properties fall back to the scenario preset, then to defaults.
#[derive(Debug, Clone, clap::Args, Default)]
pub struct StressOverrides {
    /// Target average work units per second.
    #[arg(long, value_name = "QPS")]
    pub qps: Option<u32>,

    /// Measured run duration.
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<f64>,

    /// Maximum number of in flight work units.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<u32>,

    /// Random multiplier applied to pacing waits, in the range `[0.0, 1.0]`.
    #[arg(long, value_name = "RATIO")]
    pub jitter: Option<f64>,

    /// Deadline for draining the pool before measurement starts.
    #[arg(long, value_name = "SECONDS")]
    pub reset_deadline: Option<f64>,
}

/// Fully resolved configuration, immutable for the lifetime of one run.
#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    pub target_qps: u32,
    pub duration: Duration,
    pub concurrency: usize,
    pub jitter: f64,
    pub reset_deadline: Duration,
}

/// Merges scenario presets with manual overrides, overrides winning,
/// then resolves the remaining holes with defaults.
pub fn merge(scenario: Scenario, overrides: StressOverrides) -> StressConfig {
    let preset = scenario.stress_defaults();

    macro_rules! merge_config {
        ($preset:ident, $overwrite:ident, {$($property:ident),+ $(,)?}) => {
            StressOverrides {
                $(
                    $property: if let Some(value) = $overwrite.$property {
                        info!("property '{}': use overwrite: {value}", stringify!($property));
                        Some(value)
                    } else if let Some(value) = $preset.$property {
                        info!("property '{}': use scenario: {value}", stringify!($property));
                        Some(value)
                    } else {
                        info!("property '{}': undefined", stringify!($property));
                        None
                    },
                )+
            }
        };
    }

    let merged = merge_config!(
        preset, overrides,
        {
            qps,
            duration,
            concurrency,
            jitter,
            reset_deadline,
        }
    );

    resolve(merged)
}

fn resolve(merged: StressOverrides) -> StressConfig {
    let target_qps = merged.qps.unwrap_or(100).max(1);
    StressConfig {
        target_qps,
        duration: Duration::from_secs_f64(merged.duration.unwrap_or(10.).max(0.1)),
        concurrency: merged
            .concurrency
            .map(|c| c.max(1) as usize)
            .unwrap_or_else(|| (target_qps as usize).max(16)),
        jitter: merged.jitter.unwrap_or(0.).clamp(0.0, 1.0),
        reset_deadline: Duration::from_secs_f64(merged.reset_deadline.unwrap_or(5.).max(0.1)),
    }
}

/// Pool pre-sizing policy.
///
/// Sizes the pool generously above the expected steady-state need so that no
/// pool growth happens during measurement.
#[derive(Debug, Clone, Copy)]
pub struct PoolSizing {
    /// Sessions to open and park before the measured run.
    pub prewarm_count: usize,
    pub max_active: usize,
    pub max_pooled: usize,
    pub max_fanout: usize,
}

impl PoolSizing {
    pub fn for_target_qps(target_qps: u32) -> Self {
        let prewarm_count = ((target_qps / 4) as usize).min(800);
        let session_limit = (prewarm_count + 50).max(400);
        Self {
            prewarm_count,
            max_active: session_limit,
            max_pooled: session_limit,
            max_fanout: 4usize.max(8 * target_qps as usize / 2000),
        }
    }

    pub fn limits(&self) -> PoolLimits {
        PoolLimits {
            max_active: self.max_active,
            max_pooled: self.max_pooled,
            max_fanout: self.max_fanout,
        }
    }
}
