use std::sync::Arc;

use clap::Args;
use tracing::info;

use crate::{
    backend::{BackendError, SessionPool, sim::SimBackend, transient_fault_classifier},
    config::{self, PoolSizing, Scenario, StressOverrides},
    stress::{
        HarnessError,
        driver::run_stress,
        ident::IdGenerator,
        retry::{RetryExecutor, RetryPolicy},
        validate::validate_run,
    },
    utils::telemetry::TelemetryHandle,
};

pub mod reporter;

use self::reporter::{HumanReporter, JsonlReporter, Reporter, RunSummary, SampleEvent};

/// Table every scenario writes into.
const TABLE: &str = "stress_rows";

/// run a stress scenario against the simulated backend
#[derive(Debug, Clone, Args)]
pub struct RunCommand {
    /// Scenario to run,
    /// manually defined parameters overwrite scenario parameters.
    #[arg(long, value_enum)]
    scenario: Option<Scenario>,

    /// report json instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,

    #[clap(flatten)]
    overrides: StressOverrides,
}

/// Everything a work unit needs, constructed per run and cloned per tick.
/// Explicit injection instead of process-global state, so parallel runs in
/// one process cannot interfere.
#[derive(Clone)]
struct WorkContext {
    backend: SimBackend,
    ids: IdGenerator,
    retry: Arc<RetryExecutor>,
}

impl WorkContext {
    fn new(backend: &SimBackend) -> Self {
        Self {
            backend: backend.clone(),
            ids: IdGenerator::new(),
            retry: Arc::new(RetryExecutor::new(
                transient_fault_classifier(),
                RetryPolicy::default(),
            )),
        }
    }
}

pub async fn exec(telemetry: TelemetryHandle, args: RunCommand) -> Result<(), HarnessError> {
    let scenario = args.scenario.unwrap_or_default();
    let cfg = config::merge(scenario, args.overrides);
    let sizing = PoolSizing::for_target_qps(cfg.target_qps);
    info!(?cfg, ?sizing, ?scenario, "stress config parameters ready");

    let backend = SimBackend::new(scenario.backend_profile());
    let ctx = WorkContext::new(&backend);

    let outcome = match scenario {
        Scenario::WriteStress => {
            let ctx = ctx.clone();
            run_stress(&backend, &telemetry, &cfg, Some(&sizing), move |_tick| {
                let ctx = ctx.clone();
                async move { write_one_row(&ctx).await }
            })
            .await?
        }
        Scenario::ParallelTransaction => {
            let ctx = ctx.clone();
            run_stress(&backend, &telemetry, &cfg, Some(&sizing), move |_tick| {
                let ctx = ctx.clone();
                async move { transaction_burst(&ctx).await }
            })
            .await?
        }
    };

    let stats = backend.stats();
    let verdict = validate_run(&outcome, stats, sizing.limits(), &scenario.acceptance());
    let summary = RunSummary::new(scenario, &cfg, &outcome, stats, &verdict);

    let mut reporter: Box<dyn Reporter> = if args.json {
        const EMIT_EVENTS: bool = true;
        Box::new(JsonlReporter::new(EMIT_EVENTS))
    } else {
        Box::new(HumanReporter::new())
    };
    for (index, latency) in outcome.samples.iter().enumerate() {
        reporter.on_sample(&SampleEvent {
            index,
            latency: *latency,
        });
    }
    reporter.finish(&summary);

    verdict?;
    Ok(())
}

/// One ephemeral single-row insert with a fresh unique ID.
///
/// Safe to retry wholesale: there is no transaction boundary and no partial
/// effect survives a failed attempt. The ID is drawn inside the attempt, so
/// every retry writes a row that cannot collide with anything else.
async fn write_one_row(ctx: &WorkContext) -> Result<(), BackendError> {
    ctx.retry
        .run(|| async move {
            let session = ctx.backend.open().await?;
            let cmd = session.insert_command(TABLE);
            cmd.bind_and_execute(ctx.ids.next_id(), None).await?;
            Ok(())
        })
        .await
}

/// Five concurrent inserts sharing one command object inside one transaction.
///
/// Each branch binds its own ID immediately before its own execute; setting
/// the shared parameter object ahead of time from five tasks at once is the
/// duplicate-key hazard this scenario exists to surface. A fresh transaction
/// is opened per attempt, so an aborted commit is safe to retry.
async fn transaction_burst(ctx: &WorkContext) -> Result<(), BackendError> {
    ctx.retry
        .run(|| async move {
            let session = ctx.backend.open().await?;
            let txn = session.begin();
            let cmd = session.insert_command(TABLE);

            let (a, b, c, d, e) = tokio::join!(
                cmd.bind_and_execute(ctx.ids.next_id(), Some(&txn)),
                cmd.bind_and_execute(ctx.ids.next_id(), Some(&txn)),
                cmd.bind_and_execute(ctx.ids.next_id(), Some(&txn)),
                cmd.bind_and_execute(ctx.ids.next_id(), Some(&txn)),
                cmd.bind_and_execute(ctx.ids.next_id(), Some(&txn)),
            );
            a?;
            b?;
            c?;
            d?;
            e?;

            txn.commit().await?;
            Ok(())
        })
        .await
}
