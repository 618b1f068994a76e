use std::{io::IsTerminal as _, path::Path};

use tracing_subscriber::{
    EnvFilter, Layer as _, Registry,
    filter::LevelFilter,
    fmt::writer::BoxMakeWriter,
    layer::SubscriberExt as _,
    reload,
    util::SubscriberInitExt as _,
};

use crate::utils::BoxError;

pub struct TelemetryConfig<'a> {
    pub verbose: bool,
    pub pretty: bool,
    pub output: Option<&'a Path>,
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Runtime control over the installed log filter.
///
/// The workload driver uses [`TelemetryHandle::quiesce`] to keep the log stream
/// quiet while latencies are being measured; the returned guard restores the
/// normal filter when dropped, on success and failure paths alike.
#[derive(Clone)]
pub struct TelemetryHandle {
    reload: Option<FilterHandle>,
    normal: LevelFilter,
}

impl TelemetryHandle {
    /// No-op handle for tests that do not install a subscriber.
    pub fn disabled() -> Self {
        Self {
            reload: None,
            normal: LevelFilter::INFO,
        }
    }

    /// Drops log verbosity to WARN until the returned guard is dropped.
    pub fn quiesce(&self) -> QuiesceGuard {
        if let Some(handle) = &self.reload {
            let _ = handle.modify(|filter| *filter = EnvFilter::new("warn"));
        }
        QuiesceGuard {
            handle: self.clone(),
        }
    }
}

pub struct QuiesceGuard {
    handle: TelemetryHandle,
}

impl Drop for QuiesceGuard {
    fn drop(&mut self) {
        if let Some(reload) = &self.handle.reload {
            let normal = self.handle.normal;
            let _ = reload.modify(move |filter| *filter = base_filter(normal));
        }
    }
}

fn base_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Configures structured logging with runtime control via `RUST_LOG` environment variable.
///
/// Defaults to INFO level to balance visibility with performance.
/// Use `RUST_LOG=debug` or `RUST_LOG=trace` for troubleshooting.
pub fn init_tracing(cfg: TelemetryConfig<'_>) -> Result<TelemetryHandle, BoxError> {
    let normal = if cfg.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let (filter_layer, reload_handle) = reload::Layer::new(base_filter(normal));

    let make_writer = match cfg.output {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let ansi = cfg.output.is_none() && std::io::stderr().is_terminal();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(ansi)
        .with_writer(make_writer);
    let fmt_layer = if cfg.pretty {
        fmt_layer.pretty().boxed()
    } else {
        fmt_layer.boxed()
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    tracing::debug!("tracing is set up");
    Ok(TelemetryHandle {
        reload: Some(reload_handle),
        normal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // The layer owns the filter; the handles go stale the moment it drops, so
    // it is returned to the caller to keep alive for the test's duration.
    fn handle_with_filter() -> (
        TelemetryHandle,
        FilterHandle,
        reload::Layer<EnvFilter, Registry>,
    ) {
        let (layer, reload_handle) =
            reload::Layer::<EnvFilter, Registry>::new(EnvFilter::new("info"));
        (
            TelemetryHandle {
                reload: Some(reload_handle.clone()),
                normal: LevelFilter::INFO,
            },
            reload_handle,
            layer,
        )
    }

    #[test]
    fn quiesce_lowers_and_restores_filter() {
        let (handle, inspect, _layer) = handle_with_filter();

        {
            let _guard = handle.quiesce();
            let current = inspect
                .with_current(|f| f.to_string())
                .expect("filter present");
            assert!(current.contains("warn"), "got filter: {current}");
        }

        let current = inspect
            .with_current(|f| f.to_string())
            .expect("filter present");
        assert!(current.contains("info"), "got filter: {current}");
    }

    #[test]
    fn quiesce_restores_when_scope_unwinds() {
        let (handle, inspect, _layer) = handle_with_filter();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = handle.quiesce();
            panic!("measured run blew up");
        }));
        assert!(result.is_err());

        let current = inspect
            .with_current(|f| f.to_string())
            .expect("filter present");
        assert!(current.contains("info"), "got filter: {current}");
    }

    #[test]
    fn disabled_handle_is_a_noop() {
        let handle = TelemetryHandle::disabled();
        let _guard = handle.quiesce();
    }
}
