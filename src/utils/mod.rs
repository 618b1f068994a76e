pub mod telemetry;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
