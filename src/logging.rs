use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV_VAR: &str = "SIMARCHIVE_LOG";
const DEFAULT_LOG_FILTER: &str = "simarchive=info";
const DEBUG_LOG_FILTER: &str = "simarchive=debug";

pub struct LogConfig {
    pub debug: bool,
    /// Keep stdout clean for the JSON report.
    pub json_report: bool,
}

fn build_filter(cfg: &LogConfig) -> EnvFilter {
    match EnvFilter::try_from_env(LOG_ENV_VAR) {
        Ok(filter) => filter,
        Err(_) if cfg.debug => EnvFilter::new(DEBUG_LOG_FILTER),
        Err(_) => EnvFilter::new(DEFAULT_LOG_FILTER),
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(cfg: LogConfig) {
    let writer = if cfg.json_report {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_filter(build_filter(&cfg));
    let _ = tracing_subscriber::registry().with(layer).try_init();
}
