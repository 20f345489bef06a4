use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::Result;

pub const DEFAULT_FILTER: &str = "trafgen=info,warn";

pub fn log_file_name<Tz>(now: &chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("test_run_{}.log", now.format("%Y%m%d_%H%M%S"))
}

/// Installs the global subscriber: stdout plus `test_run_<timestamp>.log` in
/// `dir`, both behind the same `RUST_LOG` filter. Keep the guard alive for
/// the whole run; dropping it flushes the file.
pub fn init(dir: &Path) -> Result<(PathBuf, WorkerGuard)> {
    let path = dir.join(log_file_name(&chrono::Local::now()));
    let file = std::fs::File::create(&path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok((path, guard))
}
