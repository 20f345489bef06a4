use anyhow::{Result, bail};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use trafgen::cache::{RequestCache, RequestGenerator};
use trafgen::config::Config;
use trafgen::context::RunContext;
use trafgen::health::HealthChecker;
use trafgen::logging;
use trafgen::monitor::ProgressMonitor;
use trafgen::pool::WorkerPool;
use trafgen::report::RunReport;
use trafgen::targets::{self, TargetList};

#[tokio::main]
async fn main() -> Result<()> {
    // flushes the run log on drop
    let (log_path, _log_guard) = logging::init(Path::new("."))?;

    info!("Starting trafgen, logging to {}", log_path.display());

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    info!("Loading config from {}", config_path);

    let config = Config::load(&config_path)?;
    config.validate()?;

    let targets_file = config.run.targets_file.clone();
    if !targets_file.exists() {
        targets::write_sample(&targets_file)?;
        warn!(
            "{} did not exist; a sample was written. Edit it and run again.",
            targets_file.display()
        );
        return Ok(());
    }
    let targets = TargetList::load(&targets_file)?;

    let ctx = Arc::new(RunContext::new(config)?);
    let config = ctx.config.clone();

    if config.health_check.enabled {
        let checker = HealthChecker::new(
            ctx.http.clone(),
            config.health_check.timeout_secs,
            config.health_check.max_targets,
        );
        let report = checker.check(&targets.urls()).await;
        if !report.any_reachable() {
            if config.health_check.required {
                bail!("none of the {} probed targets answered", report.checked);
            }
            warn!("no probed target answered; continuing anyway");
        }
    }

    if let Some(first) = targets.urls().first() {
        ctx.session.prime(&ctx.http, first, &config).await;
    }

    let generator = Arc::new(RequestGenerator::new(
        targets.urls(),
        config.generation.clone(),
        config.http.compression,
        ctx.session.clone(),
    )?);
    let cache = Arc::new(RequestCache::initialize(
        config.run.cache_size,
        generator,
        ctx.session.clone(),
    )?);

    let monitor = config.report.progress.then(|| {
        ProgressMonitor::new(
            ctx.stats.clone(),
            config.run.total_requests,
            Duration::from_secs(config.report.interval_secs),
        )
        .spawn()
    });

    let elapsed = WorkerPool::new(ctx.clone(), cache).run().await;

    if let Some(monitor) = monitor {
        monitor.stop().await;
    }

    let mut report = RunReport::new(
        &config,
        ctx.stats.snapshot(),
        elapsed,
        ctx.tls.session_cache.as_deref(),
    );
    if config.report.scoring {
        let alive = tokio::runtime::Handle::current().metrics().num_alive_tasks();
        report = report.with_score(alive);
    }
    report.print();

    if config.report.save_json {
        report.save_json(&config.report.output_dir)?;
    }

    info!("trafgen finished in {:.2}s", elapsed.as_secs_f64());
    Ok(())
}
