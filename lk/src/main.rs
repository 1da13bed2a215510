//! Loadkit - adaptive resource-loading orchestration
//!
//! CLI entry point for simulating and inspecting the loading layer.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use loadkit::cli::{Cli, Command, OutputFormat};
use loadkit::config::Config;
use loadkit::network::{self, ConnectionSignals, EffectiveType, NetworkQuality};
use loadkit::operation::adjusted_timeout;
use loadkit::placeholder::PlaceholderTimer;
use loadkit::platform::{ManualProbe, ManualVisibility, VisibilityWatcher};
use loadkit::progressive::{PageSource, ProgressiveLoader};
use loadkit::registry::{LoadingAnalyticsRecord, LoadingRegistry, PerformanceMetrics};

/// Upper bound on a whole simulation run
const SIMULATION_DEADLINE: Duration = Duration::from_secs(300);

/// Scroll-away-and-back attempts after a failed page
const MAX_RECOVERIES: u32 = 3;

const SENTINEL: &str = "list-sentinel";

fn parse_level(level_str: Option<&str>) -> tracing::Level {
    let Some(s) = level_str else {
        debug!("parse_level: level_str is None, defaulting to INFO");
        return tracing::Level::INFO;
    };
    match s.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loadkit")
        .join("logs");

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = parse_level(cli_log_level.or(config_log_level));

    let log_file = fs::create_dir_all(&log_dir)
        .and_then(|_| fs::File::create(log_dir.join("loadkit.log")));

    match log_file {
        Ok(log_file) => {
            tracing_subscriber::fmt()
                .with_writer(log_file)
                .with_ansi(false)
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
                .init();
            info!("Logging initialized (level: {:?})", level);
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(
                    tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
                )
                .init();
            warn!("Failed to open log file in {}: {}, logging to stderr", log_dir.display(), e);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    config.validate().context("Invalid configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Simulate {
            items,
            page_size,
            network,
            latency_ms,
            fail_page,
            format,
        } => {
            let options = SimulateOptions {
                items,
                page_size,
                network,
                latency: Duration::from_millis(latency_ms),
                fail_page,
            };
            cmd_simulate(&config, options, format).await
        }
        Command::Config => cmd_config(&config),
        Command::Classify {
            effective_type,
            downlink,
            rtt,
            save_data,
        } => {
            let signals = ConnectionSignals {
                effective_type,
                downlink_mbps: downlink,
                rtt_ms: rtt,
                save_data,
            };
            cmd_classify(&config, &signals)
        }
    }
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

fn cmd_classify(config: &Config, signals: &ConnectionSignals) -> Result<()> {
    debug!(?signals, "cmd_classify: called");
    let quality = network::classify(Some(signals));
    let timeout = adjusted_timeout(config.operation.base_timeout(), quality);
    println!(
        "{} {} (timeout x{} = {}ms)",
        "Network quality:".bold(),
        quality.to_string().cyan(),
        quality.timeout_factor(),
        timeout.as_millis()
    );
    Ok(())
}

/// Representative signals for a simulated network quality
fn signals_for(quality: NetworkQuality) -> Option<ConnectionSignals> {
    match quality {
        NetworkQuality::Fast => Some(ConnectionSignals::new(EffectiveType::FourG, 25.0, 40)),
        NetworkQuality::Good => Some(ConnectionSignals::new(EffectiveType::ThreeG, 4.0, 180)),
        NetworkQuality::Slow => Some(ConnectionSignals::new(EffectiveType::TwoG, 0.2, 1_400)),
        NetworkQuality::Unknown => None,
    }
}

/// Latency multiplier for a simulated network quality
fn latency_factor(quality: NetworkQuality) -> f64 {
    match quality {
        NetworkQuality::Fast => 0.5,
        NetworkQuality::Good | NetworkQuality::Unknown => 1.0,
        NetworkQuality::Slow => 4.0,
    }
}

/// In-memory page source with jittered latency and an optional one-time failure
struct SyntheticSource {
    total: usize,
    latency: Duration,
    fail_page: Option<usize>,
    failed_once: AtomicBool,
}

#[async_trait]
impl PageSource<usize> for SyntheticSource {
    async fn load_page(&self, page_index: usize, page_size: usize) -> Result<Vec<usize>> {
        let jitter_ms = rand::rng().random_range(0..=self.latency.as_millis() as u64 / 4);
        tokio::time::sleep(self.latency + Duration::from_millis(jitter_ms)).await;

        if self.fail_page == Some(page_index) && !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(eyre::eyre!("synthetic failure on page {}", page_index));
        }

        let start = page_index * page_size;
        let end = self.total.min(start + page_size);
        Ok((start..end).collect())
    }
}

struct SimulateOptions {
    items: usize,
    page_size: Option<usize>,
    network: NetworkQuality,
    latency: Duration,
    fail_page: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct SimulationReport {
    network: NetworkQuality,
    page_size: usize,
    pages_fetched: usize,
    items_loaded: usize,
    has_more: bool,
    placeholder_shows: u64,
    recoveries: u32,
    elapsed_ms: u64,
    metrics: PerformanceMetrics,
    analytics: Vec<LoadingAnalyticsRecord>,
}

async fn cmd_simulate(config: &Config, options: SimulateOptions, format: OutputFormat) -> Result<()> {
    debug!(items = options.items, network = %options.network, "cmd_simulate: called");
    let started = Instant::now();

    let probe = Arc::new(ManualProbe::new(signals_for(options.network)));
    let registry = LoadingRegistry::create(config.registry.clone(), probe);

    let mut progressive = config.progressive.clone();
    if let Some(page_size) = options.page_size {
        progressive.items_per_page = page_size;
    }
    let source = SyntheticSource {
        total: options.items,
        latency: options.latency.mul_f64(latency_factor(options.network)),
        fail_page: options.fail_page,
        failed_once: AtomicBool::new(false),
    };
    let loader = Arc::new(ProgressiveLoader::new(registry.clone(), progressive, Arc::new(source)));
    let page_size = loader.page_size();

    let timer = PlaceholderTimer::new(config.placeholder.clone());
    let follower = timer.follow(loader.loading_signal());

    let visibility = ManualVisibility::new();
    let sentinel = visibility.observe(SENTINEL, &config.image.visibility_options());

    loader.start().await;
    visibility.set_visible(SENTINEL, true);
    let watcher = loader.watch_sentinel(sentinel);

    let recoveries = tokio::time::timeout(SIMULATION_DEADLINE, drive_to_end(&loader, &visibility))
        .await
        .context("Simulation did not finish in time")??;

    // Let the placeholder finish its minimum display
    let mut placeholder = timer.subscribe();
    let settle = config.placeholder.min_display() + config.placeholder.transition() * 2;
    let _ = tokio::time::timeout(settle, placeholder.wait_for(|s| !s.show_placeholder)).await;

    watcher.abort();
    follower.abort();

    let state = loader.state();
    let report = SimulationReport {
        network: registry.network_quality(),
        page_size,
        pages_fetched: loader.fetch_count(),
        items_loaded: state.items.len(),
        has_more: state.has_more,
        placeholder_shows: timer.show_count(),
        recoveries,
        elapsed_ms: started.elapsed().as_millis() as u64,
        metrics: registry.performance_metrics(),
        analytics: registry.analytics(),
    };
    registry.dispose();

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{}", json);
        }
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

/// Wait for the list to finish, scrolling away and back after a failed page
async fn drive_to_end(loader: &ProgressiveLoader<usize>, visibility: &ManualVisibility) -> Result<u32> {
    let mut state_rx = loader.subscribe();
    let mut recoveries = 0;
    loop {
        let state = state_rx
            .wait_for(|s| !s.loading && (!s.has_more || s.error.is_some()))
            .await
            .context("Loader went away")?
            .clone();
        if !state.has_more {
            return Ok(recoveries);
        }
        if recoveries >= MAX_RECOVERIES {
            warn!(recoveries, "cmd_simulate: giving up after repeated page failures");
            return Ok(recoveries);
        }

        recoveries += 1;
        info!(recoveries, error = ?state.error, "Page failed, toggling sentinel to resume");
        visibility.set_visible(SENTINEL, false);
        visibility.set_visible(SENTINEL, true);
        state_rx
            .wait_for(|s| s.loading || s.error.is_none())
            .await
            .context("Loader went away")?;
    }
}

fn print_report(report: &SimulationReport) {
    println!("{}", "Simulation".bold());
    println!("  {:<20} {}", "network:", report.network.to_string().cyan());
    println!("  {:<20} {}", "page size:", report.page_size);
    println!("  {:<20} {}", "pages fetched:", report.pages_fetched);
    println!("  {:<20} {}", "items loaded:", report.items_loaded);
    let more = if report.has_more {
        "yes".yellow()
    } else {
        "no".green()
    };
    println!("  {:<20} {}", "more available:", more);
    println!("  {:<20} {}", "placeholder shows:", report.placeholder_shows);
    println!("  {:<20} {}", "recoveries:", report.recoveries);
    println!("  {:<20} {}ms", "elapsed:", report.elapsed_ms);

    let metrics = &report.metrics;
    println!();
    println!("{}", "Performance".bold());
    println!("  {:<20} {}", "operations:", metrics.total_operations);
    println!(
        "  {:<20} {} ok / {} failed ({:.0}%)",
        "outcome:",
        metrics.successful_operations.to_string().green(),
        metrics.failed_operations.to_string().red(),
        metrics.success_rate * 100.0
    );
    println!("  {:<20} {:.1}ms", "average duration:", metrics.average_duration_ms);
    println!("  {:<20} {}ms", "slowest:", metrics.slowest_duration_ms);
    println!("  {:<20} {}", "priority:", metrics.priority);

    if !report.analytics.is_empty() {
        println!();
        println!("{}", "Attempts".bold());
        for record in &report.analytics {
            let state = if record.success {
                record.state.to_string().green()
            } else {
                record.state.to_string().red()
            };
            println!(
                "  {} {:>6}ms {} {}",
                record.operation_id.as_str().dimmed(),
                record.duration_ms,
                state,
                record.error_message.as_deref().unwrap_or("")
            );
        }
    }
}
