//! smi-exporter: Prometheus exporter for NVIDIA GPUs.
//!
//! Discovers GPUs through `nvidia-smi` once at startup and serves their
//! temperature, memory and utilization gauges on `/metrics`.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use prometheus::Registry;
use smi_exporter_core::{CommandRunner, ExporterConfig, MissingValue, SystemRunner};
use smi_exporter_nvidia_gpu::{discover, register_all, server, CollectorOptions, GpuSnapshot};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Output format for one-shot mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Prometheus text exposition format
    Text,
    /// Raw per-GPU readings as JSON
    Json,
}

/// Command-line arguments for the exporter.
#[derive(Parser)]
#[command(name = "smi-exporter")]
#[command(about = "Prometheus exporter for NVIDIA GPU metrics via nvidia-smi")]
#[command(version)]
#[command(author)]
struct Args {
    /// Address to serve /metrics on (e.g. "0.0.0.0:9445")
    #[arg(short, long, value_parser = validate_listen)]
    listen: Option<String>,

    /// nvidia-smi binary to run
    #[arg(long, value_name = "PATH")]
    nvidia_smi: Option<String>,

    /// Also publish fan speed and power draw
    #[arg(long)]
    extended: bool,

    /// What to publish when a reading fails (zero, omit)
    #[arg(long)]
    missing_value: Option<MissingValue>,

    /// Collect once, print to stdout and exit
    #[arg(short, long)]
    once: bool,

    /// Output format for --once
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Read configuration from this file instead of the default location
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verify nvidia-smi is available and exit
    #[arg(long)]
    check: bool,

    /// Generate example config file and exit
    #[arg(long)]
    generate_config: bool,
}

/// Validate that the listen address parses as a socket address.
fn validate_listen(s: &str) -> Result<String, String> {
    s.parse::<std::net::SocketAddr>()
        .map(|_| s.to_owned())
        .map_err(|_| format!("'{s}' is not a valid address, expected HOST:PORT"))
}

impl Args {
    /// Apply command line overrides on top of the loaded configuration.
    fn apply(&self, mut config: ExporterConfig) -> ExporterConfig {
        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(program) = &self.nvidia_smi {
            config.nvidia_smi = program.clone();
        }
        if self.extended {
            config.extended_metrics = true;
        }
        if let Some(policy) = self.missing_value {
            config.missing_value = policy;
        }
        config
    }
}

fn init_logging(config: &ExporterConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Main entry point for the exporter.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Handle config generation
    if args.generate_config {
        let Some(config_path) = args
            .config
            .clone()
            .or_else(ExporterConfig::default_config_path)
        else {
            eprintln!("Could not determine config directory");
            process::exit(1);
        };
        ExporterConfig::save_example_config_to_file(&config_path)
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("Generated example config at: {}", config_path.display());
        return Ok(());
    }

    // An explicit --config must load; the default location is best effort
    let (loaded, load_error) = match &args.config {
        Some(path) => (
            ExporterConfig::load_from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None,
        ),
        None => match ExporterConfig::load() {
            Ok(config) => (config, None),
            Err(e) => (ExporterConfig::default(), Some(e)),
        },
    };
    let config = args.apply(loaded);

    init_logging(&config);
    if let Some(e) = load_error {
        warn!("Ignoring unreadable config file: {}", e);
    }

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());

    if args.check {
        match runner.run(&config.nvidia_smi, &["-L".to_owned()]) {
            Ok(listing) => {
                println!("{listing}");
                println!("nvidia-smi is available");
                return Ok(());
            }
            Err(e) => {
                eprintln!("nvidia-smi is not available: {}", e);
                process::exit(1);
            }
        }
    }

    let options = CollectorOptions::from_config(&config);
    let collectors = discover(runner, &options);
    if collectors.is_empty() {
        warn!("No GPUs found, /metrics will be empty");
    }

    if args.once {
        match args.format {
            OutputFormat::Json => {
                let snapshots: Vec<GpuSnapshot> =
                    collectors.iter().map(|collector| collector.snapshot()).collect();
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            }
            OutputFormat::Text => {
                let registry = Registry::new();
                register_all(&registry, collectors)?;
                print!("{}", server::encode_text(&registry.gather())?);
            }
        }
        return Ok(());
    }

    let registry = Registry::new();
    let registered = register_all(&registry, collectors)?;
    info!(
        gpus = registered,
        extended = options.extended_metrics,
        missing_value = %options.missing_value,
        "Collectors registered"
    );

    let addr = config.listen_addr()?;
    server::serve(addr, registry)
        .await
        .with_context(|| format!("serving metrics on {addr}"))?;

    Ok(())
}
