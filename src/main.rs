// Energy Stream Simulator - Main Entry Point
//
// You can run it via Cargo:
//
// ```console
// $ cargo build --release
// $ ./target/release/energy-stream-simulator --broker-host localhost --time-speed 60
// ```
//
// Or generate a dataset without publishing:
//
// ```console
// $ ./target/release/energy-stream-simulator generate --start 2024-01-01T00:00:00Z --end 2024-01-02T00:00:00Z --step 300
// ```

use anyhow::{Context, Result};
use clap::Parser;
use energy_stream_simulator::publisher::bus_from_config;
use energy_stream_simulator::simulation::{
    GeneratedSeries, GenerationRange, GenerationRequest, LoggingConfig, PreviewRequest,
};
use energy_stream_simulator::types::{parse_timestamp, CliArgs, Command, RuntimeConfig};
use energy_stream_simulator::{Installation, SimulationService};
use std::io::{self, BufWriter, Write};
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse CLI arguments first to check for special flags
    let args = CliArgs::parse();

    // Handle special CLI flags that don't require full initialization
    if args.print_config {
        match RuntimeConfig::default().print_json() {
            Ok(json) => {
                println!("{}", json);
                return;
            }
            Err(e) => {
                eprintln!("Failed to serialize default configuration: {}", e);
                process::exit(1);
            }
        }
    }

    // Keep the guard alive so file logs flush on exit
    let logging = LoggingConfig::from_cli(args.verbose, args.debug, args.log_dir.as_deref());
    let _logging = match logging.init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    info!("Starting Energy Stream Simulator");

    // Load configuration from CLI arguments and optional config file
    let config = match RuntimeConfig::from_cli_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("Configuration validation failed: {}", e);
        process::exit(1);
    }

    let service = match build_service(&config) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to initialize simulation: {:#}", e);
            eprintln!("Failed to initialize simulation: {:#}", e);
            process::exit(1);
        }
    };

    // Handle dry run mode
    if args.dry_run {
        eprintln!("Configuration validation successful!");
        eprintln!("Dry run mode - nothing will be streamed or generated.");
        print_configuration_summary(&config, &service);
        return;
    }

    let outcome = match args.command.clone().unwrap_or(Command::Stream) {
        Command::Stream => {
            print_configuration_summary(&config, &service);
            run_stream(&config, &service).await
        }
        Command::Generate { start, end, step_seconds } => {
            run_generate(&service, &start, &end, step_seconds).await
        }
        Command::Preview { hours, interval_minutes, max_samples } => {
            run_preview(&service, PreviewRequest { hours, interval_minutes, max_samples }).await
        }
    };

    if let Err(e) = outcome {
        error!("Simulation failed: {:#}", e);
        eprintln!("Simulation failed: {:#}", e);
        process::exit(1);
    }

    info!("Energy Stream Simulator finished");
}

/// Load the installation and assemble the service
fn build_service(config: &RuntimeConfig) -> Result<SimulationService> {
    let installation = match &config.installation_path {
        Some(path) => Installation::from_file(path)
            .with_context(|| format!("loading installation from {}", path))?,
        None => Installation::default_household().context("building the default household")?,
    };

    Ok(SimulationService::from_config(config, installation)?)
}

/// Stream until Ctrl-C
async fn run_stream(config: &RuntimeConfig, service: &SimulationService) -> Result<()> {
    let bus = bus_from_config(config);
    eprintln!("Streaming on {} (press Ctrl-C to stop)", service.streaming_parameters().topic);

    let handle = service.start_publisher(bus);
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    eprintln!("Stopping publisher...");
    let stats = handle.shutdown().await;
    eprintln!(
        "Published {} messages ({} failed, {} ticks dropped, {} reconnects)",
        stats.published, stats.failed, stats.dropped, stats.reconnects
    );
    Ok(())
}

/// Generate an absolute range and print it as JSON lines
async fn run_generate(
    service: &SimulationService,
    start: &str,
    end: &str,
    step_seconds: f64,
) -> Result<()> {
    let range = GenerationRange::between(
        parse_timestamp("start", start)?,
        parse_timestamp("end", end)?,
        step_seconds,
    )?;

    let series = service.generate(GenerationRequest::new(range)).await?;
    write_series(&series)
}

/// Preview the upcoming hours and print them as JSON lines
async fn run_preview(service: &SimulationService, request: PreviewRequest) -> Result<()> {
    let series = service.preview(request).await?;
    write_series(&series)
}

/// One sample per line on stdout, statistics on stderr
fn write_series(series: &GeneratedSeries) -> Result<()> {
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    for sample in &series.samples {
        serde_json::to_writer(&mut writer, sample)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    let stats = &series.statistics;
    eprintln!(
        "{} samples: min {:.2}, max {:.2}, average {:.2} {}; total {:.2} {}{}",
        stats.count,
        stats.min,
        stats.max,
        stats.average,
        series.output_unit.label(),
        stats.total_energy,
        stats.energy_unit,
        if series.truncated { " (truncated)" } else { "" }
    );
    Ok(())
}

/// Print configuration summary
fn print_configuration_summary(config: &RuntimeConfig, service: &SimulationService) {
    let streaming = service.streaming_parameters();
    let installation = service.installation();

    eprintln!("Energy Stream Simulator");
    eprintln!("=======================");
    eprintln!("Configuration:");
    eprintln!("  Bus: {} ({}:{})", config.bus, config.broker_host, config.broker_port);
    eprintln!("  Topic: {}", streaming.topic);
    eprintln!("  Tick Interval: {} ms", config.tick_interval_ms);
    eprintln!("  Output Unit: {}", streaming.output_unit);
    eprintln!("  Time Unit: {}", streaming.time_unit);
    eprintln!("  Time Speed: {}x", streaming.time_speed);
    eprintln!("  Mode: {}", streaming.mode);
    if let Some(start) = streaming.simulation_start_time {
        eprintln!("  Replay Start: {}", start.to_rfc3339());
    }
    eprintln!(
        "  Installation: {} ({} devices, meter base {} W)",
        installation.name,
        installation.devices.len(),
        installation.base_consumption
    );
    for device in &installation.devices {
        eprintln!("    - {} [{}]", device.name, device.algorithm_type());
    }
    eprintln!();
}
