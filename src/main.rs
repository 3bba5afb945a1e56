use anyhow::Result;
use clap::Parser;
use tracing::{debug, error, info};

use carcount::error::SourceError;
use carcount::{spawn_session, CarcountConfig, CounterError, KeyboardInputHandler, PipelineDriver};

#[derive(Parser, Debug)]
#[command(name = "carcount")]
#[command(about = "Count vehicles crossing a line in a video stream")]
#[command(version)]
#[command(long_about = "Learns the static background of a fixed camera view, extracts moving \
blobs from each frame and counts every blob whose centre reaches a horizontal counting line. \
Reads a directory of still frames, or a video file when built with the `video` feature.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "carcount.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Video file or frame directory, overrides [source].path
    #[arg(short, long, value_name = "PATH")]
    source: Option<String>,

    /// Row of the counting line in pixels
    #[arg(long, value_name = "ROW")]
    count_line: Option<u32>,

    /// Half-height of the counting band in pixels
    #[arg(long, value_name = "PIXELS")]
    offset: Option<u32>,

    /// Minimum blob width in pixels
    #[arg(long, value_name = "PIXELS")]
    min_width: Option<u32>,

    /// Minimum blob height in pixels
    #[arg(long, value_name = "PIXELS")]
    min_height: Option<u32>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<String>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without counting")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Stop the session with q or Esc
    #[arg(long)]
    interactive: bool,

    /// Write the JSON session report here instead of stdout
    #[arg(long, value_name = "PATH")]
    report: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting carcount v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match CarcountConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    apply_overrides(&mut config, &args);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let mut driver = PipelineDriver::new();
    if let Err(e) = driver.start_session_from_path(&config.source.path, &config) {
        error!("Cannot start counting session: {}", e);
        eprintln!("✗ {}", e);
        let code = match e {
            CounterError::Source(SourceError::Unavailable { .. }) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }

    let mut session = spawn_session(driver, config.session.channel_capacity)?;

    let keyboard = args.interactive.then(|| {
        let handler = KeyboardInputHandler::new(session.stop_handle());
        handler.start();
        handler
    });

    let ctrl_c_stop = session.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current frame");
            ctrl_c_stop.request_stop();
        }
    });

    let mut last_count = 0;
    while let Some(output) = session.recv().await {
        if output.count != last_count {
            info!("Frame {}: count {}", output.frame_index, output.count);
            last_count = output.count;
        } else {
            debug!(
                "Frame {}: {} blobs",
                output.frame_index,
                output.blobs.len()
            );
        }
    }

    let result = session.join().await;

    if let Some(handler) = keyboard {
        handler.stop().await;
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!("Counting session failed: {}", e);
            eprintln!("✗ Counting session failed: {}", e);
            std::process::exit(1);
        }
    };

    match &args.report {
        Some(path) => {
            report.write_to(path)?;
            info!("Session report written to {}", path);
        }
        None => println!("{}", report.to_json_pretty()?),
    }

    info!(
        "Counted {} vehicles in {} frames",
        report.final_count, report.frames_processed
    );

    Ok(())
}

fn apply_overrides(config: &mut CarcountConfig, args: &Args) {
    if let Some(source) = &args.source {
        config.source.path = source.clone();
    }
    if let Some(count_line) = args.count_line {
        config.line.count_line = count_line;
    }
    if let Some(offset) = args.offset {
        config.line.offset = offset;
    }
    if let Some(min_width) = args.min_width {
        config.blob.min_width = min_width;
    }
    if let Some(min_height) = args.min_height {
        config.blob.min_height = min_height;
    }
}

fn init_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use std::path::Path;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("carcount={}", log_level)));

    // Console logs go to stderr so the session report can own stdout
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .with_writer(std::io::stderr)
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match args.log_file.as_deref() {
        Some(log_file) => {
            let path = Path::new(log_file);
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Log file path '{}' has no file name", log_file))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Carcount Configuration File");
    println!("# This is the default configuration with all available options");
    println!();
    println!("{}", CarcountConfig::default().to_toml()?);
    Ok(())
}
