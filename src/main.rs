use anyhow::Result;
use clap::Parser;
use gigecam::{GigecamConfig, GigecamOrchestrator};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "gigecam")]
#[command(about = "GigE machine-vision camera driver node")]
#[command(version)]
#[command(long_about = "A driver node that acquires frames from a single GigE \
machine-vision camera, applies auto-exposure/auto-gain configuration, converts \
raw sensor output to a canonical image format, and publishes each frame on a \
named pub/sub output channel until the process is interrupted.")]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "gigecam.toml",
        help = "Path to TOML configuration file"
    )]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(
        long,
        help = "Validate configuration file and exit without starting the node"
    )]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(
        long,
        value_name = "FORMAT",
        help = "Log output format: json, pretty, or compact"
    )]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config();
        return Ok(());
    }

    // Initialize logging
    init_logging(&args)?;

    info!("Starting gigecam node v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Load and validate configuration
    let config = match GigecamConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("Configuration is valid");
        return Ok(());
    }

    // Create the orchestrator and start the acquisition task
    let mut orchestrator = GigecamOrchestrator::new(config);
    orchestrator.start().map_err(|e| {
        error!("Failed to start acquisition: {}", e);
        e
    })?;

    // Run until an interrupt arrives, then drain and exit
    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Node error during execution: {}", e);
        e
    })?;

    info!("Gigecam node exited with code: {}", exit_code);

    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<()> {
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

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gigecam={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Gigecam Configuration File");
    println!("# camera.id must be set to the serial number of the target device");
    println!();

    match GigecamConfig::default().to_toml() {
        Ok(rendered) => println!("{}", rendered),
        Err(e) => eprintln!("Failed to render default configuration: {}", e),
    }
}
