//! sgsync - Declarative security group management for AWS EC2
//!
//! Converges EC2 security groups to the state declared in a definition file.
//!
//! This is the main entry point for the sgsync CLI.

mod cli;

use cli::commands::CommandContext;
use cli::{Cli, Commands};
use sgsync::config::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Display version if verbose
    if cli.verbosity() >= 2 {
        eprintln!("sgsync v{}", VERSION);
    }

    // Load configuration
    let config = Config::load(cli.config.as_ref()).unwrap_or_else(|e| {
        if cli.verbosity() >= 1 {
            eprintln!("Warning: Failed to load config: {}", e);
        }
        Config::default()
    });

    // Create command context
    let mut ctx = CommandContext::new(&cli, config);

    // Execute the appropriate command
    let result = match &cli.command {
        Commands::Apply(args) => args.execute(&mut ctx).await,
        Commands::Validate(args) => args.execute(&mut ctx),
        Commands::Modules(args) => args.execute(&mut ctx),
        Commands::Completions(args) => {
            cli::completions::generate_completions(args.shell);
            Ok(0)
        }
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            ctx.output.error(&e.to_string());
            e.exit_code()
        }
    };

    ctx.output.flush();
    std::process::exit(exit_code);
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}
