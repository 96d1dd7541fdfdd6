use clap::Parser;
use salesboard::cli::Cli;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log filter variable, e.g. `SALESBOARD_LOG=salesboard=debug`
const LOG_ENV: &str = "SALESBOARD_LOG";

fn main() -> anyhow::Result<()> {
    // stdout carries reports and JSON, logs go to stderr
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("salesboard=info")),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    cli.run()
}
