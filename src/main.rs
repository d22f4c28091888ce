use anyhow::Result;
use clap::Parser;
use moneta::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("moneta={}", cli.log).into()),
        )
        .init();

    cli.run().await
}
