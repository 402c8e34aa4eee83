mod api;
mod buffer;
mod cli;
mod config;
mod daemon;
mod history;
mod identity;
mod version;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = config::Cli::parse();

    match cli.command {
        config::Command::Daemon(args) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "agentnet=info".parse().unwrap()),
                )
                .init();

            daemon::run(args.into_config()?).await
        }
        command => cli::run(command).await,
    }
}
