use clap::Parser;

use ratchet_cli::{execute, Cli};
use ratchet_scheduler::Registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ratchet=info,ratchet_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Applications embed the same surface with the registry their code
    // builds; the bare binary ships an empty one for operational commands.
    execute(cli, Registry::new()).await
}
