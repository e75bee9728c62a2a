use clap::Parser;
use confidant::config::{Cli, Config};
use daemon_common::{maybe_daemonize, try_init_tracing};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    try_init_tracing(cli.log_level)?;

    // Fork before the runtime spawns its worker threads.
    maybe_daemonize(cli.daemon)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            let cfg = Config::from_cli(&cli).await?;
            info!(
                host = %cfg.server.host,
                port = cfg.server.port,
                data_dir = %cfg.server.data_dir.display(),
                "starting confidant"
            );
            confidant::app::run(cfg).await
        })
}
