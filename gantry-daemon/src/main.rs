use anyhow::Result;
use clap::Parser;

use gantry_daemon::cli::DaemonCli;
use gantry_daemon::logging;
use gantry_daemon::run;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();
    let config = cli.build_config()?;

    logging::init_tracing(&config.general)?;
    tracing::info!("gantry-daemon starting");

    let advertise = cli.advertise_route();
    run::run(config, advertise).await
}
