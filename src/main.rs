mod cli;
mod domain;
mod error;
mod infrastructure;
mod replay;

use clap::Parser;
use domain::settings::GloveSettings;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    let settings = GloveSettings::load(args.config.as_deref())?;
    let _logging = infrastructure::logging::init_logger(&settings.log)?;
    info!("starting robotic glove controller");

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, shutting down");
            signal_cancel.cancel();
        }
    });

    cli::run(args, settings, cancel).await
}
