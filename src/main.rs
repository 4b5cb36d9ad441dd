use clap::Parser;
use color_eyre::Result;
use serial_bridge::{cli, config::Config, logging, server};
use tracing::{debug, error, info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    if let Some(command) = cli.command {
        cli::handle_command(command);

        return Ok(());
    }

    logging::init(Level::INFO, None).await;

    let mut config = if let Some(config_path) = cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)
    } else {
        debug!("Default config");
        Config::default()
    };
    config.apply_env_overrides()?;

    let http_port = match cli.port {
        Some(port) => port,
        None => match std::env::var("PORT") {
            Ok(port) => port.parse()?,
            Err(_) => server::DEFAULT_PORT,
        },
    };

    #[cfg(unix)]
    let mut hangup = signal(SignalKind::hangup())?;

    #[cfg(unix)]
    let hangup = async move { hangup.recv().await };

    #[cfg(not(unix))]
    let hangup = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        _ = hangup => {
            info!("Told to hang up, quitting")
        }
        _ = server::run_on_port(config, http_port) => {
            error!("Server returned");
            return Err(color_eyre::eyre::eyre!("Server stopped unexpectedly"));
        }
    }

    logging::shutdown();

    Ok(())
}
