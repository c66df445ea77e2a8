//! `mqttv3` — run the MQTT v3.1.1 broker from the command line.

use anyhow::Context;
use clap::Parser;
use mqtt3::broker::{BrokerConfig, MqttBroker};
use mqtt3::MqttError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_BIND_FAILURE: u8 = 1;
const EXIT_FATAL_IO: u8 = 2;

#[derive(Parser)]
#[command(name = "mqttv3", version, about = "MQTT v3.1.1 broker")]
struct Cli {
    /// Configuration file (JSON); flags below override its values
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, short = 'H')]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, short)]
    port: Option<u16>,

    /// Allow connections that carry no username
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    allow_anonymous: Option<bool>,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> anyhow::Result<BrokerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => BrokerConfig::default(),
    };
    if let Some(host) = &cli.host {
        config.listen_host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.listen_port = port;
    }
    if let Some(allow) = cli.allow_anonymous {
        config.allow_anonymous = allow;
    }
    Ok(config)
}

async fn run(config: BrokerConfig) -> mqtt3::Result<()> {
    let broker = MqttBroker::bind(config).await?;
    let shutdown = broker.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
            let _ = shutdown.send(());
        }
    });
    broker.run().await
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            error!("{err:#}");
            return ExitCode::from(EXIT_BIND_FAILURE);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to start runtime: {err}");
            return ExitCode::from(EXIT_FATAL_IO);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(MqttError::Configuration(msg)) => {
            error!("{msg}");
            ExitCode::from(EXIT_BIND_FAILURE)
        }
        Err(err) => {
            error!("fatal: {err}");
            ExitCode::from(EXIT_FATAL_IO)
        }
    }
}
