use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use nova_fake_adb::config::CONFIG_ENV_VAR;
use nova_fake_adb::{init_tracing, DeviceConfig, FakeAdbConfig, FakeAdbServer};

/// Fake ADB server for exercising ADB clients without a device.
#[derive(Debug, Parser)]
#[command(name = "nova-fake-adb", version, about)]
struct Cli {
    /// Path to a TOML config file.
    ///
    /// If unset, `NOVA_FAKE_ADB_CONFIG` is used as a fallback. When neither
    /// are provided the server starts with in-memory defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `server.listen`.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Adds a device with this serial. May be repeated.
    #[arg(long = "device", value_name = "SERIAL")]
    devices: Vec<String>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config);
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    for serial in cli.devices {
        config = config.with_device(DeviceConfig::new(serial));
    }
    init_tracing(&config.logging);

    let server = FakeAdbServer::spawn(config).await?;
    println!("listening on {}", server.addr());

    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = server.stopped() => {}
    }
    tracing::info!(target: "nova.fake_adb", "shutting down");
    Ok(())
}

fn load_config(cli_path: Option<PathBuf>) -> FakeAdbConfig {
    let path = cli_path.or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
    let Some(path) = path else {
        return FakeAdbConfig::default();
    };

    match FakeAdbConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "nova-fake-adb: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            FakeAdbConfig::default()
        }
    }
}
