use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use les::{monitor, LoadEstimator, Protocol, RequestServer, Settings, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "les")]
#[command(about = "Serve a network load estimate derived from PTP delay samples")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// Transport to serve on (udp or tcp)
    #[arg(long)]
    protocol: Option<Protocol>,

    /// Serial device delivering delay samples
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// Read samples from a recorded capture instead of the serial device
    #[arg(long, conflicts_with = "device")]
    replay: Option<PathBuf>,

    /// Sample log file
    #[arg(short, long)]
    outfile: Option<PathBuf>,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(protocol) = self.protocol {
            settings.protocol = protocol;
        }
        if let Some(device) = self.device {
            settings.tty_device = device;
        }
        if let Some(replay) = self.replay {
            settings.replay = Some(replay);
        }
        if let Some(outfile) = self.outfile {
            settings.outfile = outfile;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut settings =
        Settings::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut settings);
    settings.validate()?;

    info!(
        protocol = %settings.protocol,
        addr = %settings.listen_addr(),
        device = %settings.tty_device.display(),
        speed = settings.tty_speed,
        replay = ?settings.replay,
        outfile = %settings.outfile.display(),
        fit_function = %settings.fit_function,
        smoothing = settings.smoothing,
        window_size = settings.window_size,
        low_delay_threshold = settings.low_delay_threshold,
        skip_sync = settings.skip_sync,
        "configuration"
    );

    let estimator = Arc::new(LoadEstimator::new(
        settings.estimator_params()?,
        settings.curve()?,
    ));

    let shutdown = Shutdown::new();
    shutdown
        .install_signal_handler()
        .context("failed to install signal handler")?;

    let server = RequestServer::bind(
        settings.protocol,
        settings.listen_addr(),
        estimator.clone(),
        shutdown.clone(),
        settings.receive_timeout(),
    )
    .with_context(|| format!("failed to bind {} port {}", settings.protocol, settings.port))?;

    let monitor = monitor::spawn(&settings, estimator, shutdown.clone())
        .context("failed to start monitor thread")?;

    let served = server.run();
    // Make sure the monitor also stops if the server loop failed
    shutdown.request_stop();
    let joined = monitor.join();
    shutdown.mark_stopped();

    joined.map_err(|_| anyhow!("monitor thread panicked"))?;
    let stats = served.context("request server failed")?;
    info!(served = stats.served, dropped = stats.dropped, "les stopped");
    Ok(())
}
