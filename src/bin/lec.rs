//! `lec`: query a load estimation server once and print the answer.

use std::net::{SocketAddr, ToSocketAddrs};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use les::{LoadClient, OutputFormat, Protocol};

#[derive(Parser, Debug)]
#[command(name = "lec")]
#[command(about = "Query a load estimation server")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "7575")]
    port: u16,

    /// Transport (udp or tcp)
    #[arg(long, default_value = "udp")]
    protocol: Protocol,

    /// Output format: raw, json or short
    #[arg(short, long, default_value = "raw")]
    format: OutputFormat,

    /// Response timeout in milliseconds
    #[arg(short, long, default_value = "2000")]
    timeout: u64,
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("could not resolve {}", host))?
        .next()
        .with_context(|| format!("no address for {}", host))
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let server = resolve(&args.host, args.port)?;

    let result = LoadClient::new(args.protocol, server)
        .with_timeout(Duration::from_millis(args.timeout))
        .query();
    if let Err(e) = &result {
        debug!(error = %e, %server, "query failed");
    }

    let output = args.format.render(result.as_ref());
    if args.format == OutputFormat::Raw {
        print!("{}", output);
    } else {
        println!("{}", output);
    }

    Ok(if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
