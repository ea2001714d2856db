// Copyright AGNTCY Contributors (https://github.com/agntcy)
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use typedrpc::{Client, ClientConfig, LocalTransport, Mode, Server};
use typedrpc_tracing::TracingConfiguration;
use uuid::Uuid;

use common::{PingRequest, PingResponse, ping_declarations, ping_service};

#[derive(Parser, Debug)]
#[command(name = "typedrpc-demo")]
#[command(about = "Typed RPC example: schema derivation and calls", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "TYPEDRPC_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the schema derived for the example service
    Schema {
        #[arg(long, value_enum, default_value_t = ModeArg::Structured)]
        mode: ModeArg,
    },
    /// Call `ping`, in process or on a remote gRPC server
    Ping {
        /// gRPC endpoint; the call stays in process if not set
        #[arg(short, long)]
        endpoint: Option<String>,

        #[arg(short, long, default_value = "1s", value_parser = parse_duration)]
        timeout: Duration,

        #[arg(long, value_enum, default_value_t = ModeArg::Structured)]
        mode: ModeArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Structured,
    Passthrough,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Structured => Mode::Structured,
            ModeArg::Passthrough => Mode::Passthrough,
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    duration_str::parse(value).map_err(|e| e.to_string())
}

fn print_schema(mode: Mode) -> Result<()> {
    let mut service = ping_service(mode)?;
    let handle = service.resolve_schema()?;
    print!("{}", handle.idl());
    Ok(())
}

async fn ping(endpoint: Option<String>, timeout: Duration, mode: Mode) -> Result<()> {
    let client = match endpoint {
        Some(endpoint) => {
            let config = ClientConfig::with_endpoint(&endpoint).with_timeout(timeout);
            Client::connect(ping_declarations(mode)?, &config)
                .await
                .with_context(|| format!("cannot connect to {}", endpoint))?
        }
        None => {
            let server = Server::builder().add_service(ping_service(mode)?)?.build()?;
            Client::new(ping_declarations(mode)?, LocalTransport::new(server))?.with_timeout(timeout)
        }
    };

    let request = PingRequest { id: Uuid::new_v4() };
    let response: PingResponse = client
        .unary("ping", &request)
        .await
        .context("ping failed")?;

    info!(id = %response.id, timestamp = %response.timestamp, "pong");
    println!("{} {}", response.id, response.timestamp.to_rfc3339());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    TracingConfiguration::default()
        .with_log_level(args.log_level.as_str())
        .with_filter(args.log_level.as_str())
        .setup_tracing_subscriber()?;

    match args.command {
        Command::Schema { mode } => print_schema(mode.into()),
        Command::Ping {
            endpoint,
            timeout,
            mode,
        } => ping(endpoint, timeout, mode.into()).await,
    }
}
