//! Entry point for `udp-ft`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client**
//! mode.  All actual protocol work is delegated to library modules; `main.rs`
//! owns only process setup (logging, argument parsing, exit status).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use udp_ft::client;
use udp_ft::gremlin::GremlinConfig;
use udp_ft::server::Server;
use udp_ft::timer::TransferConfig;

/// Reliable UDP file transfer with a built-in fault injector.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run as a server, handing out files to clients.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:10050).
        #[arg(short, long, default_value = "0.0.0.0:10050")]
        bind: SocketAddr,
        /// Percent chance each outbound data frame is corrupted.
        #[arg(long, default_value_t = 0)]
        corrupt: u8,
        /// Percent chance each outbound data frame is dropped.
        #[arg(long, default_value_t = 0)]
        loss: u8,
        /// Percent chance each outbound data frame is delayed.
        #[arg(long, default_value_t = 0)]
        delay_chance: u8,
        /// How long a delayed frame is held back, in milliseconds.
        #[arg(long, default_value_t = 50)]
        delay_ms: u64,
        /// Seed for the fault injector, for reproducible runs.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run as a client, fetching one file from a server.
    Client {
        /// Remote server address (e.g. 127.0.0.1:10050).
        #[arg(short, long)]
        server: SocketAddr,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Name of the file to request.
        #[arg(short, long)]
        file: String,
        /// Where to write the received file (defaults to the requested name).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            bind,
            corrupt,
            loss,
            delay_chance,
            delay_ms,
            seed,
        } => {
            let gremlin = GremlinConfig {
                corrupt_chance: corrupt,
                loss_chance: loss,
                delay_chance,
                delay: Duration::from_millis(delay_ms),
                seed,
            };
            let mut server = match Server::bind(bind, gremlin, TransferConfig::default()).await {
                Ok(server) => server,
                Err(err) => {
                    log::error!("[server] cannot bind {bind}: {err}");
                    return ExitCode::FAILURE;
                }
            };
            if let Err(err) = server.run().await {
                log::error!("[server] fatal: {err}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Mode::Client {
            server,
            bind,
            file,
            output,
        } => {
            let output = output.unwrap_or_else(|| {
                Path::new(&file)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(&file))
            });
            match client::run(server, bind, &file, &output, TransferConfig::default()).await {
                Ok(report) => {
                    log::info!(
                        "[client] transfer complete: {} byte(s) in {}",
                        report.bytes,
                        output.display()
                    );
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    log::error!("[client] transfer failed: {err}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
