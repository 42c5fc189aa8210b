// chainsync-node - Command line entry point

use chainsync::{Node, NodeConfig, NodeError};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chainsync-node", version, about = "Keep a hash-linked ledger in sync with one peer")]
struct Cli {
    /// Port to listen on for incoming connections
    #[arg(short = 'l', long = "listen")]
    listen: Option<u16>,

    /// Target peer to dial, e.g. /ip4/127.0.0.1/tcp/3000/p2p/<peer-id>
    #[arg(short = 'd', long = "dial")]
    dial: Option<String>,

    /// Encrypt channel frames (both peers must agree)
    #[arg(long, alias = "secio")]
    secure: bool,

    /// Seed for deterministic identity generation (0 = random)
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Interface to bind on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Seconds between full-ledger broadcasts
    #[arg(long, default_value_t = 5)]
    broadcast_secs: u64,

    /// Produce a counter block every N seconds
    #[arg(long)]
    produce_secs: Option<u64>,

    /// Check every link of a longer remote chain before adopting it
    #[arg(long)]
    verify_chains: bool,

    /// Do not read block payloads from standard input
    #[arg(long)]
    no_stdin: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> NodeConfig {
        let mut config = NodeConfig::new()
            .with_listen_host(&self.host)
            .with_target(self.dial)
            .with_secure(self.secure)
            .with_seed(self.seed)
            .with_broadcast_interval(Duration::from_secs(self.broadcast_secs))
            .with_produce_interval(self.produce_secs.map(Duration::from_secs))
            .with_verify_remote_chains(self.verify_chains)
            .with_read_stdin(!self.no_stdin);

        // -l 0 counts as not provided
        if let Some(port) = self.listen.filter(|port| *port != 0) {
            config = config.with_listen_port(port);
        }
        config
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(node: Node) -> Result<(), NodeError> {
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!(error = %e, "Could not listen for shutdown signal"),
        }
        signal_cancel.cancel();
    });

    node.run(cancel).await
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let node = match Node::new(cli.into_config()) {
        Ok(node) => node,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(node));
    // A pending stdin read would otherwise hold the runtime open
    runtime.shutdown_timeout(Duration::from_secs(1));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Node failed");
            ExitCode::FAILURE
        }
    }
}
