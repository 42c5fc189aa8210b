// Node Configuration - Startup options and their validation

use crate::sync::DEFAULT_BROADCAST_INTERVAL;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default genesis timestamp; peers must agree on it to share a genesis block
pub const DEFAULT_GENESIS_TIMESTAMP: &str = "genesis";

/// Configuration errors; all of them are fatal at startup
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Please provide a port to bind on with -l")]
    MissingListenPort,

    #[error("Broadcast interval must be greater than zero")]
    ZeroBroadcastInterval,

    #[error("Production interval must be greater than zero")]
    ZeroProduceInterval,
}

/// Everything a node needs to start
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Interface to bind the listener on
    pub listen_host: String,
    /// Port to bind the listener on; `Some(0)` lets the OS pick one
    pub listen_port: Option<u16>,
    /// Peer to dial at startup, `/ip4/.../tcp/.../p2p/<peer-id>`
    pub target: Option<String>,
    /// Encrypt channel frames
    pub secure: bool,
    /// Identity seed; 0 picks a random identity
    pub seed: u64,
    /// Cadence of full-ledger broadcasts
    pub broadcast_interval: Duration,
    /// Automatic counter-block production cadence
    pub produce_interval: Option<Duration>,
    /// Check every link of a longer remote chain before adopting it; off means trust by length
    pub verify_remote_chains: bool,
    /// Timestamp of the shared genesis block
    pub genesis_timestamp: String,
    /// Produce blocks from integers typed on standard input
    pub read_stdin: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: None,
            target: None,
            secure: false,
            seed: 0,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            produce_interval: None,
            verify_remote_chains: false,
            genesis_timestamp: DEFAULT_GENESIS_TIMESTAMP.to_string(),
            read_stdin: false,
        }
    }
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listen_host(mut self, host: &str) -> Self {
        self.listen_host = host.to_string();
        self
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    pub fn with_produce_interval(mut self, interval: Option<Duration>) -> Self {
        self.produce_interval = interval;
        self
    }

    pub fn with_verify_remote_chains(mut self, verify: bool) -> Self {
        self.verify_remote_chains = verify;
        self
    }

    pub fn with_genesis_timestamp(mut self, timestamp: &str) -> Self {
        self.genesis_timestamp = timestamp.to_string();
        self
    }

    pub fn with_read_stdin(mut self, read_stdin: bool) -> Self {
        self.read_stdin = read_stdin;
        self
    }

    /// Validate the configuration
    ///
    /// The dial target is not checked here: a bad target only aborts the
    /// outbound attempt, the node itself still runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_port.is_none() {
            return Err(ConfigError::MissingListenPort);
        }

        if self.broadcast_interval.is_zero() {
            return Err(ConfigError::ZeroBroadcastInterval);
        }

        if matches!(self.produce_interval, Some(interval) if interval.is_zero()) {
            return Err(ConfigError::ZeroProduceInterval);
        }

        Ok(())
    }
}
