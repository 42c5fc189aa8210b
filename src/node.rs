// Node - Wires the ledger, identity, listener, connector and producers together
//
// One ledger per node, owned here and handed to every component by handle.
// Listener bind failure is fatal; an unreachable dial target is not.

use crate::config::{ConfigError, NodeConfig};
use crate::identity::{IdentityError, NodeIdentity};
use crate::ledger::{Block, SharedLedger};
use crate::sync::{BlockProducer, BroadcastConfig, SyncSession};
use crate::transport::{
    AddressBook, ChannelHandler, Connector, DuplexChannel, HandshakeConfig, Listener, TransportError,
    PROTOCOL_ID,
};
use libp2p::{Multiaddr, PeerId};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

/// Errors that stop a node from starting
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// A configured node that has not started networking yet
pub struct Node {
    config: NodeConfig,
    identity: NodeIdentity,
    ledger: SharedLedger,
    address_book: AddressBook,
}

impl Node {
    /// Validate `config`, create the identity and the genesis-only ledger
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        config.validate()?;

        let identity = NodeIdentity::from_optional_seed(config.seed)?;
        let ledger = SharedLedger::with_genesis(Block::genesis(config.genesis_timestamp.as_str()))
            .with_remote_verification(config.verify_remote_chains);

        Ok(Self {
            config,
            identity,
            ledger,
            address_book: AddressBook::new(),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn peer_id(&self) -> PeerId {
        self.identity.peer_id()
    }

    /// Handle to this node's ledger
    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }

    /// Bind the listener and spawn every long-running task under `cancel`
    pub async fn start(&self, cancel: CancellationToken) -> Result<RunningNode, NodeError> {
        let handshake = HandshakeConfig::new(PROTOCOL_ID, self.config.secure);
        let session = SyncSession::new(
            self.ledger.clone(),
            BroadcastConfig::new().with_interval(self.config.broadcast_interval),
        );
        let tasks = TaskTracker::new();
        let port = self.config.listen_port.ok_or(ConfigError::MissingListenPort)?;

        let listener = Listener::bind(
            &self.config.listen_host,
            port,
            self.identity.clone(),
            handshake.clone(),
        )
        .await?;

        let local_addr = listener.local_addr();
        let listen_addrs = listener.listen_addrs();
        self.announce(local_addr.port(), &listen_addrs);

        let handler = inbound_handler(session.clone(), tasks.clone(), cancel.clone());
        tasks.spawn(listener.run(cancel.clone(), tasks.clone(), handler));

        if let Some(target) = self.config.target.clone() {
            let connector = Connector::new(self.identity.clone(), handshake, self.address_book.clone());
            let cancel = cancel.clone();
            tasks.spawn(async move {
                match connector.connect(&cancel, &target).await {
                    Ok(channel) => {
                        session.run(channel, &cancel).await;
                    }
                    Err(e) => error!(addr = %target, error = %e, "Connection attempt aborted"),
                }
            });
        }

        let producer = BlockProducer::new(self.ledger.clone());
        if let Some(interval) = self.config.produce_interval {
            let producer = producer.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                producer.run_counter(interval, &cancel).await;
            });
        }

        if self.config.read_stdin {
            let cancel = cancel.clone();
            tasks.spawn(async move {
                producer.run_lines(BufReader::new(tokio::io::stdin()), &cancel).await;
            });
        }

        Ok(RunningNode {
            local_addr,
            listen_addrs,
            tasks,
            cancel,
        })
    }

    /// Start, then run until `cancel` fires and every task has wound down
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), NodeError> {
        let running = self.start(cancel.clone()).await?;
        cancel.cancelled().await;
        running.shutdown().await;
        Ok(())
    }

    fn announce(&self, port: u16, listen_addrs: &[Multiaddr]) {
        info!(peer_id = %self.identity.peer_id(), "This node's multiaddresses:");
        for addr in listen_addrs {
            info!(" - {}", addr);
        }
        if let Some(addr) = listen_addrs.first() {
            let secure = if self.config.secure { " --secure" } else { "" };
            info!(
                "Now run \"chainsync-node -l {} -d {}{}\" on a different terminal",
                port.wrapping_add(1),
                addr,
                secure
            );
        }
    }
}

/// Every inbound channel gets its own session, tracked with the node's tasks
fn inbound_handler(session: SyncSession, tasks: TaskTracker, cancel: CancellationToken) -> ChannelHandler {
    Arc::new(move |channel: DuplexChannel| {
        let session = session.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            session.run(channel, &cancel).await;
        });
    })
}

/// A started node
pub struct RunningNode {
    local_addr: SocketAddr,
    listen_addrs: Vec<Multiaddr>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl RunningNode {
    /// The bound socket address (useful when port 0 was requested)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Dialable addresses, each ending in `/p2p/<peer id>`
    pub fn listen_addrs(&self) -> &[Multiaddr] {
        &self.listen_addrs
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("Node stopped");
    }
}
