// Connector - Dials one remote peer and negotiates the sub-protocol
//
// Exactly one attempt per call; there is no retry or backoff. A failure is
// returned to the caller, which decides whether the node carries on.

use crate::identity::NodeIdentity;
use crate::transport::address::{socket_target, DialTarget};
use crate::transport::address_book::AddressBook;
use crate::transport::channel::DuplexChannel;
use crate::transport::handshake::{negotiate, HandshakeConfig};
use crate::transport::secure::Role;
use crate::transport::TransportError;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Dials peers as `identity`
#[derive(Clone, Debug)]
pub struct Connector {
    identity: NodeIdentity,
    handshake: HandshakeConfig,
    address_book: AddressBook,
    connect_timeout: Duration,
}

impl Connector {
    pub fn new(identity: NodeIdentity, handshake: HandshakeConfig, address_book: AddressBook) -> Self {
        Self {
            identity,
            handshake,
            address_book,
            connect_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Open one channel to the peer named by `target`
    ///
    /// The target's addresses are recorded in the address book first; every
    /// address known for the peer is tried in order until one TCP connection
    /// succeeds, and that connection is the only one negotiated.
    pub async fn connect(&self, cancel: &CancellationToken, target: &str) -> Result<DuplexChannel, TransportError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.dial(target) => result,
        }
    }

    async fn dial(&self, target: &str) -> Result<DuplexChannel, TransportError> {
        let target = DialTarget::parse(target)?;
        let peer_id = target.peer_id();

        self.address_book.add_addrs(peer_id, [target.address().clone()]);
        let addrs = self.address_book.addrs(&peer_id);

        let mut last_error = TransportError::NoKnownAddress(peer_id.to_string());
        for addr in addrs {
            let socket = match socket_target(&addr) {
                Ok(socket) => socket,
                Err(e) => {
                    debug!(addr = %addr, error = %e, "Skipping undialable address");
                    last_error = e;
                    continue;
                }
            };

            let address = socket.to_string();
            let connected = timeout(self.connect_timeout, TcpStream::connect((socket.host.as_str(), socket.port)))
                .await
                .map_err(|_| TransportError::Timeout)
                .and_then(|r| r.map_err(|source| TransportError::ConnectionFailed {
                    address: address.clone(),
                    source,
                }));

            let stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(peer = %peer_id, addr = %address, error = %e, "Dial failed");
                    last_error = e;
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "Could not set TCP_NODELAY");
            }

            let channel = negotiate(stream, &self.identity, &self.handshake, Role::Dialer, Some(peer_id)).await?;
            info!(peer = %peer_id, addr = %address, secure = channel.is_secure(), "Established connection to destination");
            return Ok(channel);
        }

        Err(last_error)
    }
}
