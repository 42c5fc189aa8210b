// Listener - Accepts inbound connections for the sub-protocol
//
// Binds the node's TCP port, negotiates each accepted connection and hands
// the resulting channel to the registered handler.

use crate::identity::NodeIdentity;
use crate::transport::address::dial_address;
use crate::transport::channel::DuplexChannel;
use crate::transport::handshake::{negotiate, HandshakeConfig};
use crate::transport::secure::Role;
use crate::transport::TransportError;
use libp2p::Multiaddr;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Called once per successfully negotiated inbound channel
pub type ChannelHandler = Arc<dyn Fn(DuplexChannel) + Send + Sync>;

/// A bound listening socket plus the identity it answers as
pub struct Listener {
    socket: TcpListener,
    local_addr: SocketAddr,
    identity: NodeIdentity,
    handshake: HandshakeConfig,
}

impl Listener {
    /// Bind `host:port`; failure here is fatal to the node
    pub async fn bind(
        host: &str,
        port: u16,
        identity: NodeIdentity,
        handshake: HandshakeConfig,
    ) -> Result<Self, TransportError> {
        let bind_addr = format!("{}:{}", host, port);
        let socket = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| TransportError::BindFailed {
                address: bind_addr.clone(),
                source,
            })?;
        let local_addr = socket.local_addr().map_err(|source| TransportError::BindFailed {
            address: bind_addr,
            source,
        })?;

        Ok(Self {
            socket,
            local_addr,
            identity,
            handshake,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Addresses other nodes can dial, each ending in `/p2p/<our peer id>`
    ///
    /// An unspecified bind address is advertised as loopback.
    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        let ip = if self.local_addr.ip().is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.local_addr.ip()
        };
        vec![dial_address(ip, self.local_addr.port(), self.identity.peer_id())]
    }

    /// Accept until `cancel` fires, negotiating each connection on its own task
    ///
    /// Negotiation tasks are spawned on `tasks`, so waiting on the tracker also
    /// waits for handshakes still in flight.
    pub async fn run(self, cancel: CancellationToken, tasks: TaskTracker, handler: ChannelHandler) {
        info!(addr = %self.local_addr, protocol = %self.handshake.protocol, "Listening for inbound channels");

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.socket.accept() => accepted,
            };

            let (stream, remote_addr) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "Could not set TCP_NODELAY");
            }

            let identity = self.identity.clone();
            let handshake = self.handshake.clone();
            let handler = handler.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let negotiated = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    negotiated = negotiate(stream, &identity, &handshake, Role::Listener, None) => negotiated,
                };

                match negotiated {
                    Ok(channel) => {
                        info!(peer = %channel.remote_peer(), addr = %remote_addr, "Accepted inbound channel");
                        handler(channel);
                    }
                    Err(e) => warn!(addr = %remote_addr, error = %e, "Inbound handshake failed"),
                }
            });
        }

        debug!(addr = %self.local_addr, "Listener stopped");
    }
}
