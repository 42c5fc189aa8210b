// Dial Addresses - Multiaddress parsing for the peer connector
//
// A dial target names both where to connect and who to expect:
//   /ip4/127.0.0.1/tcp/3001/p2p/12D3KooW...

use crate::transport::TransportError;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Network location extracted from a multiaddress
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketTarget {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for SocketTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A remote peer identity plus the address it can be reached on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialTarget {
    peer_id: PeerId,
    address: Multiaddr,
}

impl DialTarget {
    /// Parse a full `/.../tcp/<port>/p2p/<peer-id>` address
    pub fn parse(target: &str) -> Result<Self, TransportError> {
        let mut address = Multiaddr::from_str(target.trim())
            .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", target, e)))?;

        let peer_id = match address.pop() {
            Some(Protocol::P2p(peer_id)) => peer_id,
            _ => return Err(TransportError::MissingPeerId(target.to_string())),
        };

        // Fail early on addresses we cannot dial
        socket_target(&address)?;

        Ok(Self { peer_id, address })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// The transport part of the address, without the `/p2p` suffix
    pub fn address(&self) -> &Multiaddr {
        &self.address
    }
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/p2p/{}", self.address, self.peer_id)
    }
}

/// Resolve a multiaddress to a host/port pair dialable over TCP
///
/// Accepts ip4, ip6 and dns hosts followed by a tcp port. A trailing
/// `/p2p/<id>` component is ignored.
pub fn socket_target(address: &Multiaddr) -> Result<SocketTarget, TransportError> {
    let mut host = None;
    let mut port = None;

    for component in address.iter() {
        match component {
            Protocol::Ip4(ip) => host = Some(ip.to_string()),
            Protocol::Ip6(ip) => host = Some(ip.to_string()),
            Protocol::Dns(name) | Protocol::Dns4(name) | Protocol::Dns6(name) => {
                host = Some(name.to_string())
            }
            Protocol::Tcp(p) => port = Some(p),
            Protocol::P2p(_) => {}
            other => {
                return Err(TransportError::UnsupportedAddress(format!(
                    "{} (unsupported component {})",
                    address, other
                )))
            }
        }
    }

    match (host, port) {
        (Some(host), Some(port)) => Ok(SocketTarget { host, port }),
        _ => Err(TransportError::UnsupportedAddress(address.to_string())),
    }
}

/// Build the multiaddress other nodes use to dial `ip:port` as `peer_id`
pub fn dial_address(ip: IpAddr, port: u16, peer_id: PeerId) -> Multiaddr {
    let ip_component = match ip {
        IpAddr::V4(v4) => Protocol::Ip4(v4),
        IpAddr::V6(v6) => Protocol::Ip6(v6),
    };

    Multiaddr::empty()
        .with(ip_component)
        .with(Protocol::Tcp(port))
        .with(Protocol::P2p(peer_id))
}
