// Handshake - Sub-protocol negotiation and identity exchange
//
// Both sides write one JSON `Hello` line, then read the remote one. The
// remote protocol tag must match ours. With a secure channel the Hello also
// carries a signed ephemeral key used to derive the frame cipher.

use crate::identity::{decode_public_key, NodeIdentity};
use crate::transport::channel::{BoxedReader, DuplexChannel, FrameReader, FrameWriter};
use crate::transport::secure::{EphemeralKey, Role};
use crate::transport::TransportError;
use libp2p::PeerId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::time::timeout;

/// Domain separator for the ephemeral key signature
const SIGNATURE_CONTEXT: &[u8] = b"chainsync-handshake:";

/// Largest Hello line accepted
const MAX_HELLO_LEN: usize = 8 * 1024;

/// First line each side sends on a new connection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hello {
    pub protocol: String,
    /// Hex protobuf encoding of the identity public key
    pub public_key: String,
    /// Hex compressed secp256k1 key, present iff the sender wants a secure channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_key: Option<String>,
    /// Hex signature over the ephemeral key by the identity key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Parameters for one negotiation
#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    pub protocol: String,
    pub secure: bool,
    pub timeout: Duration,
}

impl HandshakeConfig {
    pub fn new(protocol: &str, secure: bool) -> Self {
        Self {
            protocol: protocol.to_string(),
            secure,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Run the handshake over `stream` and return the resulting channel
///
/// `expected` is the PeerId the dialer intends to reach; the listener passes
/// `None` and learns the remote identity from the Hello.
pub async fn negotiate<S>(
    stream: S,
    identity: &NodeIdentity,
    config: &HandshakeConfig,
    role: Role,
    expected: Option<PeerId>,
) -> Result<DuplexChannel, TransportError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    timeout(config.timeout, exchange(stream, identity, config, role, expected))
        .await
        .map_err(|_| TransportError::Timeout)?
}

async fn exchange<S>(
    stream: S,
    identity: &NodeIdentity,
    config: &HandshakeConfig,
    role: Role,
    expected: Option<PeerId>,
) -> Result<DuplexChannel, TransportError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let boxed: BoxedReader = Box::new(read_half);
    let mut reader = FrameReader::from_buffered(BufReader::new(boxed)).with_max_frame_len(MAX_HELLO_LEN);
    let mut writer = FrameWriter::new(Box::new(write_half));

    let ephemeral = config.secure.then(EphemeralKey::generate);
    let hello = local_hello(identity, &config.protocol, ephemeral.as_ref())?;
    let line = serde_json::to_string(&hello).map_err(|e| TransportError::Handshake(e.to_string()))?;
    writer.send_raw_line(&line).await?;

    let remote_line = reader
        .read_line()
        .await?
        .ok_or_else(|| TransportError::Handshake("connection closed before hello".to_string()))?;
    let remote: Hello = serde_json::from_str(&remote_line)
        .map_err(|e| TransportError::Handshake(format!("invalid hello: {}", e)))?;

    if remote.protocol != config.protocol {
        return Err(TransportError::ProtocolMismatch {
            expected: config.protocol.clone(),
            got: remote.protocol,
        });
    }

    let key_bytes = hex::decode(&remote.public_key)
        .map_err(|e| TransportError::Handshake(format!("invalid public key hex: {}", e)))?;
    let remote_key = decode_public_key(&key_bytes).map_err(|e| TransportError::Handshake(e.to_string()))?;
    let remote_peer = remote_key.to_peer_id();

    if let Some(expected) = expected {
        if expected != remote_peer {
            return Err(TransportError::PeerIdMismatch {
                expected: expected.to_string(),
                got: remote_peer.to_string(),
            });
        }
    }

    let reader = reader.with_max_frame_len(crate::transport::channel::DEFAULT_MAX_FRAME_LEN);

    match (ephemeral, remote.ephemeral_key, remote.signature) {
        (None, None, _) => Ok(DuplexChannel::new(remote_peer, config.protocol.clone(), reader, writer)),
        (Some(ephemeral), Some(remote_ephemeral), Some(signature)) => {
            let remote_ephemeral = hex::decode(&remote_ephemeral)
                .map_err(|e| TransportError::Handshake(format!("invalid ephemeral key hex: {}", e)))?;
            let signature = hex::decode(&signature)
                .map_err(|e| TransportError::Handshake(format!("invalid signature hex: {}", e)))?;

            if !remote_key.verify(&signed_message(&remote_ephemeral), &signature) {
                return Err(TransportError::Handshake("ephemeral key signature invalid".to_string()));
            }

            let (sealer, opener) = ephemeral
                .agree(&remote_ephemeral, role)
                .map_err(TransportError::Handshake)?;

            Ok(DuplexChannel::new(
                remote_peer,
                config.protocol.clone(),
                reader.with_opener(opener),
                writer.with_sealer(sealer),
            ))
        }
        (Some(_), Some(_), None) => Err(TransportError::Handshake("ephemeral key is not signed".to_string())),
        (local, remote_ephemeral, _) => Err(TransportError::SecureMismatch {
            local: local.is_some(),
            remote: remote_ephemeral.is_some(),
        }),
    }
}

fn local_hello(
    identity: &NodeIdentity,
    protocol: &str,
    ephemeral: Option<&EphemeralKey>,
) -> Result<Hello, TransportError> {
    let (ephemeral_key, signature) = match ephemeral {
        Some(key) => {
            let public = key.public_bytes();
            let signature = identity
                .sign(&signed_message(&public))
                .map_err(|e| TransportError::Handshake(e.to_string()))?;
            (Some(hex::encode(public)), Some(hex::encode(signature)))
        }
        None => (None, None),
    };

    Ok(Hello {
        protocol: protocol.to_string(),
        public_key: hex::encode(identity.encoded_public_key()),
        ephemeral_key,
        signature,
    })
}

fn signed_message(ephemeral_public: &[u8]) -> Vec<u8> {
    let mut msg = SIGNATURE_CONTEXT.to_vec();
    msg.extend_from_slice(ephemeral_public);
    msg
}
