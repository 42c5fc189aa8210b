use libp2p::identity::{Keypair, PublicKey};
use libp2p::PeerId;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid key bytes: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Invalid public key encoding: {0}")]
    InvalidPublicKey(String),
}

/// The node's network identity: an Ed25519 keypair and the PeerId derived from it
#[derive(Clone)]
pub struct NodeIdentity {
    keypair: Keypair,
    peer_id: PeerId,
}

impl NodeIdentity {
    /// Generate a random identity from OS entropy
    pub fn generate() -> Result<Self, IdentityError> {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::from_secret(secret)
    }

    /// Derive an identity deterministically from `seed`
    ///
    /// The same seed always yields the same PeerId, which makes local
    /// multi-node runs reproducible.
    pub fn from_seed(seed: u64) -> Result<Self, IdentityError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        Self::from_secret(secret)
    }

    /// Seed 0 means a random identity
    pub fn from_optional_seed(seed: u64) -> Result<Self, IdentityError> {
        if seed == 0 {
            Self::generate()
        } else {
            Self::from_seed(seed)
        }
    }

    /// Build from raw Ed25519 secret key bytes
    pub fn from_secret(mut secret: [u8; 32]) -> Result<Self, IdentityError> {
        let keypair = Keypair::ed25519_from_bytes(&mut secret)
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        let peer_id = keypair.public().to_peer_id();
        Ok(Self { keypair, peer_id })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public()
    }

    /// Protobuf encoding of the public key, as exchanged during the handshake
    pub fn encoded_public_key(&self) -> Vec<u8> {
        self.keypair.public().encode_protobuf()
    }

    /// Sign `msg` with the identity key
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, IdentityError> {
        self.keypair
            .sign(msg)
            .map_err(|e| IdentityError::SigningFailed(e.to_string()))
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("NodeIdentity")
            .field("peer_id", &self.peer_id)
            .finish()
    }
}

/// Decode a protobuf-encoded public key received from a peer
pub fn decode_public_key(bytes: &[u8]) -> Result<PublicKey, IdentityError> {
    PublicKey::try_decode_protobuf(bytes).map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))
}
