// Identity module - The node's Ed25519 network identity and PeerId

mod keypair;

pub use keypair::{decode_public_key, IdentityError, NodeIdentity};
