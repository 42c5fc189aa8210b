// Secure Framing - Optional encryption of channel frames
//
// Each side contributes an ephemeral secp256k1 key signed by its identity.
// sha256(ECDH secret) keys an AES-256-GCM cipher; every frame travels as one
// base64 line. Nonces are a 4-byte direction prefix plus a frame counter.

use crate::transport::ChannelError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secp256k1::ecdh::SharedSecret;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

/// Which end of the connection we are; selects the nonce prefix per direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Dialer,
    Listener,
}

impl Role {
    fn nonce_prefix(self) -> [u8; 4] {
        match self {
            Role::Dialer => *b"dial",
            Role::Listener => *b"lstn",
        }
    }

    fn opposite(self) -> Self {
        match self {
            Role::Dialer => Role::Listener,
            Role::Listener => Role::Dialer,
        }
    }
}

/// Ephemeral ECDH key for one handshake
pub struct EphemeralKey {
    secret: SecretKey,
    public: PublicKey,
}

impl EphemeralKey {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut secp256k1::rand::thread_rng());
        Self { secret, public }
    }

    /// Compressed public key, 33 bytes
    pub fn public_bytes(&self) -> [u8; 33] {
        self.public.serialize()
    }

    /// Derive the sealer/opener pair for `role` against the remote ephemeral key
    pub fn agree(&self, remote_public: &[u8], role: Role) -> Result<(FrameSealer, FrameOpener), String> {
        let remote = PublicKey::from_slice(remote_public).map_err(|e| e.to_string())?;
        let shared = SharedSecret::new(&remote, &self.secret);
        let key = Sha256::digest(shared.secret_bytes());

        let sealer = FrameSealer {
            cipher: Aes256Gcm::new_from_slice(&key).map_err(|e| e.to_string())?,
            prefix: role.nonce_prefix(),
            counter: 0,
        };
        let opener = FrameOpener {
            cipher: Aes256Gcm::new_from_slice(&key).map_err(|e| e.to_string())?,
            prefix: role.opposite().nonce_prefix(),
            counter: 0,
        };
        Ok((sealer, opener))
    }
}

fn nonce_bytes(prefix: [u8; 4], counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..4].copy_from_slice(&prefix);
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// Encrypts outgoing frames
pub struct FrameSealer {
    cipher: Aes256Gcm,
    prefix: [u8; 4],
    counter: u64,
}

impl FrameSealer {
    /// Encrypt one frame payload to its base64 line form (without newline)
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<String, ChannelError> {
        let nonce = nonce_bytes(self.prefix, self.counter);
        self.counter += 1;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| ChannelError::EncryptionFailed)?;
        Ok(STANDARD.encode(ciphertext))
    }
}

/// Decrypts incoming frames
pub struct FrameOpener {
    cipher: Aes256Gcm,
    prefix: [u8; 4],
    counter: u64,
}

impl FrameOpener {
    /// Decrypt one base64 line; the counter advances even when the frame is bad
    pub fn open(&mut self, line: &str) -> Result<Vec<u8>, ChannelError> {
        let nonce = nonce_bytes(self.prefix, self.counter);
        self.counter += 1;

        let ciphertext = STANDARD
            .decode(line.trim())
            .map_err(|e| ChannelError::MalformedFrame(format!("invalid base64: {}", e)))?;

        self.cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| ChannelError::MalformedFrame("decryption failed".to_string()))
    }

    /// Consume one nonce for a frame that was discarded before decryption
    pub fn skip(&mut self) {
        self.counter += 1;
    }
}
