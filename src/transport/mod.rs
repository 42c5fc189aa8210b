// Transport module - THE WIRE
// Identity-bound TCP channels: listening, dialing, negotiation and framing

mod address;
mod address_book;
mod channel;
mod connector;
mod error;
mod handshake;
mod listener;
mod secure;

/// Sub-protocol tag carried in every handshake
pub const PROTOCOL_ID: &str = "/chain/1.0.0";

pub use address::{dial_address, socket_target, DialTarget, SocketTarget};
pub use address_book::AddressBook;
pub use channel::{
    BoxedReader, BoxedWriter, DuplexChannel, FrameReader, FrameWriter, DEFAULT_MAX_FRAME_LEN,
};
pub use connector::Connector;
pub use error::{ChannelError, TransportError};
pub use handshake::{negotiate, HandshakeConfig, Hello};
pub use listener::{ChannelHandler, Listener};
pub use secure::{EphemeralKey, FrameOpener, FrameSealer, Role};
