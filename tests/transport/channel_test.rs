// Channel Tests
// Newline framing, recoverable frame errors and encrypted frames

use chainsync::identity::NodeIdentity;
use chainsync::transport::{
    ChannelError, DuplexChannel, EphemeralKey, FrameOpener, FrameReader, FrameSealer, FrameWriter, Role,
    PROTOCOL_ID,
};
use tokio::io::{duplex, AsyncWriteExt};

fn peer() -> libp2p::PeerId {
    NodeIdentity::from_seed(7).unwrap().peer_id()
}

// ============================================================================
// PLAINTEXT FRAMING
// ============================================================================

#[tokio::test]
async fn test_frames_split_on_newline() {
    let (client, server) = duplex(1024);
    let mut writer = FrameWriter::new(Box::new(client));
    let mut reader = FrameReader::new(Box::new(server));

    writer.send_frame("first").await.unwrap();
    writer.send_frame("second").await.unwrap();

    assert_eq!(reader.next_frame().await.unwrap(), Some("first".to_string()));
    assert_eq!(reader.next_frame().await.unwrap(), Some("second".to_string()));
}

#[tokio::test]
async fn test_blank_lines_skipped_and_crlf_trimmed() {
    let (mut client, server) = duplex(1024);
    let mut reader = FrameReader::new(Box::new(server));

    client.write_all(b"\n\r\n  \npayload\r\n").await.unwrap();
    drop(client);

    assert_eq!(reader.next_frame().await.unwrap(), Some("payload".to_string()));
    assert_eq!(reader.next_frame().await.unwrap(), None);
}

#[tokio::test]
async fn test_eof_without_delimiter_still_yields_frame() {
    let (mut client, server) = duplex(1024);
    let mut reader = FrameReader::new(Box::new(server));

    client.write_all(b"tail").await.unwrap();
    drop(client);

    assert_eq!(reader.next_frame().await.unwrap(), Some("tail".to_string()));
    assert_eq!(reader.next_frame().await.unwrap(), None);
}

#[tokio::test]
async fn test_invalid_utf8_is_recoverable() {
    let (mut client, server) = duplex(1024);
    let mut reader = FrameReader::new(Box::new(server));

    client.write_all(b"\xff\xfe\n").await.unwrap();
    client.write_all(b"good\n").await.unwrap();

    let err = reader.next_frame().await.unwrap_err();
    assert!(matches!(err, ChannelError::MalformedFrame(_)));
    assert!(err.is_recoverable());
    assert_eq!(reader.next_frame().await.unwrap(), Some("good".to_string()));
}

#[tokio::test]
async fn test_oversized_frame_is_skipped() {
    let (mut client, server) = duplex(64 * 1024);
    let mut reader = FrameReader::new(Box::new(server)).with_max_frame_len(16);

    client.write_all(&[b'x'; 100]).await.unwrap();
    client.write_all(b"\nshort\n").await.unwrap();

    let err = reader.next_frame().await.unwrap_err();
    assert!(matches!(err, ChannelError::FrameTooLarge { limit: 16 }));
    assert!(err.is_recoverable());
    assert_eq!(reader.next_frame().await.unwrap(), Some("short".to_string()));
}

#[tokio::test]
async fn test_duplex_channel_from_stream() {
    let (a, b) = duplex(1024);
    let left = DuplexChannel::from_stream(peer(), PROTOCOL_ID, a);
    let right = DuplexChannel::from_stream(peer(), PROTOCOL_ID, b);

    assert_eq!(left.remote_peer(), peer());
    assert_eq!(left.protocol(), "/chain/1.0.0");
    assert!(!left.is_secure());

    let (_left_reader, mut left_writer) = left.into_split();
    let (mut right_reader, _right_writer) = right.into_split();

    left_writer.send_frame("[]").await.unwrap();
    assert_eq!(right_reader.next_frame().await.unwrap(), Some("[]".to_string()));
}

#[tokio::test]
async fn test_writer_shutdown_ends_reader() {
    let (client, server) = duplex(1024);
    let mut writer = FrameWriter::new(Box::new(client));
    let mut reader = FrameReader::new(Box::new(server));

    writer.send_frame("last").await.unwrap();
    writer.shutdown().await.unwrap();

    assert_eq!(reader.next_frame().await.unwrap(), Some("last".to_string()));
    assert_eq!(reader.next_frame().await.unwrap(), None);
}

// ============================================================================
// ENCRYPTED FRAMING
// ============================================================================

fn secure_pair() -> ((FrameReader, FrameWriter), (FrameReader, FrameWriter)) {
    let dialer_key = EphemeralKey::generate();
    let listener_key = EphemeralKey::generate();
    let (dialer_sealer, dialer_opener) = dialer_key.agree(&listener_key.public_bytes(), Role::Dialer).unwrap();
    let (listener_sealer, listener_opener) = listener_key.agree(&dialer_key.public_bytes(), Role::Listener).unwrap();

    let (a, b) = duplex(64 * 1024);
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);

    (
        (
            FrameReader::new(Box::new(a_read)).with_opener(dialer_opener),
            FrameWriter::new(Box::new(a_write)).with_sealer(dialer_sealer),
        ),
        (
            FrameReader::new(Box::new(b_read)).with_opener(listener_opener),
            FrameWriter::new(Box::new(b_write)).with_sealer(listener_sealer),
        ),
    )
}

#[tokio::test]
async fn test_secure_frames_both_directions() {
    let ((mut dialer_reader, mut dialer_writer), (mut listener_reader, mut listener_writer)) = secure_pair();

    assert!(dialer_reader.is_secure());
    dialer_writer.send_frame("to listener").await.unwrap();
    listener_writer.send_frame("to dialer").await.unwrap();
    dialer_writer.send_frame("again").await.unwrap();

    assert_eq!(listener_reader.next_frame().await.unwrap(), Some("to listener".to_string()));
    assert_eq!(listener_reader.next_frame().await.unwrap(), Some("again".to_string()));
    assert_eq!(dialer_reader.next_frame().await.unwrap(), Some("to dialer".to_string()));
}

#[tokio::test]
async fn test_plaintext_line_on_secure_channel_is_recoverable() {
    let dialer_key = EphemeralKey::generate();
    let listener_key = EphemeralKey::generate();
    let (mut sealer, _) = dialer_key.agree(&listener_key.public_bytes(), Role::Dialer).unwrap();
    let (_, opener) = listener_key.agree(&dialer_key.public_bytes(), Role::Listener).unwrap();

    let (mut client, server) = duplex(4096);
    let mut reader = FrameReader::new(Box::new(server)).with_opener(opener);

    // The forged line consumes counter 0, so the sealer skips it too
    let _skipped = sealer.seal(b"unused").unwrap();
    client.write_all(b"not base64 ciphertext\n").await.unwrap();
    let sealed = sealer.seal(b"real").unwrap();
    client.write_all(format!("{}\n", sealed).as_bytes()).await.unwrap();

    let err = reader.next_frame().await.unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(reader.next_frame().await.unwrap(), Some("real".to_string()));
}

fn sealer_opener_pair() -> (FrameSealer, FrameOpener) {
    let dialer_key = EphemeralKey::generate();
    let listener_key = EphemeralKey::generate();
    let (sealer, _) = dialer_key.agree(&listener_key.public_bytes(), Role::Dialer).unwrap();
    let (_, opener) = listener_key.agree(&dialer_key.public_bytes(), Role::Listener).unwrap();
    (sealer, opener)
}

#[tokio::test]
async fn test_oversized_secure_frame_does_not_desync() {
    let (mut sealer, opener) = sealer_opener_pair();
    let (mut client, server) = duplex(64 * 1024);
    let mut reader = FrameReader::new(Box::new(server)).with_opener(opener).with_max_frame_len(64);

    for payload in ["x".repeat(200), "ok".to_string(), "ok2".to_string()] {
        let sealed = sealer.seal(payload.as_bytes()).unwrap();
        client.write_all(format!("{}\n", sealed).as_bytes()).await.unwrap();
    }

    let err = reader.next_frame().await.unwrap_err();
    assert!(matches!(err, ChannelError::FrameTooLarge { limit: 64 }));
    assert_eq!(reader.next_frame().await.unwrap(), Some("ok".to_string()));
    assert_eq!(reader.next_frame().await.unwrap(), Some("ok2".to_string()));
}

#[tokio::test]
async fn test_corrupted_secure_line_does_not_desync() {
    let (mut sealer, opener) = sealer_opener_pair();
    let (mut client, server) = duplex(4096);
    let mut reader = FrameReader::new(Box::new(server)).with_opener(opener);

    // A sealed frame whose line arrives as invalid UTF-8
    let _garbled = sealer.seal(b"lost").unwrap();
    client.write_all(b"\xff\xfe\xfd\n").await.unwrap();
    let sealed = sealer.seal(b"after").unwrap();
    client.write_all(format!("{}\n", sealed).as_bytes()).await.unwrap();

    let err = reader.next_frame().await.unwrap_err();
    assert!(matches!(err, ChannelError::MalformedFrame(_)));
    assert_eq!(reader.next_frame().await.unwrap(), Some("after".to_string()));
}
