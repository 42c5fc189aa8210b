// Duplex Channel - A framed, bidirectional byte stream bound to one peer
//
// Frames are newline-terminated. Blank lines are skipped. When the channel is
// secured each frame is an encrypted base64 line; see `secure`.

use crate::transport::secure::{FrameOpener, FrameSealer};
use crate::transport::ChannelError;
use libp2p::PeerId;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Largest accepted frame; a full ledger snapshot must fit
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

// ============================================================================
// FRAME READER
// ============================================================================

/// Read half of a channel
pub struct FrameReader {
    inner: BufReader<BoxedReader>,
    opener: Option<FrameOpener>,
    max_frame_len: usize,
}

impl FrameReader {
    pub fn new(reader: BoxedReader) -> Self {
        Self::from_buffered(BufReader::new(reader))
    }

    /// Keep an existing buffer so bytes read ahead during the handshake are not lost
    pub fn from_buffered(inner: BufReader<BoxedReader>) -> Self {
        Self {
            inner,
            opener: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub fn with_opener(mut self, opener: FrameOpener) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }

    pub fn is_secure(&self) -> bool {
        self.opener.is_some()
    }

    /// Next frame payload, or `None` once the remote has closed the stream
    ///
    /// Recoverable errors (`ChannelError::is_recoverable`) consume exactly one
    /// frame; the caller may keep reading.
    pub async fn next_frame(&mut self) -> Result<Option<String>, ChannelError> {
        loop {
            let line = match self.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(None),
                Err(e) => {
                    // The rejected line still used up one sender nonce
                    if e.is_recoverable() {
                        if let Some(opener) = self.opener.as_mut() {
                            opener.skip();
                        }
                    }
                    return Err(e);
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let payload = match self.opener.as_mut() {
                Some(opener) => opener.open(&line)?,
                None => line.into_bytes(),
            };

            return String::from_utf8(payload)
                .map(Some)
                .map_err(|_| ChannelError::MalformedFrame("frame is not valid UTF-8".to_string()));
        }
    }

    /// One raw line without its terminator, undecoded
    pub(crate) async fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        let mut buf = Vec::new();
        let limit = self.max_frame_len as u64 + 1;
        let n = (&mut self.inner).take(limit).read_until(b'\n', &mut buf).await?;

        if n == 0 {
            return Ok(None);
        }

        if buf.last() != Some(&b'\n') && buf.len() as u64 >= limit {
            self.discard_rest_of_line().await?;
            return Err(ChannelError::FrameTooLarge {
                limit: self.max_frame_len,
            });
        }

        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }

        String::from_utf8(buf)
            .map(Some)
            .map_err(|_| ChannelError::MalformedFrame("frame is not valid UTF-8".to_string()))
    }

    async fn discard_rest_of_line(&mut self) -> Result<(), ChannelError> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.inner.consume(pos + 1);
                    return Ok(());
                }
                None => {
                    let len = available.len();
                    self.inner.consume(len);
                }
            }
        }
    }
}

// ============================================================================
// FRAME WRITER
// ============================================================================

/// Write half of a channel
pub struct FrameWriter {
    inner: BoxedWriter,
    sealer: Option<FrameSealer>,
}

impl FrameWriter {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            inner: writer,
            sealer: None,
        }
    }

    pub fn with_sealer(mut self, sealer: FrameSealer) -> Self {
        self.sealer = Some(sealer);
        self
    }

    /// Write one frame followed by the delimiter, then flush
    pub async fn send_frame(&mut self, payload: &str) -> Result<(), ChannelError> {
        let mut line = match self.sealer.as_mut() {
            Some(sealer) => sealer.seal(payload.as_bytes())?.into_bytes(),
            None => payload.as_bytes().to_vec(),
        };
        line.push(b'\n');

        self.inner.write_all(&line).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Write a raw line, bypassing encryption (handshake only)
    pub(crate) async fn send_raw_line(&mut self, line: &str) -> Result<(), ChannelError> {
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Close our direction of the stream
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// DUPLEX CHANNEL
// ============================================================================

/// A negotiated channel to exactly one remote peer
pub struct DuplexChannel {
    remote: PeerId,
    protocol: String,
    reader: FrameReader,
    writer: FrameWriter,
}

impl DuplexChannel {
    pub fn new(remote: PeerId, protocol: impl Into<String>, reader: FrameReader, writer: FrameWriter) -> Self {
        Self {
            remote,
            protocol: protocol.into(),
            reader,
            writer,
        }
    }

    /// Plaintext channel over any byte stream, with no handshake
    pub fn from_stream<S>(remote: PeerId, protocol: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self::new(
            remote,
            protocol,
            FrameReader::new(Box::new(read_half)),
            FrameWriter::new(Box::new(write_half)),
        )
    }

    pub fn remote_peer(&self) -> PeerId {
        self.remote
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn is_secure(&self) -> bool {
        self.reader.is_secure()
    }

    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for DuplexChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexChannel")
            .field("remote", &self.remote)
            .field("protocol", &self.protocol)
            .field("secure", &self.is_secure())
            .finish()
    }
}
