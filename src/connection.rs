// ABOUTME: Provides TCP connection management for SMPP v3.4 protocol communication
// ABOUTME: Implements frame-based I/O with buffering, split into independent read and write halves

use crate::codec::{CodecError, Frame, PduRegistry};
use bytes::{Buf, BytesMut};
use std::io::{self, Cursor};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Errors surfaced while reading frames off the wire
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed PDU: {0}")]
    Codec(#[from] CodecError),

    /// The peer closed the socket in the middle of a frame
    #[error("connection reset by peer")]
    Reset,
}

/// SMPP v3.4 connection split into halves.
///
/// A bound session needs to read and write concurrently: the reader task
/// waits for responses and SMSC-initiated PDUs (deliver_sm, enquire_link)
/// while submitters write. `Connection::new` splits the socket so each half
/// can be owned by a different task.
///
/// ```text
/// CLOSED → OPEN → BOUND_TX/BOUND_RX/BOUND_TRX → UNBOUND → CLOSED
/// ```
///
/// This layer handles frame I/O only. Session state is tracked by the
/// transport that owns the halves.
pub struct Connection;

impl Connection {
    /// Split `socket` into a buffered frame reader and writer.
    pub fn new(socket: TcpStream) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        let (read, write) = socket.into_split();
        (FrameReader::new(read), FrameWriter::new(write))
    }
}

/// Read half: buffers bytes until a complete PDU is available
pub struct FrameReader<R> {
    stream: R,

    // The buffer for reading frames.
    buffer: BytesMut,

    registry: PduRegistry,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            // 4KB comfortably holds several maximum-size short messages.
            buffer: BytesMut::with_capacity(4 * 1024),
            registry: PduRegistry::new(),
        }
    }

    /// Read a single `Frame` value from the underlying stream.
    ///
    /// Waits until enough data has been buffered to parse a frame. Any data
    /// remaining after the frame is kept for the next call.
    ///
    /// Returns `None` if the peer closed the socket on a frame boundary.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            // `0` indicates "end of stream".
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                // A clean shutdown leaves nothing behind in the read buffer.
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::Reset)
                };
            }
        }
    }

    /// Tries to parse a frame from the buffer. If not enough data has been
    /// buffered yet, `Ok(None)` is returned.
    fn parse_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        let mut buf = Cursor::new(&self.buffer[..]);

        match Frame::check(&mut buf) {
            Ok(len) => {
                let frame = Frame::parse(&self.registry, &mut buf);

                // Discard the whole PDU, even if the body decoder stopped
                // short of command_length or failed part way through.
                self.buffer.advance(len);

                Ok(Some(frame?))
            }
            // Expected runtime condition: wait for more bytes.
            Err(CodecError::Incomplete) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write half, buffered so each PDU goes out in a single flush
pub struct FrameWriter<W: AsyncWrite> {
    stream: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream: BufWriter::new(stream),
        }
    }

    /// Write a single `Frame` and flush it to the socket.
    pub async fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let bytes = frame
            .to_bytes()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await
    }

    /// Shut down the write direction of the socket.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
