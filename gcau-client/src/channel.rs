use std::{error::Error, fmt::Display, io, time::Duration};

use bytes::BytesMut;
use spg_protocol::{FrameError, line::SpgLineCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Errors of the transport below the protocol.
#[derive(Debug)]
pub enum ChannelError {
    /// No complete line arrived in time
    Timeout,
    /// The other end closed the stream
    Closed,
    Io(io::Error),
}

impl ChannelError {
    /// The protocol outcome of a failed request.
    pub fn frame_error(&self) -> FrameError {
        match self {
            ChannelError::Timeout => FrameError::Timeout,
            ChannelError::Closed | ChannelError::Io(_) => FrameError::UndefinedError,
        }
    }
}

impl From<io::Error> for ChannelError {
    fn from(value: io::Error) -> Self {
        ChannelError::Io(value)
    }
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Timeout => write!(f, "Timed out waiting for a reply"),
            ChannelError::Closed => write!(f, "Channel closed"),
            ChannelError::Io(error) => write!(f, "{}", error),
        }
    }
}

impl Error for ChannelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ChannelError::Io(error) => Some(error),
            _ => None,
        }
    }
}

/// Duplex line channel towards a controller.
///
/// Implementors send requests verbatim and return reply lines without their terminator.
pub trait Channel: Send {
    fn send(&mut self, data: &str) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Waits at most `timeout` for the next line.
    fn receive_line(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, ChannelError>> + Send;
}

/// A [Channel] over any async byte stream, e.g. a serial port or an in-memory duplex.
#[derive(Debug)]
pub struct FramedChannel<T> {
    io: T,
    codec: SpgLineCodec,
    buffer: BytesMut,
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> FramedChannel<T> {
    pub fn new(io: T) -> FramedChannel<T> {
        FramedChannel::with_codec(io, SpgLineCodec::new())
    }

    pub fn with_codec(io: T, codec: SpgLineCodec) -> FramedChannel<T> {
        FramedChannel {
            io,
            codec,
            buffer: BytesMut::new(),
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.io
    }

    /// Returns the stream. Buffered bytes not yet returned as a line are lost.
    pub fn into_inner(self) -> T {
        self.io
    }

    /// Waits for the next line without time limit.
    pub async fn read_line(&mut self) -> Result<String, ChannelError> {
        loop {
            if let Some(line) = self.codec.decode(&mut self.buffer)? {
                log::trace!("< {:?}", line);
                return Ok(line);
            }
            if self.io.read_buf(&mut self.buffer).await? == 0 {
                return match self.codec.decode(&mut self.buffer)? {
                    Some(line) => Ok(line),
                    None if self.buffer.is_empty() => Err(ChannelError::Closed),
                    // Unterminated trailing data
                    None => {
                        let rest = self.buffer.split();
                        Ok(String::from_utf8_lossy(&rest).into_owned())
                    }
                };
            }
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Channel for FramedChannel<T> {
    async fn send(&mut self, data: &str) -> Result<(), ChannelError> {
        log::trace!("> {:?}", data);
        let mut out = BytesMut::with_capacity(data.len());
        self.codec.encode(data, &mut out)?;
        self.io.write_all(&out).await?;
        self.io.flush().await?;
        Ok(())
    }

    async fn receive_line(&mut self, timeout: Duration) -> Result<String, ChannelError> {
        tokio::time::timeout(timeout, self.read_line())
            .await
            .map_err(|_| ChannelError::Timeout)?
    }
}
