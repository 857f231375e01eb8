//! Framed message transport.
//!
//! ## Wire format
//!
//! ```text
//! [4 bytes: payload length (u32-le)] [8 bytes: code (u64-le)] [N bytes: payload]
//! ```
//!
//! The length is checked against `max_msg_size` before the payload is
//! read, so an oversized frame never gets buffered.

use {
    crate::{
        error::{ErrCode, P2pError, Result},
        msg::Msg,
    },
    async_trait::async_trait,
    tokio::io::{split, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
};

#[async_trait]
pub trait MsgReader: Send {
    async fn read_msg(&mut self) -> Result<Msg>;
}

#[async_trait]
pub trait MsgWriter: Send {
    async fn write_msg(&mut self, msg: &Msg) -> Result<()>;
}

/// One bidirectional message stream of a connection.
pub struct Channel {
    pub reader: Box<dyn MsgReader>,
    pub writer: Box<dyn MsgWriter>,
}

impl Channel {
    /// Frame both directions of `stream`.
    pub fn new<S>(stream: S, max_msg_size: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = split(stream);
        Self {
            reader: Box::new(FramedReader::new(read_half, max_msg_size)),
            writer: Box::new(FramedWriter::new(write_half, max_msg_size)),
        }
    }
}

/// Two connected in-memory channels.
#[cfg(any(test, feature = "dev-context-only-utils"))]
pub fn channel_pair(max_msg_size: usize) -> (Channel, Channel) {
    let (a, b) = tokio::io::duplex(1 << 16);
    (Channel::new(a, max_msg_size), Channel::new(b, max_msg_size))
}

pub struct FramedReader<R> {
    inner: R,
    max_msg_size: usize,
}

impl<R> FramedReader<R> {
    pub fn new(inner: R, max_msg_size: usize) -> Self {
        Self {
            inner,
            max_msg_size,
        }
    }
}

#[async_trait]
impl<R> MsgReader for FramedReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_msg(&mut self) -> Result<Msg> {
        let len = self.inner.read_u32_le().await?;
        let code = self.inner.read_u64_le().await?;
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if len > self.max_msg_size {
            return Err(P2pError::protocol(
                ErrCode::MsgTooLarge,
                format!("{len} > {}", self.max_msg_size),
            ));
        }
        let mut payload = vec![0u8; len];
        self.inner.read_exact(&mut payload).await?;
        Ok(Msg { code, payload })
    }
}

pub struct FramedWriter<W> {
    inner: W,
    max_msg_size: usize,
}

impl<W> FramedWriter<W> {
    pub fn new(inner: W, max_msg_size: usize) -> Self {
        Self {
            inner,
            max_msg_size,
        }
    }
}

#[async_trait]
impl<W> MsgWriter for FramedWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_msg(&mut self, msg: &Msg) -> Result<()> {
        let size = msg.size();
        if size > self.max_msg_size {
            return Err(P2pError::protocol(
                ErrCode::MsgTooLarge,
                format!("{size} > {}", self.max_msg_size),
            ));
        }
        let len = u32::try_from(size)
            .map_err(|_| P2pError::protocol(ErrCode::MsgTooLarge, size.to_string()))?;
        let mut frame = Vec::with_capacity(size.saturating_add(12));
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&msg.code.to_le_bytes());
        frame.extend_from_slice(&msg.payload);
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches};

    #[tokio::test]
    async fn test_frames_cross_the_pipe() {
        let (mut a, mut b) = channel_pair(1024);
        a.writer.write_msg(&Msg::new(0x06, vec![1, 2, 3])).await.unwrap();
        a.writer.write_msg(&Msg::new(0x99, Vec::new())).await.unwrap();
        assert_eq!(b.reader.read_msg().await.unwrap(), Msg::new(0x06, vec![1, 2, 3]));
        assert_eq!(b.reader.read_msg().await.unwrap(), Msg::new(0x99, Vec::new()));
    }

    #[tokio::test]
    async fn test_oversized_messages_rejected_on_both_ends() {
        let (mut a, mut b) = channel_pair(4);
        assert_matches!(
            a.writer.write_msg(&Msg::new(0x06, vec![0; 5])).await,
            Err(P2pError::Protocol {
                code: ErrCode::MsgTooLarge,
                ..
            })
        );

        // A peer with a larger limit sends a frame this side refuses.
        let (a_stream, b_stream) = tokio::io::duplex(1024);
        let mut big = FramedWriter::new(a_stream, 1024);
        let mut small = FramedReader::new(b_stream, 4);
        big.write_msg(&Msg::new(0x06, vec![0; 8])).await.unwrap();
        assert_matches!(
            small.read_msg().await,
            Err(P2pError::Protocol {
                code: ErrCode::MsgTooLarge,
                ..
            })
        );

        drop(a);
        assert_matches!(b.reader.read_msg().await, Err(P2pError::Io(_)));
    }
}
