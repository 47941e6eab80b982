//! The implementation of the sending end of the application layer protocol.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, MAX_FRAME_SIZE};

/// The sending end handle of the communication.
///
/// Frames are a big-endian `u64` body length followed by the JSON body.
pub struct MsgSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> MsgSender<W> {
    /// Creates a new `MsgSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Sends `msg` through the inner sender.
    ///
    /// # Arguments
    /// * `msg` - A serializable message.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> io::Result<()> {
        let Self { buf, tx } = self;

        buf.clear();
        buf.resize(LEN_TYPE_SIZE, 0);
        serde_json::to_writer(&mut *buf, msg)?;

        let len = buf.len() - LEN_TYPE_SIZE;
        if len > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds the {MAX_FRAME_SIZE} byte cap"),
            ));
        }

        let header = (len as LenType).to_be_bytes();
        buf[..LEN_TYPE_SIZE].copy_from_slice(&header);

        tx.write_all(buf).await?;
        tx.flush().await
    }
}
