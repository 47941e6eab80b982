pub mod msg;
mod receiver;
mod sender;

use tokio::io::{AsyncRead, AsyncWrite};

pub use receiver::MsgReceiver;
pub use sender::MsgSender;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Upper bound on a single frame body. Every message in the protocol is a
/// small tagged record; anything larger is a corrupt or hostile frame and
/// is rejected at the channel boundary.
pub const MAX_FRAME_SIZE: usize = 1 << 20;

/// Creates both `MsgReceiver` and `MsgSender` network channel parts.
///
/// Given a writer and reader creates and returns both ends of the communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication stream in the form of a message receiver and sender.
pub fn channel<R, W>(rx: R, tx: W) -> (MsgReceiver<R>, MsgSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (MsgReceiver::new(rx), MsgSender::new(tx))
}
