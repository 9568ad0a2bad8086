pub mod msg;
mod receiver;
mod sender;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use msg::{Envelope, Origin, ProtocolErr, Request, Response};
pub use receiver::{FrameTooLarge, OnoReceiver};
pub use sender::OnoSender;

type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// The largest frame body a receiver accepts, in bytes.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Creates both `OnoReceiver` and `OnoSender` network channel parts.
///
/// Given a writer and reader creates and returns both ends of the communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication stream in the form of an ono receiver and sender.
pub fn channel<R, W>(rx: R, tx: W) -> (OnoReceiver<R>, OnoSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (OnoReceiver::new(rx), OnoSender::new(tx))
}
