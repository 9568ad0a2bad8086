use std::{error::Error, fmt, io};

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{LEN_TYPE_SIZE, LenType, MAX_FRAME_LEN};

/// A frame header announcing more than `MAX_FRAME_LEN` bytes.
///
/// The body is never read, so the stream can't be resynced after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTooLarge {
    pub len: u64,
}

impl FrameTooLarge {
    /// Whether `err` was caused by an oversized frame.
    pub fn is(err: &io::Error) -> bool {
        err.get_ref().is_some_and(|inner| inner.is::<FrameTooLarge>())
    }
}

impl fmt::Display for FrameTooLarge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame of {} bytes exceeds the {MAX_FRAME_LEN} bytes limit", self.len)
    }
}

impl Error for FrameTooLarge {}

/// The receiving end handle of the communication.
pub struct OnoReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> OnoReceiver<R> {
    /// Creates a new `OnoReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            buf: Vec::new(),
        }
    }

    /// Waits to receive a new message from the inner receiver.
    ///
    /// The whole frame is consumed before decoding, so a frame holding invalid json
    /// yields an `InvalidData` error and leaves the stream positioned at the next frame. A
    /// header above `MAX_FRAME_LEN` also yields `InvalidData`, wrapping a `FrameTooLarge`.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> io::Result<T> {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut size_buf).await?;
        let len = LenType::from_be_bytes(size_buf);
        if len > MAX_FRAME_LEN as LenType {
            return Err(io::Error::new(io::ErrorKind::InvalidData, FrameTooLarge { len }));
        }
        let len = len as usize;

        self.buf.resize(len, 0);
        self.rx.read_exact(&mut self.buf).await?;

        serde_json::from_slice(&self.buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
