//! Status text frames as printed by the flight controller's diagnostics.
//!
//! [`Frame`] classifies and decodes single lines. [`LineReader`] and
//! [`DatagramReader`] turn a byte stream or a UDP socket into a stream of
//! lines. The transport itself (MAVLink `STATUSTEXT`, a serial bridge, ...) is
//! somebody else's business, as long as it hands us text.

mod datagram;
pub mod frame;
mod line;

pub use crate::{
    datagram::DatagramReader,
    frame::{
        Frame,
        FrameFromStrError,
        FrameKind,
    },
    line::LineReader,
};

#[derive(Debug, thiserror::Error)]
#[error("status text transport error")]
pub enum Error {
    Io(#[from] std::io::Error),
}

/// Payloads are NUL padded and may carry line endings.
fn frame_text(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .position(|byte| *byte == 0)
        .unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_owned()
}
