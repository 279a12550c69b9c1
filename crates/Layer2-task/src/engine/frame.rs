//! Multiplexed log framing
//!
//! When stdout and stderr share one stream, every chunk is preceded by an
//! 8-byte header:
//!
//! ```text
//! [stream type][0][0][0][payload length, u32 big-endian]
//! ```
//!
//! [`encode_lines`] frames each line separately so that every line read back
//! starts with its own header. [`LineFramer`] does the same for a chunked
//! stream, holding back a partial line until its newline arrives.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Header length in bytes
pub const HEADER_LEN: usize = 8;

/// Largest payload a frame may carry
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Which standard stream a frame came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Stdin => 0,
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }

    /// Unknown type bytes are read as stdout
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Stdin,
            2 => Self::Stderr,
            _ => Self::Stdout,
        }
    }
}

/// One decoded unit of a framed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete header plus its payload
    Data { stream: StreamKind, payload: Vec<u8> },
    /// Fewer than [`HEADER_LEN`] bytes before end-of-data
    Truncated(Vec<u8>),
}

/// Build the header for a payload of `len` bytes
pub fn header(stream: StreamKind, len: u32) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = stream.as_byte();
    header[4..].copy_from_slice(&len.to_be_bytes());
    header
}

/// Frame every line of `chunk`, keeping the line terminators in the payload
///
/// Lines longer than [`MAX_FRAME_LEN`] span several frames.
pub fn encode_lines(stream: StreamKind, chunk: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(chunk.len() + HEADER_LEN);
    for line in chunk.split_inclusive(|b| *b == b'\n') {
        for piece in line.chunks(MAX_FRAME_LEN) {
            // MAX_FRAME_LEN fits in a u32.
            out.extend_from_slice(&header(stream, piece.len() as u32));
            out.extend_from_slice(piece);
        }
    }
    out
}

/// Re-frames a chunked byte stream one complete line at a time
///
/// Each stream kind keeps its own partial line. A partial line that reaches
/// [`MAX_FRAME_LEN`] is emitted without waiting for its newline.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: [Vec<u8>; 3],
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame every line of `chunk` completed so far
    pub fn push(&mut self, stream: StreamKind, chunk: &[u8]) -> Vec<u8> {
        let pending = &mut self.pending[stream.as_byte() as usize];
        pending.extend_from_slice(chunk);

        let complete = match pending.iter().rposition(|b| *b == b'\n') {
            Some(last) => {
                let tail = pending.split_off(last + 1);
                std::mem::replace(pending, tail)
            }
            None if pending.len() >= MAX_FRAME_LEN => std::mem::take(pending),
            None => return Vec::new(),
        };
        encode_lines(stream, &complete)
    }

    /// Frame whatever partial lines remain at end-of-data
    pub fn finish(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        for stream in [StreamKind::Stdin, StreamKind::Stdout, StreamKind::Stderr] {
            let tail = std::mem::take(&mut self.pending[stream.as_byte() as usize]);
            if !tail.is_empty() {
                out.extend(encode_lines(stream, &tail));
            }
        }
        out
    }
}

/// Read the next frame, `None` at a clean end-of-data
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Frame>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut head = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if filled == 0 {
        return Ok(None);
    }
    if filled < HEADER_LEN {
        return Ok(Some(Frame::Truncated(head[..filled].to_vec())));
    }

    let stream = StreamKind::from_byte(head[0]);
    let len = u32::from_be_bytes([head[4], head[5], head[6], head[7]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds the {}-byte limit", len, MAX_FRAME_LEN),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame::Data { stream, payload }))
}
