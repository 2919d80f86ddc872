//! Request/reply messages exchanged between the control loop and the
//! acquisition service.
//!
//! Every message travels as one frame: a big-endian `u32` payload length
//! followed by the UTF-8 payload. The client sends `energy` or `stop`; the
//! service answers with the latest energy reading as decimal text, or with
//! `stopped`.

pub mod socket;

use std::io::{self, Read, Write};

use crate::error::{Error, Result};

pub use socket::{ReplySocket, RequestSocket};

pub const MAX_FRAME_LEN: usize = 64 * 1024;

const ENERGY: &str = "energy";
const STOP: &str = "stop";
const STOPPED: &str = "stopped";

// -----------------------------------------------------------------------------
// MESSAGES
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Energy,
    Stop,
    /// Anything else, including an empty payload. The service ignores these.
    Other(String),
}

impl Request {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Request::Energy => ENERGY.as_bytes().to_vec(),
            Request::Stop => STOP.as_bytes().to_vec(),
            Request::Other(text) => text.as_bytes().to_vec(),
        }
    }

    pub fn decode(payload: &[u8]) -> Self {
        match std::str::from_utf8(payload) {
            Ok(ENERGY) => Request::Energy,
            Ok(STOP) => Request::Stop,
            Ok(other) => Request::Other(other.to_string()),
            Err(_) => Request::Other(String::from_utf8_lossy(payload).into_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Energy(f64),
    Stopped,
}

impl Reply {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::Energy(value) => value.to_string().into_bytes(),
            Reply::Stopped => STOPPED.as_bytes().to_vec(),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| Error::Protocol("reply is not valid UTF-8".to_string()))?;
        if text == STOPPED {
            return Ok(Reply::Stopped);
        }
        text.parse::<f64>()
            .map(Reply::Energy)
            .map_err(|_| Error::Protocol(format!("unexpected reply {:?}", text)))
    }
}

// -----------------------------------------------------------------------------
// FRAMING
// -----------------------------------------------------------------------------

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Blocking read of one whole frame.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {} exceeds limit", len),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Accumulates bytes from a non-blocking stream and splits out whole frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }
        let mut header = [0u8; 4];
        header.copy_from_slice(&self.buffer[..4]);
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            return Err(Error::Protocol(format!(
                "incoming frame length {} exceeds limit",
                len
            )));
        }
        if self.buffer.len() < 4 + len {
            return Ok(None);
        }
        let payload = self.buffer[4..4 + len].to_vec();
        self.buffer.drain(..4 + len);
        Ok(Some(payload))
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
