//! Payload cursors and frame helpers for the binary packet protocol
//!
//! A frame is one WebSocket binary message: `[type: u8][payload]`.
//! All multi-byte values inside a payload are big-endian.

/// Errors raised while encoding or decoding a packet payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Short buffer: needed {needed} bytes at offset {offset}, {available} available")]
    ShortBuffer {
        needed: usize,
        offset: usize,
        available: usize,
    },
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,
    #[error("Too many {kind} records: {count} (max 255)")]
    TooManyRecords { kind: &'static str, count: usize },
    #[error("Empty frame (no type tag)")]
    EmptyFrame,
}

/// Build a frame from a type tag and an encoded payload
pub fn encode_frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + payload.len());
    frame.push(tag);
    frame.extend_from_slice(payload);
    frame
}

/// Split a frame into its type tag and payload
pub fn split_frame(frame: &[u8]) -> Result<(u8, &[u8]), CodecError> {
    match frame.split_first() {
        Some((tag, payload)) => Ok((*tag, payload)),
        None => Err(CodecError::EmptyFrame),
    }
}

/// Payload writer
pub struct PayloadWriter {
    buffer: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
        }
    }

    /// Write raw bytes
    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn write_f64(&mut self, value: f64) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Write a record count, which is a single byte on the wire
    pub fn write_count(&mut self, kind: &'static str, count: usize) -> Result<&mut Self, CodecError> {
        let count = u8::try_from(count).map_err(|_| CodecError::TooManyRecords { kind, count })?;
        Ok(self.write_u8(count))
    }

    /// Get the encoded payload
    pub fn build(self) -> Vec<u8> {
        self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for PayloadWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Positional payload reader
pub struct PayloadReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Read exactly n bytes
    pub fn read(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let available = self.data.len() - self.position;
        if n > available {
            return Err(CodecError::ShortBuffer {
                needed: n,
                offset: self.position,
                available,
            });
        }
        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.read(1).map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.read(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        self.read(8).map(|b| {
            f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        })
    }

    /// Consume the rest of the payload as a UTF-8 string.
    /// Zero remaining bytes is the empty string.
    pub fn read_remaining_string(&mut self) -> Result<String, CodecError> {
        let rest = self.remaining();
        self.position = self.data.len();
        String::from_utf8(rest.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Get remaining bytes
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }
}
