//! Frame layout: correlation id, command code and payload
//!
//! ```text
//! id | SEP | command (1 byte) | [ SEP | payload ]
//! ```
//!
//! Frame boundaries come from the record layer ([`crate::RecordCodec`]), so
//! the payload runs to the end of the record and may contain `SEP` itself.

use bytes::{BufMut, Bytes, BytesMut};
use crate::{Command, ProtocolError};

/// Separator between the frame sections
pub const SEP: u8 = 0x00;

/// Protocol frame structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Correlation id of the logical call
    pub id: Bytes,
    /// Command code
    pub command: Command,
    /// Frame payload, empty when the frame carries none
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(id: impl Into<Bytes>, command: Command, payload: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            command,
            payload: payload.into(),
        }
    }

    /// Create a frame without payload
    pub fn bare(id: impl Into<Bytes>, command: Command) -> Self {
        Self::new(id, command, Bytes::new())
    }

    /// Serialize the frame into one record body
    pub fn encode(&self) -> Bytes {
        let payload_len = if self.payload.is_empty() { 0 } else { 1 + self.payload.len() };
        let mut buf = BytesMut::with_capacity(self.id.len() + 2 + payload_len);
        buf.put_slice(&self.id);
        buf.put_u8(SEP);
        buf.put_u8(self.command.as_byte());
        if !self.payload.is_empty() {
            buf.put_u8(SEP);
            buf.put_slice(&self.payload);
        }
        buf.freeze()
    }

    /// Parse one record body into a frame
    pub fn parse(record: Bytes) -> Result<Self, ProtocolError> {
        // The id runs up to the first separator.
        let sep = record
            .iter()
            .position(|&b| b == SEP)
            .ok_or(ProtocolError::InvalidFrame("missing separator"))?;
        if sep == 0 {
            return Err(ProtocolError::InvalidFrame("empty correlation id"));
        }

        // Exactly one command byte follows it.
        let command = *record
            .get(sep + 1)
            .ok_or(ProtocolError::InvalidFrame("missing command code"))?;

        // Then either the end of the record or a second separator and the payload.
        let payload = match record.get(sep + 2) {
            None => Bytes::new(),
            Some(&SEP) => record.slice(sep + 3..),
            Some(_) => return Err(ProtocolError::InvalidFrame("missing payload separator")),
        };

        Ok(Self {
            id: record.slice(..sep),
            command: Command::from_byte(command),
            payload,
        })
    }

    /// Get the payload size
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

/// Split `head SEP rest` at the first separator
pub fn split_once(data: &Bytes) -> Option<(Bytes, Bytes)> {
    let pos = data.iter().position(|&b| b == SEP)?;
    Some((data.slice(..pos), data.slice(pos + 1..)))
}
