//! Length-prefixed record codec for async streams
//!
//! Every record is a 4-byte big-endian length followed by that many bytes.
//! The same layout is used on the connection and in dump files.

use crate::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum record size (16MB)
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// Size of the length prefix
pub const HEADER_SIZE: usize = 4;

/// Build the length prefix for a record body
pub fn encode_header(len: usize) -> [u8; HEADER_SIZE] {
    (len as u32).to_be_bytes()
}

/// Read a length prefix
pub fn decode_header(header: [u8; HEADER_SIZE]) -> usize {
    u32::from_be_bytes(header) as usize
}

/// Record codec for encoding/decoding records over async streams
#[derive(Debug)]
pub struct RecordCodec {
    /// Read buffer for incoming data
    read_buf: BytesMut,
    /// Maximum record size allowed
    max_record_size: usize,
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordCodec {
    /// Create a new record codec with default settings
    pub fn new() -> Self {
        Self::with_max_record_size(MAX_RECORD_SIZE)
    }

    /// Create a new record codec with custom max record size
    pub fn with_max_record_size(max_record_size: usize) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(8192),
            max_record_size,
        }
    }

    /// Maximum record size accepted in either direction
    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }

    /// Encode a record body with its length prefix
    pub fn encode_record(&self, body: &[u8]) -> Result<Bytes, ProtocolError> {
        if body.len() > self.max_record_size {
            return Err(ProtocolError::RecordTooLarge {
                size: body.len(),
                max: self.max_record_size,
            });
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
        buf.put_slice(&encode_header(body.len()));
        buf.put_slice(body);

        Ok(buf.freeze())
    }

    /// Write one record to an async writer.
    ///
    /// Header and body go out in a single `write_all`, so callers that hold
    /// the writer exclusively never interleave partial records.
    pub async fn write_record<W>(&self, writer: &mut W, body: &[u8]) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let encoded = self.encode_record(body)?;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one record from an async reader. `Ok(None)` means clean end of stream.
    pub async fn read_record<R>(&mut self, reader: &mut R) -> Result<Option<Bytes>, ProtocolError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        loop {
            // Serve from the buffer before touching the reader.
            if let Some(record) = self.try_decode_record()? {
                return Ok(Some(record));
            }

            let mut temp_buf = [0u8; 8192];
            let n = reader.read(&mut temp_buf).await?;

            // EOF is clean only on a record boundary.
            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::TruncatedRecord {
                    buffered: self.read_buf.len(),
                });
            }

            self.read_buf.extend_from_slice(&temp_buf[..n]);
        }
    }

    /// Try to decode a record from the internal buffer
    pub fn try_decode_record(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if self.read_buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Peek the header; it is consumed only once the whole body is buffered.
        let record_len = (&self.read_buf[..HEADER_SIZE]).get_u32() as usize;

        // Reject before buffering a body we would never accept.
        if record_len > self.max_record_size {
            return Err(ProtocolError::RecordTooLarge {
                size: record_len,
                max: self.max_record_size,
            });
        }

        if self.read_buf.len() < HEADER_SIZE + record_len {
            return Ok(None);
        }

        self.read_buf.advance(HEADER_SIZE);
        Ok(Some(self.read_buf.split_to(record_len).freeze()))
    }

    /// Get the current buffer size
    pub fn buffer_size(&self) -> usize {
        self.read_buf.len()
    }

    /// Clear the internal buffer
    pub fn clear_buffer(&mut self) {
        self.read_buf.clear();
    }
}
