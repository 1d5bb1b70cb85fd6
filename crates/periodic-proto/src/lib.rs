//! # Periodic Protocol
//!
//! Wire vocabulary, frame layout and record codec for the periodic job queue
//! protocol.

#![warn(missing_docs)]

/// Command codes and the connection handshake tag
pub mod command;

/// Frame layout: correlation id, command code and payload
pub mod frame;

/// Length-prefixed record codec for async streams
pub mod codec;

/// Job record carried by submit and assign messages
pub mod job;

/// Error types for protocol operations
pub mod error;

pub use command::{ClientType, Command};
pub use frame::{Frame, SEP};
pub use codec::{RecordCodec, MAX_RECORD_SIZE};
pub use job::JobRecord;
pub use error::ProtocolError;
