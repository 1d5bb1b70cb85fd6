//! Command codes and the connection handshake tag

use std::fmt;

/// One-byte command code carried by every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// No operation
    Noop = 0,
    /// Worker asks for the next job
    GrabJob = 1,
    /// Worker asks to run a job again later
    SchedLater = 2,
    /// Worker reports a job as done
    WorkDone = 3,
    /// Worker reports a job as failed
    WorkFail = 4,
    /// Server assigns a job to a worker
    JobAssign = 5,
    /// Server has no job for the worker
    NoJob = 6,
    /// Worker announces a function it can run
    CanDo = 7,
    /// Worker withdraws a function
    CantDo = 8,
    /// Liveness check
    Ping = 9,
    /// Answer to [`Command::Ping`]
    Pong = 10,
    /// Worker goes to sleep
    Sleep = 11,
    /// Unrecognised command
    Unknown = 12,
    /// Client submits a job
    SubmitJob = 13,
    /// Client asks for queue statistics
    Status = 14,
    /// Client drops a function and its jobs
    DropFunc = 15,
    /// Generic success answer
    Success = 16,
    /// Client removes a job
    RemoveJob = 17,
    /// Client streams the job store out
    Dump = 18,
    /// Client streams records into the job store
    Load = 19,
}

impl Command {
    /// Wire byte for this command
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Decode a wire byte. Bytes outside the table decode to [`Command::Unknown`].
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Noop,
            1 => Self::GrabJob,
            2 => Self::SchedLater,
            3 => Self::WorkDone,
            4 => Self::WorkFail,
            5 => Self::JobAssign,
            6 => Self::NoJob,
            7 => Self::CanDo,
            8 => Self::CantDo,
            9 => Self::Ping,
            10 => Self::Pong,
            11 => Self::Sleep,
            13 => Self::SubmitJob,
            14 => Self::Status,
            15 => Self::DropFunc,
            16 => Self::Success,
            17 => Self::RemoveJob,
            18 => Self::Dump,
            19 => Self::Load,
            _ => Self::Unknown,
        }
    }
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Noop => "NOOP",
            Self::GrabJob => "GRAB_JOB",
            Self::SchedLater => "SCHED_LATER",
            Self::WorkDone => "WORK_DONE",
            Self::WorkFail => "WORK_FAIL",
            Self::JobAssign => "JOB_ASSIGN",
            Self::NoJob => "NO_JOB",
            Self::CanDo => "CAN_DO",
            Self::CantDo => "CANT_DO",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Sleep => "SLEEP",
            Self::Unknown => "UNKNOWN",
            Self::SubmitJob => "SUBMIT_JOB",
            Self::Status => "STATUS",
            Self::DropFunc => "DROP_FUNC",
            Self::Success => "SUCCESS",
            Self::RemoveJob => "REMOVE_JOB",
            Self::Dump => "DUMP",
            Self::Load => "LOAD",
        };
        f.write_str(name)
    }
}

/// Role announced by the first record on a new connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientType {
    /// Submits and manages jobs
    Client = 1,
    /// Grabs and runs jobs
    Worker = 2,
}

impl ClientType {
    /// Handshake record body
    pub fn to_bytes(self) -> [u8; 1] {
        [self as u8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_byte_mapping() {
        for byte in 0u8..=19 {
            let command = Command::from_byte(byte);
            if byte == 12 {
                assert_eq!(command, Command::Unknown);
            }
            assert_eq!(command.as_byte(), byte);
        }
    }

    #[test]
    fn test_unrecognised_byte_is_unknown() {
        assert_eq!(Command::from_byte(200), Command::Unknown);
        assert_eq!(Command::from(20), Command::Unknown);
    }

    #[test]
    fn test_command_display() {
        assert_eq!(Command::JobAssign.to_string(), "JOB_ASSIGN");
        assert_eq!(Command::Pong.to_string(), "PONG");
    }

    #[test]
    fn test_client_type_handshake() {
        assert_eq!(ClientType::Client.to_bytes(), [1]);
        assert_eq!(ClientType::Worker.to_bytes(), [2]);
    }
}
