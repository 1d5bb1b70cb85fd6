//! Job record carried by submit and assign messages

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use crate::ProtocolError;

/// A job as the server stores it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Server-assigned job id
    #[serde(rename = "job_id", default, skip_serializing_if = "is_zero")]
    pub id: i64,
    /// Function the job runs under
    pub func: String,
    /// Job name, unique within its function
    pub name: String,
    /// Opaque arguments
    #[serde(rename = "workload", default, skip_serializing_if = "String::is_empty")]
    pub args: String,
    /// Unix timestamp (seconds) the job becomes runnable
    #[serde(default, skip_serializing_if = "is_zero")]
    pub sched_at: i64,
    /// Unix timestamp (seconds) the job last started running
    #[serde(default, skip_serializing_if = "is_zero")]
    pub run_at: i64,
    /// Run timeout in seconds
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timeout: i64,
    /// Server-side status string
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl JobRecord {
    /// Create a job for `func` named `name`
    pub fn new(func: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            func: func.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the job arguments
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    /// Set the time the job becomes runnable
    pub fn with_sched_at(mut self, sched_at: i64) -> Self {
        self.sched_at = sched_at;
        self
    }

    /// Set the run timeout
    pub fn with_timeout(mut self, timeout: i64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Encode as a message payload
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode from a message payload
    pub fn from_slice(data: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let job = JobRecord::new("email", "welcome-42")
            .with_args("{\"to\":\"a@b\"}")
            .with_sched_at(1_700_000_000)
            .with_timeout(30);

        assert_eq!(job.func, "email");
        assert_eq!(job.name, "welcome-42");
        assert_eq!(job.args, "{\"to\":\"a@b\"}");
        assert_eq!(job.sched_at, 1_700_000_000);
        assert_eq!(job.timeout, 30);
    }

    #[test]
    fn test_wire_field_names() {
        let job = JobRecord::new("f", "n").with_args("x").with_timeout(5);
        let value: serde_json::Value = serde_json::from_slice(&job.to_bytes().unwrap()).unwrap();

        assert_eq!(value["func"], "f");
        assert_eq!(value["name"], "n");
        assert_eq!(value["workload"], "x");
        assert_eq!(value["timeout"], 5);
        assert!(value.get("job_id").is_none());
        assert!(value.get("sched_at").is_none());
    }

    #[test]
    fn test_decode_server_record() {
        let data = br#"{"job_id":7,"func":"f","name":"n","workload":"w","sched_at":10,"run_at":11,"timeout":0,"status":"doing"}"#;
        let job = JobRecord::from_slice(data).unwrap();

        assert_eq!(job.id, 7);
        assert_eq!(job.args, "w");
        assert_eq!(job.run_at, 11);
        assert_eq!(job.status, "doing");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(JobRecord::from_slice(b"not json"), Err(ProtocolError::Decode(_))));
        assert!(matches!(JobRecord::from_slice(br#"{"name":"n"}"#), Err(ProtocolError::Decode(_))));
    }
}
