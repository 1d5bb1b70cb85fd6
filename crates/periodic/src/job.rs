//! Jobs assigned to a worker

use crate::{Multiplexer, PeriodicError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use periodic_proto::frame::split_once;
use periodic_proto::{Command, JobRecord, SEP};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A job handed out by the server, with the operations that report its outcome.
///
/// Exactly one of [`Job::done`], [`Job::fail`] or [`Job::sched_later`] should be
/// called per job. Nothing enforces this; an unreported job is left to the
/// server's own timeout handling.
#[derive(Clone)]
pub struct Job {
    mux: Arc<Multiplexer>,
    record: JobRecord,
    handle: Bytes,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("func", &self.record.func)
            .field("name", &self.record.name)
            .field("handle", &String::from_utf8_lossy(&self.handle))
            .finish()
    }
}

impl Job {
    /// Decode a `handle SEP json` assignment payload
    pub fn decode(mux: Arc<Multiplexer>, payload: &Bytes) -> Result<Self> {
        let (handle, body) = split_once(payload)
            .ok_or_else(|| PeriodicError::Decode("job assignment has no handle separator".to_string()))?;
        let record = JobRecord::from_slice(&body)?;
        Ok(Self { mux, record, handle })
    }

    /// Function the job was submitted under
    pub fn func_name(&self) -> &str {
        &self.record.func
    }

    /// Job name, unique within its function
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Job arguments
    pub fn args(&self) -> &str {
        &self.record.args
    }

    /// Opaque handle used to report the outcome
    pub fn handle(&self) -> &Bytes {
        &self.handle
    }

    /// The full decoded record
    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    /// Report the job as finished
    pub async fn done(&self) -> Result<()> {
        self.report(Command::WorkDone, self.handle.clone()).await
    }

    /// Report the job as failed
    pub async fn fail(&self) -> Result<()> {
        self.report(Command::WorkFail, self.handle.clone()).await
    }

    /// Ask the server to run the job again after `delay` seconds
    pub async fn sched_later(&self, delay: u64) -> Result<()> {
        self.report(Command::SchedLater, self.sched_later_payload(delay, None)).await
    }

    /// Like [`Job::sched_later`], also bumping the job's retry counter by `counter`
    pub async fn sched_later_with_counter(&self, delay: u64, counter: u64) -> Result<()> {
        self.report(Command::SchedLater, self.sched_later_payload(delay, Some(counter)))
            .await
    }

    fn sched_later_payload(&self, delay: u64, counter: Option<u64>) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.handle.len() + 24);
        buf.put_slice(&self.handle);
        buf.put_u8(SEP);
        buf.put_slice(delay.to_string().as_bytes());
        if let Some(counter) = counter {
            buf.put_u8(SEP);
            buf.put_slice(counter.to_string().as_bytes());
        }
        buf.freeze()
    }

    // The server sends no reply to outcome reports.
    async fn report(&self, command: Command, payload: Bytes) -> Result<()> {
        let agent = self.mux.new_agent()?;
        debug!(func = %self.record.func, name = %self.record.name, %command, "Reporting job outcome");
        agent.send(command, payload).await
    }
}
