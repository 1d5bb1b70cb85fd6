//! Client calls: submit, inspect and manage jobs

use crate::config::ClientConfig;
use crate::{ClientBuilder, Multiplexer, PeriodicError, Result};
use bytes::Bytes;
use periodic_proto::{ClientType, Command, JobRecord, ProtocolError, RecordCodec};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Terminates a dump stream
const DUMP_EOF: &[u8] = b"EOF";

/// One line of the server status report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncStat {
    /// Function name
    pub func: String,
    /// Workers that registered the function
    pub workers: u64,
    /// Jobs queued under the function
    pub jobs: u64,
    /// Jobs currently running
    pub processing: u64,
}

impl FuncStat {
    /// Parse a `func,workers,jobs,processing` line split into fields
    pub fn from_fields(fields: &[String]) -> Option<Self> {
        match fields {
            [func, workers, jobs, processing] => Some(Self {
                func: func.clone(),
                workers: workers.trim().parse().ok()?,
                jobs: jobs.trim().parse().ok()?,
                processing: processing.trim().parse().ok()?,
            }),
            _ => None,
        }
    }
}

/// A connection in the client role
#[derive(Debug, Clone)]
pub struct Client {
    mux: Arc<Multiplexer>,
}

impl Client {
    /// Connect to `addr` (`tcp://host:port` or `unix:///path`)
    pub async fn connect(addr: &str) -> Result<Self> {
        ClientBuilder::new(addr).connect().await
    }

    /// Connect using a prepared configuration
    pub async fn with_config(config: ClientConfig) -> Result<Self> {
        let mux = Multiplexer::connect(&config.endpoint, ClientType::Client, config.max_record_size).await?;
        Ok(Self { mux: Arc::new(mux) })
    }

    /// Run the client over an already open stream
    pub async fn from_io<T>(io: T) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mux = Multiplexer::new(io, ClientType::Client).await?;
        Ok(Self { mux: Arc::new(mux) })
    }

    /// The underlying multiplexer
    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.mux
    }

    /// Check the server is answering. Any reply other than PONG is `false`.
    pub async fn ping(&self) -> Result<bool> {
        ping(&self.mux).await
    }

    /// Submit a job
    pub async fn submit_job(&self, job: &JobRecord) -> Result<()> {
        let reply = self.call(Command::SubmitJob, job.to_bytes()?).await?;
        expect_success("SubmitJob", reply)?;
        info!(func = %job.func, name = %job.name, "Submitted job");
        Ok(())
    }

    /// Remove the job `name` queued under `func`
    pub async fn remove_job(&self, func: &str, name: &str) -> Result<()> {
        let job = JobRecord::new(func, name);
        let reply = self.call(Command::RemoveJob, job.to_bytes()?).await?;
        expect_success("RemoveJob", reply)
    }

    /// Drop a function nobody serves any more
    pub async fn drop_func(&self, func: &str) -> Result<()> {
        let reply = self.call(Command::DropFunc, func.to_owned()).await?;
        expect_success("DropFunc", reply)
    }

    /// Raw status report: one entry per line, sorted, each split on commas
    pub async fn status(&self) -> Result<Vec<Vec<String>>> {
        let (_, payload) = self.call(Command::Status, Bytes::new()).await?;
        Ok(parse_status(&payload))
    }

    /// Status report parsed into per-function counters.
    /// Lines that do not have the four expected fields are skipped.
    pub async fn status_stats(&self) -> Result<Vec<FuncStat>> {
        let lines = self.status().await?;
        Ok(lines.iter().filter_map(|line| FuncStat::from_fields(line)).collect())
    }

    /// Stream the server's job store into `sink` as length-prefixed records.
    /// Returns the number of records written.
    pub async fn dump<W>(&self, sink: &mut W) -> Result<usize>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut agent = self.mux.new_agent()?;
        agent.send(Command::Dump, Bytes::new()).await?;

        let codec = RecordCodec::new();
        let mut count = 0;
        loop {
            let (_, payload) = agent.receive().await?;
            if payload == DUMP_EOF {
                break;
            }
            codec.write_record(sink, &payload).await.map_err(source_error)?;
            count += 1;
        }

        info!(records = count, "Dump finished");
        Ok(count)
    }

    /// Send every length-prefixed record in `source` back to the server.
    /// Returns the number of records sent.
    ///
    /// A source record that would not fit in one frame on this connection
    /// fails with [`ProtocolError::RecordTooLarge`] before anything is sent for it.
    pub async fn load<R>(&self, source: &mut R) -> Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let agent = self.mux.new_agent()?;
        let mut codec = RecordCodec::with_max_record_size(self.mux.max_payload_size());
        let mut count = 0;

        while let Some(record) = codec.read_record(source).await.map_err(source_error)? {
            agent.send(Command::Load, record).await?;
            count += 1;
        }

        info!(records = count, "Load finished");
        Ok(count)
    }

    /// Close the connection. Pending calls fail with [`PeriodicError::ConnectionClosed`].
    pub async fn close(&self) {
        self.mux.close().await;
    }

    async fn call(&self, command: Command, payload: impl Into<Bytes>) -> Result<(Command, Bytes)> {
        let mut agent = self.mux.new_agent()?;
        agent.call(command, payload).await
    }
}

/// Ping over `mux`; shared by clients and workers
pub(crate) async fn ping(mux: &Multiplexer) -> Result<bool> {
    let mut agent = mux.new_agent()?;
    let (command, _) = agent.call(Command::Ping, Bytes::new()).await?;
    debug!(%command, "Ping answered");
    Ok(command == Command::Pong)
}

fn expect_success(op: &'static str, (command, payload): (Command, Bytes)) -> Result<()> {
    if command == Command::Success {
        return Ok(());
    }
    let message = if payload.is_empty() {
        command.to_string()
    } else {
        String::from_utf8_lossy(&payload).into_owned()
    };
    Err(PeriodicError::Rejected { op, message })
}

fn parse_status(payload: &[u8]) -> Vec<Vec<String>> {
    let text = String::from_utf8_lossy(payload);
    let mut lines: Vec<&str> = text.split('\n').filter(|line| !line.is_empty()).collect();
    lines.sort_unstable();
    lines
        .into_iter()
        .map(|line| line.split(',').map(str::to_owned).collect())
        .collect()
}

// Dump sinks and load sources are local files or buffers, not the connection.
fn source_error(err: ProtocolError) -> PeriodicError {
    match err {
        ProtocolError::Io(e) => PeriodicError::Io(e),
        e => PeriodicError::Protocol(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(line: &[&str]) -> Vec<String> {
        line.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_status_sorts_and_skips_blank_lines() {
        let lines = parse_status(b"resize,2,10,1\n\nemail,1,0,0\n");
        assert_eq!(lines, vec![fields(&["email", "1", "0", "0"]), fields(&["resize", "2", "10", "1"])]);
    }

    #[test]
    fn test_parse_status_empty() {
        assert!(parse_status(b"").is_empty());
        assert!(parse_status(b"\n\n").is_empty());
    }

    #[test]
    fn test_func_stat_from_fields() {
        let stat = FuncStat::from_fields(&fields(&["email", "3", "12", "2"])).unwrap();
        assert_eq!(
            stat,
            FuncStat { func: "email".to_string(), workers: 3, jobs: 12, processing: 2 }
        );

        assert!(FuncStat::from_fields(&fields(&["email", "3"])).is_none());
        assert!(FuncStat::from_fields(&fields(&["email", "x", "1", "1"])).is_none());
    }

    #[test]
    fn test_expect_success() {
        assert!(expect_success("SubmitJob", (Command::Success, Bytes::new())).is_ok());

        let err = expect_success("SubmitJob", (Command::Unknown, Bytes::from_static(b"duplicate"))).unwrap_err();
        assert!(matches!(err, PeriodicError::Rejected { op: "SubmitJob", ref message } if message == "duplicate"));

        let err = expect_success("DropFunc", (Command::Noop, Bytes::new())).unwrap_err();
        assert!(matches!(err, PeriodicError::Rejected { ref message, .. } if message == "NOOP"));
    }

    async fn client_with_limit(max_record_size: usize) -> (Client, tokio::io::DuplexStream) {
        let (io, server) = tokio::io::duplex(64 * 1024);
        let mux = Multiplexer::with_max_record_size(io, ClientType::Client, max_record_size)
            .await
            .unwrap();
        (Client { mux: Arc::new(mux) }, server)
    }

    #[tokio::test]
    async fn test_load_limit_leaves_room_for_the_frame() {
        let (client, _server) = client_with_limit(128).await;
        assert_eq!(client.multiplexer().max_payload_size(), 128 - 35);

        let codec = RecordCodec::new();
        let fits = codec.encode_record(&[b'a'; 93]).unwrap();
        assert_eq!(client.load(&mut &fits[..]).await.unwrap(), 1);

        let too_big = codec.encode_record(&[b'a'; 94]).unwrap();
        let err = client.load(&mut &too_big[..]).await.unwrap_err();
        assert!(matches!(
            err,
            PeriodicError::Protocol(ProtocolError::RecordTooLarge { size: 94, max: 93 })
        ));
        assert!(client.multiplexer().is_alive());
    }

    #[test]
    fn test_source_errors_are_not_transport_errors() {
        let err = source_error(ProtocolError::TruncatedRecord { buffered: 3 });
        assert!(matches!(err, PeriodicError::Protocol(ProtocolError::TruncatedRecord { .. })));
        assert!(!err.is_connection_lost());
    }
}
