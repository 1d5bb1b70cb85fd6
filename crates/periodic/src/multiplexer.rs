//! Connection multiplexing and response routing
//!
//! One [`Multiplexer`] owns one connection. Every logical call registers a
//! [`RequestAgent`] under a fresh correlation id; a background task reads
//! frames and feeds each one to the agent whose id it carries.

use crate::agent::{AgentSlot, RequestAgent};
use crate::config::Endpoint;
use crate::transport;
use crate::{PeriodicError, Result};
use bytes::Bytes;
use periodic_proto::{ClientType, Frame, RecordCodec, MAX_RECORD_SIZE};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Length of a correlation id: a v4 UUID in simple hex form
pub(crate) const ID_LEN: usize = 32;

/// Bytes a frame adds around its payload: id, two separators, command code
pub(crate) const FRAME_OVERHEAD: usize = ID_LEN + 3;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Registered agents and the liveness flag, guarded together so that no
/// agent can be registered after the close broadcast has run.
#[derive(Default)]
struct AgentTable {
    alive: bool,
    agents: HashMap<Bytes, Arc<AgentSlot>>,
}

/// State shared by the multiplexer, its receive loop and every agent
pub(crate) struct Connection {
    table: StdMutex<AgentTable>,
    writer: Mutex<BoxedWriter>,
    codec: RecordCodec,
    /// Cancelled by `shutdown`; aborts writes parked on a peer that stopped reading
    closed: CancellationToken,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.lock_table();
        f.debug_struct("Connection")
            .field("alive", &table.alive)
            .field("agents", &table.agents.len())
            .finish()
    }
}

impl Connection {
    fn new(writer: BoxedWriter, max_record_size: usize) -> Self {
        Self {
            table: StdMutex::new(AgentTable { alive: true, agents: HashMap::new() }),
            writer: Mutex::new(writer),
            codec: RecordCodec::with_max_record_size(max_record_size),
            closed: CancellationToken::new(),
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, AgentTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(self: &Arc<Self>) -> Result<RequestAgent> {
        let mut table = self.lock_table();
        if !table.alive {
            return Err(PeriodicError::ConnectionClosed);
        }

        // Draw until the id is free among pending calls.
        let id = loop {
            let id = Bytes::from(Uuid::new_v4().simple().to_string());
            if !table.agents.contains_key(&id) {
                break id;
            }
        };

        let slot = Arc::new(AgentSlot::new());
        table.agents.insert(id.clone(), slot.clone());
        Ok(RequestAgent::new(id, slot, Arc::clone(self)))
    }

    pub(crate) fn deregister(&self, id: &[u8]) -> bool {
        self.lock_table().agents.remove(id).is_some()
    }

    /// Feed a frame to its agent. Returns false on a routing miss.
    fn route(&self, frame: Frame) -> bool {
        let table = self.lock_table();
        match table.agents.get(&frame.id[..]) {
            Some(slot) => {
                slot.feed_command(frame.command, frame.payload);
                true
            }
            None => false,
        }
    }

    /// Mark the connection dead and fail every pending agent.
    /// Returns the number of agents that were notified.
    fn shutdown(&self) -> usize {
        let mut table = self.lock_table();
        table.alive = false;
        // Wakes writers parked in `write_record`.
        self.closed.cancel();
        for slot in table.agents.values() {
            slot.feed_error(PeriodicError::ConnectionClosed);
        }
        table.agents.len()
    }

    fn is_alive(&self) -> bool {
        self.lock_table().alive
    }

    fn pending(&self) -> usize {
        self.lock_table().agents.len()
    }

    /// Write one frame as one record; the writer lock keeps records whole.
    pub(crate) async fn send_frame(&self, frame: &Frame) -> Result<()> {
        if !self.is_alive() {
            return Err(PeriodicError::ConnectionClosed);
        }
        self.write_record(&frame.encode()).await
    }

    /// Write one record, giving up with `ConnectionClosed` once the
    /// connection is shut down, whether waiting for the lock or mid-write.
    async fn write_record(&self, body: &[u8]) -> Result<()> {
        let write = async {
            let mut writer = self.writer.lock().await;
            self.codec.write_record(&mut *writer, body).await
        };

        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(PeriodicError::ConnectionClosed),
            result = write => result.map_err(|e| {
                error!("Failed to write record: {}", e);
                PeriodicError::from(e)
            }),
        }
    }

    fn max_payload_size(&self) -> usize {
        self.codec.max_record_size().saturating_sub(FRAME_OVERHEAD)
    }
}

/// Multiplexes many concurrent calls over a single connection
#[derive(Debug)]
pub struct Multiplexer {
    conn: Arc<Connection>,
    receive_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Multiplexer {
    /// Take over `io`, announce `client_type` and start the receive loop
    pub async fn new<T>(io: T, client_type: ClientType) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_max_record_size(io, client_type, MAX_RECORD_SIZE).await
    }

    /// Like [`Multiplexer::new`] with a custom record size limit
    pub async fn with_max_record_size<T>(
        io: T,
        client_type: ClientType,
        max_record_size: usize,
    ) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        let conn = Arc::new(Connection::new(Box::new(writer), max_record_size));

        conn.write_record(&client_type.to_bytes()).await?;
        debug!(?client_type, "Sent handshake");

        let receive_task = tokio::spawn(receive_loop(
            Arc::clone(&conn),
            Box::new(reader),
            RecordCodec::with_max_record_size(max_record_size),
        ));

        Ok(Self {
            conn,
            receive_task: StdMutex::new(Some(receive_task)),
        })
    }

    /// Dial `endpoint` and set up a multiplexer on the new connection
    pub async fn connect(
        endpoint: &Endpoint,
        client_type: ClientType,
        max_record_size: usize,
    ) -> Result<Self> {
        let stream = transport::connect(endpoint).await?;
        info!(%endpoint, ?client_type, "Connected");
        Self::with_max_record_size(stream, client_type, max_record_size).await
    }

    /// Register a new call under a fresh correlation id
    pub fn new_agent(&self) -> Result<RequestAgent> {
        self.conn.register()
    }

    /// Deregister a call. Unknown ids are ignored.
    pub fn remove_agent(&self, id: &[u8]) {
        self.conn.deregister(id);
    }

    /// Whether the connection is still usable
    pub fn is_alive(&self) -> bool {
        self.conn.is_alive()
    }

    /// Number of registered calls
    pub fn pending_agents(&self) -> usize {
        self.conn.pending()
    }

    /// Largest payload a single frame can carry on this connection
    pub fn max_payload_size(&self) -> usize {
        self.conn.max_payload_size()
    }

    /// Close the connection, failing every pending call with
    /// [`PeriodicError::ConnectionClosed`]. Safe to call more than once.
    pub async fn close(&self) {
        let failed = self.conn.shutdown();
        self.abort_receive_loop();

        // Writers drop the lock on cancellation, so this never waits on a stalled peer.
        let mut writer = self.conn.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Writer shutdown failed: {}", e);
        }
        info!(failed, "Connection closed");
    }

    fn abort_receive_loop(&self) {
        let task = self
            .receive_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.conn.shutdown();
        self.abort_receive_loop();
    }
}

async fn receive_loop(conn: Arc<Connection>, mut reader: BoxedReader, mut codec: RecordCodec) {
    debug!("Starting receive loop");

    loop {
        match codec.read_record(&mut reader).await {
            Ok(Some(record)) => match Frame::parse(record) {
                Ok(frame) => {
                    debug!(
                        id = %String::from_utf8_lossy(&frame.id),
                        command = %frame.command,
                        len = frame.payload_size(),
                        "Received frame"
                    );
                    let id = frame.id.clone();
                    // Unknown ids include late replies to calls already removed.
                    if !conn.route(frame) {
                        warn!("Routing miss: no agent for id {}", String::from_utf8_lossy(&id));
                    }
                }
                // Record boundaries are intact; skip the frame and keep reading.
                Err(e) => warn!("Dropping malformed frame: {}", e),
            },
            Ok(None) => {
                info!("Connection closed by peer");
                break;
            }
            // Stream position is lost after a read error.
            Err(e) => {
                error!("Failed to read record: {}", e);
                break;
            }
        }
    }

    let failed = conn.shutdown();
    debug!(failed, "Receive loop stopped");
}
