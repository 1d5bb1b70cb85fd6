//! In-process fake server for integration tests
//!
//! The runtime is driven over `tokio::io::duplex`; the test plays the
//! server side frame by frame.

#![allow(dead_code)]

use bytes::{BufMut, Bytes, BytesMut};
use periodic::proto::{ClientType, Command, Frame, JobRecord, RecordCodec, SEP};
use periodic::{Client, Worker};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// How long a test waits for any single frame
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

const DUPLEX_BUFFER: usize = 256 * 1024;

/// Install a test log subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write side of the fake server, shareable with spawned tasks
#[derive(Clone)]
pub struct ServerWriter {
    inner: Arc<Mutex<WriteHalf<DuplexStream>>>,
    codec: Arc<RecordCodec>,
}

impl ServerWriter {
    /// Send one frame as one record
    pub async fn send(&self, frame: Frame) {
        self.send_raw(&frame.encode()).await;
    }

    /// Send a record body as-is, frame or not
    pub async fn send_raw(&self, body: &[u8]) {
        let mut writer = self.inner.lock().await;
        self.codec
            .write_record(&mut *writer, body)
            .await
            .expect("fake server write failed");
    }

    /// Answer `request` on its correlation id
    pub async fn reply(&self, request: &Frame, command: Command, payload: impl Into<Bytes>) {
        self.send(Frame::new(request.id.clone(), command, payload)).await;
    }
}

/// Server end of a duplex connection
pub struct FakeServer {
    reader: ReadHalf<DuplexStream>,
    codec: RecordCodec,
    writer: ServerWriter,
}

impl FakeServer {
    /// Take the server end and check the handshake
    pub async fn accept(stream: DuplexStream, expected: ClientType) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let mut server = Self {
            reader,
            codec: RecordCodec::new(),
            writer: ServerWriter {
                inner: Arc::new(Mutex::new(writer)),
                codec: Arc::new(RecordCodec::new()),
            },
        };

        let handshake = server.next_record().await.expect("handshake expected");
        assert_eq!(&handshake[..], &expected.to_bytes(), "wrong client type");
        server
    }

    /// Next record from the runtime, `None` once it hung up
    pub async fn next_record(&mut self) -> Option<Bytes> {
        timeout(FRAME_TIMEOUT, self.codec.read_record(&mut self.reader))
            .await
            .expect("timed out waiting for a record")
            .expect("fake server read failed")
    }

    /// Next frame from the runtime, `None` once it hung up
    pub async fn next_frame(&mut self) -> Option<Frame> {
        let record = self.next_record().await?;
        Some(Frame::parse(record).expect("runtime sent a malformed frame"))
    }

    /// Next frame, which must carry `command`
    pub async fn expect_frame(&mut self, command: Command) -> Frame {
        let frame = self.next_frame().await.expect("connection closed");
        assert_eq!(frame.command, command, "unexpected frame {:?}", frame);
        frame
    }

    /// Handle for writing from other tasks
    pub fn writer(&self) -> ServerWriter {
        self.writer.clone()
    }

    /// Answer `request` on its correlation id
    pub async fn reply(&self, request: &Frame, command: Command, payload: impl Into<Bytes>) {
        self.writer.reply(request, command, payload).await;
    }
}

/// A client wired to a fake server
pub async fn connect_client() -> (Client, FakeServer) {
    init_tracing();
    let (client_io, server_io) = tokio::io::duplex(DUPLEX_BUFFER);
    let client = Client::from_io(client_io).await.expect("client setup failed");
    let server = FakeServer::accept(server_io, ClientType::Client).await;
    (client, server)
}

/// A worker of the given size wired to a fake server
pub async fn connect_worker(size: usize) -> (Worker, FakeServer) {
    init_tracing();
    let (worker_io, server_io) = tokio::io::duplex(DUPLEX_BUFFER);
    let worker = Worker::from_io(worker_io, size).await.expect("worker setup failed");
    let server = FakeServer::accept(server_io, ClientType::Worker).await;
    (worker, server)
}

/// JOBASSIGN payload for `record` under `handle`
pub fn assignment(handle: &str, record: &JobRecord) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_slice(handle.as_bytes());
    buf.put_u8(SEP);
    buf.put_slice(&record.to_bytes().expect("job record encodes"));
    buf.freeze()
}
