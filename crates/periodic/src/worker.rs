//! Worker dispatcher
//!
//! A [`Worker`] registers functions with the server, then [`Worker::run`]
//! keeps grabbing jobs and runs up to `size` handlers at once. Each handler
//! holds one semaphore permit for its whole run, so the grab loop stalls
//! while every slot is busy.

use crate::config::WorkerConfig;
use crate::{client, Job, Multiplexer, PeriodicError, Result, WorkerBuilder};
use async_trait::async_trait;
use bytes::Bytes;
use periodic_proto::{ClientType, Command};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{RwLock, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Runs jobs for one registered function
#[async_trait]
pub trait Handler: Send + Sync {
    /// Run `job`. The handler reports the outcome itself through
    /// [`Job::done`], [`Job::fail`] or [`Job::sched_later`]; a returned error
    /// is only logged.
    async fn handle(&self, job: Job) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, job: Job) -> anyhow::Result<()> {
        (self)(job).await
    }
}

type Registry = HashMap<String, Arc<dyn Handler>>;

/// A connection in the worker role plus its handler pool
pub struct Worker {
    mux: Arc<Multiplexer>,
    handlers: Arc<RwLock<Registry>>,
    alive: AtomicBool,
    size: usize,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("size", &self.size)
            .field("alive", &self.is_alive())
            .field("active", &self.tracker.len())
            .finish()
    }
}

impl Worker {
    fn new(mux: Multiplexer, size: usize) -> Self {
        let size = size.max(1);
        Self {
            mux: Arc::new(mux),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            alive: AtomicBool::new(true),
            size,
            slots: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
        }
    }

    /// Connect to `addr` and allow `size` concurrent handlers
    pub async fn connect(addr: &str, size: usize) -> Result<Self> {
        WorkerBuilder::new(addr).with_size(size).connect().await
    }

    /// Connect using a prepared configuration
    pub async fn with_config(config: WorkerConfig) -> Result<Self> {
        let mux = Multiplexer::connect(&config.endpoint, ClientType::Worker, config.max_record_size).await?;
        Ok(Self::new(mux, config.size))
    }

    /// Run the worker over an already open stream
    pub async fn from_io<T>(io: T, size: usize) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mux = Multiplexer::new(io, ClientType::Worker).await?;
        Ok(Self::new(mux, size))
    }

    /// Maximum number of handlers running at once
    pub fn size(&self) -> usize {
        self.size
    }

    /// False once [`Worker::close`] has started
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Handlers currently running
    pub fn active_handlers(&self) -> usize {
        self.tracker.len()
    }

    /// Check the server is answering
    pub async fn ping(&self) -> Result<bool> {
        client::ping(&self.mux).await
    }

    /// Register `handler` for `func`, replacing any previous one, and tell
    /// the server this worker can run it.
    pub async fn add_func<H>(&self, func: &str, handler: H) -> Result<()>
    where
        H: Handler + 'static,
    {
        self.send(Command::CanDo, func.to_owned()).await?;
        self.handlers.write().await.insert(func.to_owned(), Arc::new(handler));
        info!(func, "Registered function");
        Ok(())
    }

    /// Forget `func` and tell the server this worker no longer runs it
    pub async fn remove_func(&self, func: &str) -> Result<()> {
        self.send(Command::CantDo, func.to_owned()).await?;
        if self.handlers.write().await.remove(func).is_some() {
            info!(func, "Removed function");
        }
        Ok(())
    }

    /// Ask the server for the next job, waiting until one is assigned
    pub async fn grab_job(&self) -> Result<Job> {
        let mut agent = self.mux.new_agent()?;
        let (command, payload) = agent.call(Command::GrabJob, Bytes::new()).await?;
        if command != Command::JobAssign {
            return Err(PeriodicError::GrabJobFailed(command));
        }
        Job::decode(Arc::clone(&self.mux), &payload)
    }

    /// Grab and dispatch jobs until the worker is closed.
    ///
    /// Failed grabs are logged and retried. Returns an error only if the
    /// connection is lost while the worker is still alive.
    pub async fn run(&self) -> Result<()> {
        info!(size = self.size, "Worker started");

        while self.is_alive() {
            let Ok(permit) = Arc::clone(&self.slots).acquire_owned().await else {
                break;
            };
            if !self.is_alive() {
                break;
            }

            let job = match self.grab_job().await {
                Ok(job) => job,
                Err(e) if e.is_connection_lost() => {
                    if !self.is_alive() {
                        break;
                    }
                    error!("Connection lost, worker stopping: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("GrabJob error: {}", e);
                    continue;
                }
            };

            let handler = self.handlers.read().await.get(job.func_name()).cloned();
            let Some(handler) = handler else {
                warn!(func = job.func_name(), "No handler for assigned job, removing function");
                if let Err(e) = self.remove_func(job.func_name()).await {
                    warn!("Failed to remove function {}: {}", job.func_name(), e);
                }
                continue;
            };

            debug!(func = job.func_name(), name = job.name(), "Dispatching job");
            self.tracker.spawn(async move {
                let _permit = permit;
                let func = job.func_name().to_owned();
                let name = job.name().to_owned();
                if let Err(e) = handler.handle(job).await {
                    warn!(%func, %name, "Handler failed: {:#}", e);
                }
            });
        }

        info!("Worker stopped");
        Ok(())
    }

    /// Stop grabbing, wait for every running handler to finish, then close
    /// the connection.
    pub async fn close(&self) {
        self.alive.store(false, Ordering::Release);
        self.tracker.close();

        let active = self.tracker.len();
        if active > 0 {
            info!(active, "Waiting for handlers to finish");
        }
        self.tracker.wait().await;

        self.mux.close().await;
    }

    // CANDO and CANTDO have no reply.
    async fn send(&self, command: Command, payload: String) -> Result<()> {
        let agent = self.mux.new_agent()?;
        agent.send(command, payload).await
    }
}
