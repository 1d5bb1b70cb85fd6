//! # Periodic
//!
//! Client and worker runtime for the periodic job queue.
//!
//! One connection carries many independent calls at once. Each call gets a
//! [`RequestAgent`] bound to a fresh correlation id; the [`Multiplexer`]
//! routes every incoming frame to the agent that owns its id. On top of that
//! sit the [`Client`] calls (ping, submit, status, drop-func, remove-job,
//! dump/load) and the [`Worker`], which grabs jobs and runs a bounded number
//! of handlers concurrently.
//!
//! ```no_run
//! use periodic::{Job, Worker};
//!
//! # async fn example() -> periodic::Result<()> {
//! let worker = Worker::connect("tcp://127.0.0.1:5000", 4).await?;
//! worker
//!     .add_func("echo", |job: Job| async move {
//!         println!("{}", job.args());
//!         job.done().await?;
//!         Ok::<_, anyhow::Error>(())
//!     })
//!     .await?;
//! worker.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use periodic_proto as proto;

/// Error types for the periodic runtime
pub mod error;

/// Per-call rendezvous
pub mod agent;

/// Connection multiplexing
pub mod multiplexer;

/// Socket setup for each endpoint kind
pub mod transport;

/// Endpoints, configuration and builders
pub mod config;

/// Assigned jobs and outcome reporting
pub mod job;

/// Client calls
pub mod client;

/// Worker dispatcher
pub mod worker;

pub use agent::RequestAgent;
pub use client::{Client, FuncStat};
pub use config::{ClientBuilder, ClientConfig, Endpoint, WorkerBuilder, WorkerConfig};
pub use error::PeriodicError;
pub use job::Job;
pub use multiplexer::Multiplexer;
pub use periodic_proto::{Command, JobRecord};
pub use worker::{Handler, Worker};

/// Result type alias for periodic operations
pub type Result<T> = std::result::Result<T, PeriodicError>;
