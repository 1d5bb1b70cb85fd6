//! Example worker
//!
//! Registers two functions and runs until Ctrl-C, then drains in-flight jobs.
//!
//! ```text
//! RUST_LOG=info cargo run --example worker -- tcp://127.0.0.1:5000
//! ```

use anyhow::Result;
use async_trait::async_trait;
use periodic::{Handler, Job, WorkerBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Uppercases its arguments; asks for a retry when they are empty
struct Shout;

#[async_trait]
impl Handler for Shout {
    async fn handle(&self, job: Job) -> Result<()> {
        if job.args().is_empty() {
            job.sched_later(10).await?;
            return Ok(());
        }
        info!(name = job.name(), "{}", job.args().to_uppercase());
        job.done().await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| "tcp://127.0.0.1:5000".to_string());
    let worker = Arc::new(WorkerBuilder::new(addr).with_size(4).connect().await?);

    if !worker.ping().await? {
        anyhow::bail!("server did not answer ping");
    }

    worker.add_func("shout", Shout).await?;
    worker
        .add_func("sleep", |job: Job| async move {
            let secs = job.args().parse().unwrap_or(1);
            tokio::time::sleep(Duration::from_secs(secs)).await;
            job.done().await?;
            Ok::<_, anyhow::Error>(())
        })
        .await?;

    let run = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, waiting for running jobs");
    worker.close().await;

    if let Err(e) = run.await? {
        error!("Worker loop ended with error: {}", e);
    }
    Ok(())
}
