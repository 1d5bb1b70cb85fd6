//! Per-call rendezvous between a caller and the receive loop
//!
//! A [`RequestAgent`] is bound to one correlation id. The caller sends through
//! it and parks in [`RequestAgent::receive`]; the receive loop finds the
//! agent's [`AgentSlot`] in the connection table and feeds results into it.

use crate::multiplexer::Connection;
use crate::{PeriodicError, Result};
use bytes::Bytes;
use periodic_proto::{Command, Frame};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

/// Feed side of an agent, shared with the connection table
#[derive(Debug, Default)]
pub(crate) struct AgentSlot {
    state: StdMutex<SlotState>,
    waiter: Notify,
}

#[derive(Debug, Default)]
struct SlotState {
    /// Results fed but not yet received, oldest first
    results: VecDeque<(Command, Bytes)>,
    /// Error fed by the connection, handed out once
    error: Option<PeriodicError>,
    /// Set once an error has been fed; later receives keep failing
    failed: bool,
    /// A caller is parked (or about to park) on `waiter`
    waiting: bool,
    /// Last command code fed, kept for diagnostics
    last_command: Option<Command>,
}

impl AgentSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // Critical sections never panic, so a poisoned lock still guards consistent state.
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a result and wake the parked caller, if any
    pub(crate) fn feed_command(&self, command: Command, payload: Bytes) {
        let mut state = self.lock();
        state.results.push_back((command, payload));
        state.last_command = Some(command);
        if state.waiting {
            state.waiting = false;
            self.waiter.notify_one();
        }
    }

    /// Store an error and wake the parked caller, if any
    pub(crate) fn feed_error(&self, error: PeriodicError) {
        let mut state = self.lock();
        if !state.failed {
            state.failed = true;
            state.error = Some(error);
        }
        if state.waiting {
            state.waiting = false;
            self.waiter.notify_one();
        }
    }

    /// Take the next result, parking until one is fed.
    ///
    /// The waiting flag is raised under the same lock that checks for a
    /// result, and `Notify` keeps a permit when the wake lands before the
    /// park, so a feed can never be missed. Wakes without a result loop back.
    pub(crate) async fn wait(&self) -> Result<(Command, Bytes)> {
        loop {
            {
                let mut state = self.lock();
                if let Some(result) = state.results.pop_front() {
                    state.waiting = false;
                    return Ok(result);
                }
                if state.failed {
                    state.waiting = false;
                    return Err(state.error.take().unwrap_or(PeriodicError::ConnectionClosed));
                }
                state.waiting = true;
            }
            self.waiter.notified().await;
        }
    }

    /// Number of results fed but not yet received
    pub(crate) fn pending_results(&self) -> usize {
        self.lock().results.len()
    }

    pub(crate) fn last_command(&self) -> Option<Command> {
        self.lock().last_command
    }
}

/// One logical call on a multiplexed connection.
///
/// Created by [`crate::Multiplexer::new_agent`] and deregistered when dropped.
/// `receive` takes `&mut self`, so two callers can never park on the same
/// agent at once.
#[derive(Debug)]
pub struct RequestAgent {
    id: Bytes,
    slot: Arc<AgentSlot>,
    conn: Arc<Connection>,
}

impl RequestAgent {
    pub(crate) fn new(id: Bytes, slot: Arc<AgentSlot>, conn: Arc<Connection>) -> Self {
        Self { id, slot, conn }
    }

    /// Correlation id of this call
    pub fn id(&self) -> &Bytes {
        &self.id
    }

    /// Write one frame for this call. Does not wait for a response.
    pub async fn send(&self, command: Command, payload: impl Into<Bytes>) -> Result<()> {
        let frame = Frame::new(self.id.clone(), command, payload);
        debug!(id = %String::from_utf8_lossy(&self.id), %command, "Sending frame");
        self.conn.send_frame(&frame).await
    }

    /// Wait for the next response routed to this call
    pub async fn receive(&mut self) -> Result<(Command, Bytes)> {
        self.slot.wait().await
    }

    /// Send a request and wait for its response
    pub async fn call(&mut self, command: Command, payload: impl Into<Bytes>) -> Result<(Command, Bytes)> {
        self.send(command, payload).await?;
        self.receive().await
    }

    /// Feed a response as if it came from the connection
    pub fn feed_command(&self, command: Command, payload: impl Into<Bytes>) {
        self.slot.feed_command(command, payload.into());
    }

    /// Fail the call with `error`
    pub fn feed_error(&self, error: PeriodicError) {
        self.slot.feed_error(error);
    }

    /// Responses fed but not yet received
    pub fn pending_results(&self) -> usize {
        self.slot.pending_results()
    }

    /// Last command code routed to this call
    pub fn last_command(&self) -> Option<Command> {
        self.slot.last_command()
    }
}

impl Drop for RequestAgent {
    fn drop(&mut self) {
        self.conn.deregister(&self.id);
    }
}
