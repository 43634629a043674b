//! Session runtime: reassembles chunked snapshots per transport session.
//!
//! The transport delivers each session's messages in order. The router gives
//! every session its own task, which buffers chunks until the last one,
//! hands the merged snapshot to the sink, then completes all buffered
//! messages at once and closes the session. Sessions share nothing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use groupsync_engine::{Chunk, SessionBuffer};

use crate::error::{join_err, DaemonError};
use crate::stage::{SnapshotSink, StageOutcome};

pub type SessionId = String;

const SESSION_CHANNEL_CAPACITY: usize = 64;

/// Message transport with session affinity.
pub trait SessionTransport: Send + Sync + 'static {
    /// Opaque handle used to acknowledge one delivered message.
    type Token: Send + 'static;

    /// Acknowledge `tokens` so they are not redelivered.
    fn complete(
        &self,
        session: &str,
        tokens: Vec<Self::Token>,
    ) -> impl Future<Output = Result<(), DaemonError>> + Send;

    /// Release the session.
    fn close_session(&self, session: &str) -> impl Future<Output = Result<(), DaemonError>> + Send;
}

/// Transport that records acknowledgements in memory.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    state: std::sync::Mutex<TransportLog>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportLog {
    /// `(session, tokens)` per `complete` call, in call order.
    pub completed: Vec<(SessionId, Vec<u64>)>,
    pub closed: Vec<SessionId>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> TransportLog {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl SessionTransport for InMemoryTransport {
    type Token = u64;

    async fn complete(&self, session: &str, tokens: Vec<u64>) -> Result<(), DaemonError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.completed.push((session.to_string(), tokens));
        Ok(())
    }

    async fn close_session(&self, session: &str) -> Result<(), DaemonError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closed.push(session.to_string());
        Ok(())
    }
}

/// Result of one finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub session: SessionId,
    pub outcome: StageOutcome,
}

type Delivery<T> = (Chunk, T);

/// Fans deliveries out to one task per session.
pub struct SessionRouter<T: SessionTransport, S> {
    transport: Arc<T>,
    sink: Arc<S>,
    sessions: HashMap<SessionId, mpsc::Sender<Delivery<T::Token>>>,
    tasks: JoinSet<Result<SessionReport, DaemonError>>,
}

impl<T: SessionTransport, S: SnapshotSink> SessionRouter<T, S> {
    pub fn new(transport: Arc<T>, sink: Arc<S>) -> Self {
        Self {
            transport,
            sink,
            sessions: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Route one message to its session's task, starting the task if needed.
    pub async fn deliver(
        &mut self,
        session: &str,
        chunk: Chunk,
        token: T::Token,
    ) -> Result<(), DaemonError> {
        let mut delivery = (chunk, token);
        if let Some(tx) = self.sessions.get(session) {
            match tx.send(delivery).await {
                Ok(()) => return Ok(()),
                // The previous task for this id already finished.
                Err(mpsc::error::SendError(returned)) => delivery = returned,
            }
        }

        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        self.tasks.spawn(session_task(
            session.to_string(),
            rx,
            Arc::clone(&self.transport),
            Arc::clone(&self.sink),
        ));
        tx.send(delivery)
            .await
            .map_err(|_| DaemonError::ChannelClosed("session delivery"))?;
        self.sessions.insert(session.to_string(), tx);
        Ok(())
    }

    /// Stop accepting deliveries and wait for every session task.
    ///
    /// All tasks are drained even when one fails; the first failure is
    /// returned.
    pub async fn finish(mut self) -> Result<Vec<SessionReport>, DaemonError> {
        self.sessions.clear();
        let mut reports = Vec::new();
        let mut first_err = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined.map_err(|e| join_err("session", e)).and_then(|r| r) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    tracing::error!(error = %err, "session failed");
                    first_err.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }
        reports.sort_by(|a, b| a.session.cmp(&b.session));
        Ok(reports)
    }
}

async fn session_task<T: SessionTransport, S: SnapshotSink>(
    session: SessionId,
    mut rx: mpsc::Receiver<Delivery<T::Token>>,
    transport: Arc<T>,
    sink: Arc<S>,
) -> Result<SessionReport, DaemonError> {
    let mut buffer = SessionBuffer::new();

    while let Some((chunk, token)) = rx.recv().await {
        let Some(collected) = buffer.push(chunk, token) else {
            continue;
        };

        let handled = match collected.result {
            Ok(snapshot) => {
                tracing::info!(
                    session = %session,
                    job = %snapshot.job,
                    members = snapshot.members.len(),
                    "session collected",
                );
                sink.handle(snapshot).await
            }
            Err(err) => {
                tracing::error!(session = %session, error = %err, "invalid snapshot");
                Ok(StageOutcome::Rejected(err.to_string()))
            }
        };

        match handled {
            Ok(outcome) => {
                transport.complete(&session, collected.tokens).await?;
                transport.close_session(&session).await?;
                return Ok(SessionReport { session, outcome });
            }
            Err(err) => {
                // Unacknowledged messages are redelivered by the transport.
                tracing::error!(session = %session, error = %err, "sync stage failed");
                transport.close_session(&session).await?;
                return Err(err);
            }
        }
    }

    Err(DaemonError::Session {
        reason: format!("closed with {} chunk(s) and no last chunk", buffer.pending()),
        session,
    })
}
