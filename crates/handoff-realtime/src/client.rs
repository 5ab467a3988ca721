//! Handle for one relay connection instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use handoff_common::ConnectionId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::connection::run_connection;
use crate::credentials::RealtimeCredential;
use crate::handler::{DispatchContext, Sinks};
use crate::types::{RelayClientConfig, RelayCommand};

const RETIRE_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A single relay connection. Never mutated after creation: a credential
/// change retires this instance and builds a fresh one.
pub(crate) struct RelayClient {
    id: ConnectionId,
    credential: RealtimeCredential,
    command_tx: mpsc::Sender<RelayCommand>,
    connected: Arc<AtomicBool>,
    detached: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl RelayClient {
    /// Spawn the background connection task and return its handle.
    pub(crate) fn spawn(
        config: RelayClientConfig,
        credential: RealtimeCredential,
        topics: Vec<String>,
        sinks: Sinks,
    ) -> Self {
        let id = ConnectionId::new();
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(AtomicBool::new(false));
        let detached = Arc::new(AtomicBool::new(false));

        let ctx = DispatchContext {
            connection_id: id.clone(),
            sinks,
            detached: Arc::clone(&detached),
        };

        let task = tokio::spawn(run_connection(
            config,
            credential.clone(),
            topics,
            ctx,
            Arc::clone(&connected),
            command_rx,
        ));

        Self {
            id,
            credential,
            command_tx,
            connected,
            detached,
            task,
        }
    }

    pub(crate) fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub(crate) fn credential(&self) -> &RealtimeCredential {
        &self.credential
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.is_finished()
    }

    /// The connection task has exited (failed handshake or lost socket).
    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Queue a command. Returns `false` if the task has already exited.
    pub(crate) fn send(&self, command: RelayCommand) -> bool {
        match self.command_tx.try_send(command) {
            Ok(()) => true,
            Err(e) => {
                debug!(connection = %self.id, error = %e, "Relay command dropped");
                false
            }
        }
    }

    /// Detach listeners, then close the socket. Nothing this instance
    /// receives afterwards reaches subscribers.
    pub(crate) async fn retire(self) {
        self.detached.store(true, Ordering::Release);
        let _ = self.command_tx.send(RelayCommand::Disconnect).await;

        let mut task = self.task;
        if tokio::time::timeout(RETIRE_GRACE, &mut task).await.is_err() {
            debug!(connection = %self.id, "Relay task did not stop in time, aborting");
            task.abort();
        }
    }
}
