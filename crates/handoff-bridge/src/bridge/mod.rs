//! Public handle for the pairing bridge.

mod driver;
mod types;

pub use types::{BridgeOptions, BridgeSnapshot, BridgeStatus};

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::message::{BridgeMessage, FormPayload};
use crate::signal::SignalTransport;
use crate::transport::PeerConnector;
use driver::{Channels, Command, Driver};

const MESSAGE_CAPACITY: usize = 64;

/// Handle to a running pairing bridge.
///
/// Every method is non-blocking with respect to negotiation: commands are
/// queued to the bridge task, which owns all link state. Failures never
/// surface as errors here; they show up in [`status`](Self::status) and
/// [`last_error`](Self::last_error).
pub struct PairingBridge {
    command_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<BridgeSnapshot>,
    message_tx: broadcast::Sender<BridgeMessage>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PairingBridge {
    /// Start the bridge task. The signal subscription is taken before this
    /// returns, so no handshake message sent afterwards is missed.
    pub fn spawn(
        options: BridgeOptions,
        connector: Arc<dyn PeerConnector>,
        relay: Arc<dyn SignalTransport>,
    ) -> Self {
        let (command_tx, commands) = mpsc::channel(64);
        let (snapshot_tx, snapshot_rx) = watch::channel(BridgeSnapshot::default());
        let (message_tx, _) = broadcast::channel(MESSAGE_CAPACITY);

        let channels = Channels {
            commands,
            signals: relay.subscribe(),
            snapshot: snapshot_tx,
            messages: message_tx.clone(),
        };
        let task = tokio::spawn(Driver::run(options, connector, relay, channels));

        Self {
            command_tx,
            snapshot_rx,
            message_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Start negotiating unless a link is already connecting or connected.
    pub async fn ensure_connection(&self, initiate: bool) {
        let _ = self.command_tx.send(Command::Ensure { initiate }).await;
    }

    pub async fn send_form_request(&self, payload: FormPayload) -> bool {
        self.send(BridgeMessage::FormRequest(payload)).await
    }

    pub async fn send_form_response(&self, payload: FormPayload) -> bool {
        self.send(BridgeMessage::FormResponse(payload)).await
    }

    /// `true` when the message was handed to an open channel. `false`
    /// means no delivery; status is now `error`.
    async fn send(&self, message: BridgeMessage) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Send { message, reply })
            .await
            .is_err()
        {
            debug!("Bridge stopped, message not sent");
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Status changes. Drop the receiver to unsubscribe.
    pub fn on_status_change(&self) -> watch::Receiver<BridgeSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Messages received from the peer. Drop the receiver to unsubscribe.
    pub fn on_message(&self) -> broadcast::Receiver<BridgeMessage> {
        self.message_tx.subscribe()
    }

    pub fn status(&self) -> BridgeStatus {
        self.snapshot_rx.borrow().status
    }

    pub fn last_error(&self) -> Option<String> {
        self.snapshot_rx.borrow().last_error.clone()
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Close the current link and stop the bridge task.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown).await;
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests;
