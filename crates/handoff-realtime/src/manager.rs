//! Process-wide relay connection manager.
//!
//! Owns at most one live [`RelayClient`] at a time and the long-lived
//! subscriber sinks every client forwards into. Created once by the
//! composition root and shared as an `Arc`.

use std::collections::BTreeSet;
use std::sync::Arc;

use handoff_common::ConnectionId;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::client::RelayClient;
use crate::credentials::{CredentialSource, RealtimeCredential};
use crate::handler::Sinks;
use crate::protocol::{driver_route_topic, events, principal_topic};
use crate::protocol::{DriverPosition, OrderNote, SignalEnvelope};
use crate::types::{RelayClientConfig, RelayCommand, RelayEvent};

const SINK_CAPACITY: usize = 256;

pub struct RelayConnectionManager {
    config: RelayClientConfig,
    credentials: Arc<dyn CredentialSource>,
    sinks: Sinks,
    /// Serializes connect / rebuild / disconnect.
    lifecycle: Mutex<()>,
    current: Mutex<Option<RelayClient>>,
    routes: Mutex<BTreeSet<String>>,
}

impl RelayConnectionManager {
    pub fn new(config: RelayClientConfig, credentials: Arc<dyn CredentialSource>) -> Arc<Self> {
        Arc::new(Self {
            config,
            credentials,
            sinks: Sinks::new(SINK_CAPACITY),
            lifecycle: Mutex::new(()),
            current: Mutex::new(None),
            routes: Mutex::new(BTreeSet::new()),
        })
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Open a connection with the current credential.
    ///
    /// No-op when no credential is available or when the live connection was
    /// built with the same credential. A changed credential retires the old
    /// connection first.
    pub async fn connect(&self) {
        let Some(credential) = self.credentials.realtime_credential() else {
            info!("No realtime credential available, relay connect skipped");
            return;
        };

        let _guard = self.lifecycle.lock().await;
        {
            let current = self.current.lock().await;
            if let Some(client) = current.as_ref() {
                if client.credential() == &credential && !client.is_finished() {
                    debug!(connection = %client.id(), "Relay already connected with this credential");
                    return;
                }
            }
        }
        self.replace(Some(credential)).await;
    }

    /// Retire the current connection and open a new one with `credential`.
    pub async fn rebuild(&self, credential: RealtimeCredential) {
        let _guard = self.lifecycle.lock().await;
        self.replace(Some(credential)).await;
    }

    /// Detach listeners, close the connection, and forget the credential.
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        self.replace(None).await;
    }

    pub async fn shutdown(&self) {
        info!("Relay connection manager shutting down");
        self.disconnect().await;
    }

    async fn replace(&self, credential: Option<RealtimeCredential>) {
        let old = self.current.lock().await.take();
        if let Some(old) = old {
            info!(connection = %old.id(), "Retiring relay connection");
            old.retire().await;
        }

        let Some(credential) = credential else {
            return;
        };

        let mut topics = vec![principal_topic(&credential.principal_id)];
        topics.extend(self.routes.lock().await.iter().cloned());

        let client = RelayClient::spawn(
            self.config.clone(),
            credential,
            topics,
            self.sinks.clone(),
        );
        info!(connection = %client.id(), "Relay connection started");
        *self.current.lock().await = Some(client);
    }

    // -- Snapshots ----------------------------------------------------------

    pub async fn is_connected(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.is_connected())
    }

    /// Identifier stamped into outgoing signals by the current connection.
    pub async fn connection_id(&self) -> Option<ConnectionId> {
        self.current.lock().await.as_ref().map(|c| c.id().clone())
    }

    // -- Pairing signals ----------------------------------------------------

    /// Publish an envelope to the principal's other sessions. Dropped when
    /// not connected.
    pub async fn send_signal(&self, mut envelope: SignalEnvelope) {
        let current = self.current.lock().await;
        let Some(client) = current.as_ref().filter(|c| c.is_connected()) else {
            debug!(channel = %envelope.channel, "Relay not connected, signal dropped");
            return;
        };
        envelope.origin = Some(client.id().to_string());
        let payload = match serde_json::to_value(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode signal envelope");
                return;
            }
        };
        client.send(RelayCommand::Broadcast {
            topic: principal_topic(&client.credential().principal_id),
            event: events::SIGNAL.to_string(),
            payload,
        });
    }

    /// Inbound envelopes from other connections. Drop the receiver to
    /// unsubscribe.
    pub fn on_signal(&self) -> broadcast::Receiver<SignalEnvelope> {
        self.sinks.signals.subscribe()
    }

    // -- Driver positions ---------------------------------------------------

    /// Join a driver route topic, now and on every future connection.
    pub async fn subscribe_driver_route(&self, key: &str) {
        // Serialized with `replace` so the route reaches whichever
        // connection ends up current.
        let _guard = self.lifecycle.lock().await;
        let topic = driver_route_topic(key);
        let inserted = self.routes.lock().await.insert(topic.clone());
        if !inserted {
            return;
        }
        if let Some(client) = self.current.lock().await.as_ref() {
            client.send(RelayCommand::Join { topic });
        }
    }

    pub async fn send_driver_position(&self, position: &DriverPosition) {
        let topic = driver_route_topic(&position.route_key);
        self.publish(topic, events::DRIVER_POSITION, position).await;
    }

    pub fn on_driver_position(&self) -> broadcast::Receiver<DriverPosition> {
        self.sinks.positions.subscribe()
    }

    // -- Order notes --------------------------------------------------------

    pub async fn send_order_note(&self, note: &OrderNote) {
        let current = self.current.lock().await;
        let Some(client) = current.as_ref() else {
            debug!(order_id = %note.order_id, "Relay not connected, order note dropped");
            return;
        };
        let topic = principal_topic(&client.credential().principal_id);
        drop(current);
        self.publish(topic, events::ORDER_NOTE, note).await;
    }

    pub fn on_order_note(&self) -> broadcast::Receiver<OrderNote> {
        self.sinks.notes.subscribe()
    }

    // -- Lifecycle events ---------------------------------------------------

    pub fn on_event(&self) -> broadcast::Receiver<RelayEvent> {
        self.sinks.events.subscribe()
    }

    async fn publish<T: serde::Serialize>(&self, topic: String, event: &str, payload: &T) {
        let current = self.current.lock().await;
        let Some(client) = current.as_ref().filter(|c| c.is_connected()) else {
            debug!(topic = %topic, event = %event, "Relay not connected, publish dropped");
            return;
        };
        match serde_json::to_value(payload) {
            Ok(payload) => {
                client.send(RelayCommand::Broadcast {
                    topic,
                    event: event.to_string(),
                    payload,
                });
            }
            Err(e) => warn!(event = %event, error = %e, "Failed to encode relay payload"),
        }
    }
}
