//! In-memory stand-in for the relay's signal stream.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use handoff_common::new_connection_nonce;
use handoff_realtime::SignalEnvelope;
use tokio::sync::broadcast;

use super::lock;
use crate::signal::SignalTransport;

const HUB_CAPACITY: usize = 64;

/// Routes every envelope to all endpoints except its sender, and keeps a
/// log of everything routed.
#[derive(Default)]
pub struct SignalHub {
    endpoints: Mutex<Vec<(String, broadcast::Sender<SignalEnvelope>)>>,
    log: Mutex<Vec<SignalEnvelope>>,
}

impl SignalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A new session attached to the hub, with its own origin id.
    pub fn endpoint(self: &Arc<Self>) -> Arc<HubEndpoint> {
        let origin = new_connection_nonce();
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        lock(&self.endpoints).push((origin.clone(), tx.clone()));
        Arc::new(HubEndpoint {
            hub: Arc::clone(self),
            origin,
            tx,
        })
    }

    /// Every envelope routed so far, in order.
    pub fn sent(&self) -> Vec<SignalEnvelope> {
        lock(&self.log).clone()
    }

    /// Route an envelope as if a session with `envelope.origin` sent it.
    pub fn inject(&self, envelope: SignalEnvelope) {
        lock(&self.log).push(envelope.clone());
        for (origin, tx) in lock(&self.endpoints).iter() {
            if envelope.origin.as_deref() != Some(origin.as_str()) {
                let _ = tx.send(envelope.clone());
            }
        }
    }
}

pub struct HubEndpoint {
    hub: Arc<SignalHub>,
    origin: String,
    tx: broadcast::Sender<SignalEnvelope>,
}

impl HubEndpoint {
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

#[async_trait]
impl SignalTransport for HubEndpoint {
    async fn send_signal(&self, mut envelope: SignalEnvelope) {
        envelope.origin = Some(self.origin.clone());
        self.hub.inject(envelope);
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalEnvelope> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn envelopes_skip_their_sender() {
        let hub = SignalHub::new();
        let (a, b) = (hub.endpoint(), hub.endpoint());
        let mut a_rx = a.subscribe();
        let mut b_rx = b.subscribe();

        a.send_signal(SignalEnvelope::new("form-bridge", serde_json::Map::new()))
            .await;

        let got = b_rx.try_recv().unwrap();
        assert_eq!(got.origin.as_deref(), Some(a.origin()));
        assert!(a_rx.try_recv().is_err());
        assert_eq!(hub.sent().len(), 1);
    }
}
