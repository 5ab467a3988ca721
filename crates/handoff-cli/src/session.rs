//! Composition root: builds the relay manager and the pairing bridge from
//! config and tears them down again.

use std::sync::Arc;
use std::time::Duration;

use handoff_bridge::{BridgeOptions, IceServer, PairingBridge, SignalTransport, WebRtcConnector};
use handoff_common::{HandoffError, RelayError};
use handoff_config::{BridgeConfig, HandoffConfig, IceConfig, RelayConfig};
use handoff_realtime::{
    RealtimeCredential, RelayClientConfig, RelayConnectionManager, RelayEvent, StaticCredentials,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

pub fn relay_config(config: &RelayConfig) -> RelayClientConfig {
    RelayClientConfig {
        url: config.url.clone(),
        api_key: config.api_key.clone(),
        heartbeat_interval_secs: u64::from(config.heartbeat_interval_secs),
        connect_timeout_secs: u64::from(config.connect_timeout_secs),
    }
}

pub fn bridge_options(config: &BridgeConfig) -> BridgeOptions {
    BridgeOptions::from_millis(
        u64::from(config.reconnect_delay_ms),
        u64::from(config.negotiation_timeout_ms),
        config.channel_label.clone(),
    )
}

pub fn ice_servers(config: &IceConfig) -> Vec<IceServer> {
    config
        .servers
        .iter()
        .map(|s| IceServer {
            urls: s.urls.clone(),
            username: s.username.clone(),
            credential: s.credential.clone(),
        })
        .collect()
}

pub struct Session {
    pub relay: Arc<RelayConnectionManager>,
    bridge: Option<PairingBridge>,
    config: HandoffConfig,
}

impl Session {
    /// Connect to the relay and wait for the handshake to finish.
    pub async fn connect(
        config: HandoffConfig,
        credential: RealtimeCredential,
    ) -> Result<Self, HandoffError> {
        let credentials = Arc::new(StaticCredentials::new(Some(credential)));
        let relay = RelayConnectionManager::new(relay_config(&config.relay), credentials);

        let mut events = relay.on_event();
        relay.connect().await;

        let limit = Duration::from_secs(u64::from(config.relay.connect_timeout_secs) + 5);
        match tokio::time::timeout(limit, wait_for_relay(&mut events)).await {
            Ok(result) => result?,
            Err(_) => return Err(RelayError::Connect("timed out".into()).into()),
        }

        Ok(Self {
            relay,
            bridge: None,
            config,
        })
    }

    /// Start the pairing bridge on top of the relay connection.
    pub fn bridge(&mut self) -> Result<&PairingBridge, HandoffError> {
        if self.bridge.is_none() {
            let connector = WebRtcConnector::new(&ice_servers(&self.config.ice))?;
            let signals: Arc<dyn SignalTransport> = self.relay.clone();
            let bridge = PairingBridge::spawn(
                bridge_options(&self.config.bridge),
                Arc::new(connector),
                signals,
            );
            info!(channel = %self.config.bridge.channel_label, "Pairing bridge started");
            self.bridge = Some(bridge);
        }
        self.bridge
            .as_ref()
            .ok_or_else(|| HandoffError::Other("bridge not started".into()))
    }

    pub async fn shutdown(self) {
        if let Some(bridge) = &self.bridge {
            bridge.shutdown().await;
        }
        self.relay.shutdown().await;
        debug!("Session shut down");
    }
}

async fn wait_for_relay(events: &mut broadcast::Receiver<RelayEvent>) -> Result<(), RelayError> {
    loop {
        match events.recv().await {
            Ok(RelayEvent::Connected { connection_id }) => {
                info!(%connection_id, "Relay connected");
                return Ok(());
            }
            Ok(RelayEvent::Error(e)) => return Err(e),
            Ok(RelayEvent::Disconnected { .. }) | Err(RecvError::Closed) => {
                return Err(RelayError::Closed)
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    }
}
