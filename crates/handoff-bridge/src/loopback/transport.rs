//! In-process peer transport.
//!
//! Two connections on the same [`LoopbackNetwork`] pair up once each has a
//! local description and has applied the other's description as remote.
//! The channel then opens on both sides and text frames are delivered
//! straight into the peer's event sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use handoff_common::BridgeError;
use tracing::debug;

use super::lock;
use crate::signal::{IceCandidate, SdpType, SessionDescription};
use crate::transport::{
    LinkEvent, LinkEventSink, LinkSpec, PeerConnection, PeerConnector, PeerState,
};

const SDP_PREFIX: &str = "loopback ";

#[derive(Default)]
struct NetworkState {
    last_id: u64,
    last_owner: u64,
    endpoints: HashMap<u64, Endpoint>,
}

struct Endpoint {
    owner: u64,
    /// `None` once closed: nothing reaches the bridge after that.
    events: Option<LinkEventSink>,
    has_local: bool,
    remote_peer: Option<u64>,
    has_channel: bool,
    open: bool,
}

impl Endpoint {
    fn emit(&self, event: LinkEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    fn live(&self) -> bool {
        self.events.is_some()
    }
}

/// Shared medium for loopback connections.
#[derive(Default)]
pub struct LoopbackNetwork {
    state: Mutex<NetworkState>,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A connector whose connections can be inspected and disturbed as a
    /// group, typically one per bridge.
    pub fn connector(self: &Arc<Self>) -> Arc<LoopbackConnector> {
        let owner = {
            let mut state = lock(&self.state);
            state.last_owner += 1;
            state.last_owner
        };
        Arc::new(LoopbackConnector {
            network: Arc::clone(self),
            owner,
        })
    }

    /// Open the channel between `id` and its peer if both sides are ready.
    fn try_open(state: &mut NetworkState, id: u64) {
        let Some(peer) = state.endpoints.get(&id).and_then(|e| e.remote_peer) else {
            return;
        };
        let (Some(a), Some(b)) = (state.endpoints.get(&id), state.endpoints.get(&peer)) else {
            return;
        };
        let ready = a.live()
            && b.live()
            && a.has_local
            && b.has_local
            && b.remote_peer == Some(id)
            && (a.has_channel || b.has_channel)
            && !a.open;
        if !ready {
            return;
        }
        for side in [id, peer] {
            if let Some(endpoint) = state.endpoints.get_mut(&side) {
                endpoint.open = true;
                endpoint.emit(LinkEvent::StateChanged(PeerState::Connected));
                endpoint.emit(LinkEvent::ChannelOpen);
            }
        }
    }
}

/// Creates loopback connections on behalf of one bridge.
pub struct LoopbackConnector {
    network: Arc<LoopbackNetwork>,
    owner: u64,
}

impl LoopbackConnector {
    fn owned_live(&self) -> Vec<u64> {
        let state = lock(&self.network.state);
        let mut ids: Vec<u64> = state
            .endpoints
            .iter()
            .filter(|(_, e)| e.owner == self.owner && e.live())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Connections created so far, closed ones included.
    pub fn opened_links(&self) -> usize {
        let state = lock(&self.network.state);
        state
            .endpoints
            .values()
            .filter(|e| e.owner == self.owner)
            .count()
    }

    /// Connections not yet closed.
    pub fn live_links(&self) -> usize {
        self.owned_live().len()
    }

    /// Report a connectivity failure on every live connection.
    pub fn fail_links(&self) {
        let ids = self.owned_live();
        let mut state = lock(&self.network.state);
        for id in ids {
            if let Some(endpoint) = state.endpoints.get_mut(&id) {
                endpoint.open = false;
                endpoint.emit(LinkEvent::StateChanged(PeerState::Failed));
            }
        }
    }

    /// Report the data channel closing on every live connection.
    pub fn close_channels(&self) {
        let ids = self.owned_live();
        let mut state = lock(&self.network.state);
        for id in ids {
            if let Some(endpoint) = state.endpoints.get_mut(&id) {
                endpoint.open = false;
                endpoint.emit(LinkEvent::ChannelClosed);
            }
        }
    }

    /// Deliver a raw frame as if the peer had sent it.
    pub fn inject_message(&self, text: &str) {
        let ids = self.owned_live();
        let state = lock(&self.network.state);
        for id in ids {
            if let Some(endpoint) = state.endpoints.get(&id) {
                endpoint.emit(LinkEvent::Message(text.to_string()));
            }
        }
    }
}

#[async_trait]
impl PeerConnector for LoopbackConnector {
    async fn open(
        &self,
        spec: LinkSpec,
        events: LinkEventSink,
    ) -> Result<Box<dyn PeerConnection>, BridgeError> {
        let id = {
            let mut state = lock(&self.network.state);
            state.last_id += 1;
            let id = state.last_id;
            state.endpoints.insert(
                id,
                Endpoint {
                    owner: self.owner,
                    events: Some(events),
                    has_local: false,
                    remote_peer: None,
                    has_channel: false,
                    open: false,
                },
            );
            id
        };
        debug!(link = spec.link, endpoint = id, role = ?spec.role, "Loopback connection opened");
        Ok(Box::new(LoopbackConnection {
            id,
            network: Arc::clone(&self.network),
        }))
    }
}

struct LoopbackConnection {
    id: u64,
    network: Arc<LoopbackNetwork>,
}

impl LoopbackConnection {
    fn with_endpoint<T>(
        &self,
        f: impl FnOnce(&mut NetworkState, u64) -> Result<T, BridgeError>,
    ) -> Result<T, BridgeError> {
        let mut state = lock(&self.network.state);
        if !state.endpoints.get(&self.id).is_some_and(Endpoint::live) {
            return Err(BridgeError::Transport("connection closed".into()));
        }
        f(&mut *state, self.id)
    }

    fn description(&self, kind: SdpType) -> SessionDescription {
        SessionDescription {
            kind,
            sdp: format!("{SDP_PREFIX}{}", self.id),
        }
    }
}

#[async_trait]
impl PeerConnection for LoopbackConnection {
    async fn create_data_channel(&self, _label: &str) -> Result<(), BridgeError> {
        self.with_endpoint(|state, id| {
            if let Some(endpoint) = state.endpoints.get_mut(&id) {
                endpoint.has_channel = true;
            }
            Ok(())
        })
    }

    async fn create_offer(&self) -> Result<SessionDescription, BridgeError> {
        self.with_endpoint(|_, _| Ok(()))?;
        Ok(self.description(SdpType::Offer))
    }

    async fn create_answer(&self) -> Result<SessionDescription, BridgeError> {
        self.with_endpoint(|state, id| match state.endpoints.get(&id) {
            Some(endpoint) if endpoint.remote_peer.is_some() => Ok(()),
            _ => Err(BridgeError::Negotiation(
                "cannot answer without a remote offer".into(),
            )),
        })?;
        Ok(self.description(SdpType::Answer))
    }

    async fn set_local_description(&self, _desc: SessionDescription) -> Result<(), BridgeError> {
        self.with_endpoint(|state, id| {
            if let Some(endpoint) = state.endpoints.get_mut(&id) {
                endpoint.has_local = true;
                endpoint.emit(LinkEvent::LocalCandidate(IceCandidate {
                    candidate: format!("candidate:{id} 1 udp 2130706431 127.0.0.1 {} typ host", 40000 + id),
                    sdp_mid: Some("0".into()),
                    sdp_m_line_index: Some(0),
                    username_fragment: None,
                }));
            }
            LoopbackNetwork::try_open(state, id);
            Ok(())
        })
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), BridgeError> {
        let peer: u64 = desc
            .sdp
            .strip_prefix(SDP_PREFIX)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| BridgeError::Negotiation("unrecognized session description".into()))?;
        self.with_endpoint(|state, id| {
            if !state.endpoints.contains_key(&peer) {
                return Err(BridgeError::Negotiation(format!("unknown peer {peer}")));
            }
            if let Some(endpoint) = state.endpoints.get_mut(&id) {
                if endpoint.remote_peer.is_some() {
                    return Err(BridgeError::Negotiation(
                        "remote description already set".into(),
                    ));
                }
                endpoint.remote_peer = Some(peer);
            }
            LoopbackNetwork::try_open(state, id);
            Ok(())
        })
    }

    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<(), BridgeError> {
        self.with_endpoint(|state, id| match state.endpoints.get(&id) {
            Some(endpoint) if endpoint.remote_peer.is_some() => Ok(()),
            _ => Err(BridgeError::Negotiation(
                "candidate added before remote description".into(),
            )),
        })
    }

    async fn send_text(&self, text: &str) -> Result<(), BridgeError> {
        self.with_endpoint(|state, id| {
            let endpoint = state.endpoints.get(&id);
            let peer = match endpoint {
                Some(e) if e.open => e.remote_peer,
                _ => None,
            };
            match peer.and_then(|p| state.endpoints.get(&p)) {
                Some(peer) if peer.open && peer.live() => {
                    peer.emit(LinkEvent::Message(text.to_string()));
                    Ok(())
                }
                _ => Err(BridgeError::ChannelNotOpen),
            }
        })
    }

    async fn close(&self) {
        let mut state = lock(&self.network.state);
        let peer = match state.endpoints.get_mut(&self.id) {
            Some(endpoint) => {
                endpoint.events = None;
                let was_open = std::mem::replace(&mut endpoint.open, false);
                endpoint.remote_peer.filter(|_| was_open)
            }
            None => None,
        };
        if let Some(peer) = peer.and_then(|p| state.endpoints.get_mut(&p)) {
            if peer.open {
                peer.open = false;
                peer.emit(LinkEvent::ChannelClosed);
            }
        }
    }
}
