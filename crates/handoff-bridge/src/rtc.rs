//! WebRTC transport backed by webrtc-rs.

use std::sync::Arc;

use async_trait::async_trait;
use handoff_common::BridgeError;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::signal::{IceCandidate, SdpType, SessionDescription};
use crate::transport::{
    LinkEvent, LinkEventSink, LinkSpec, PeerConnection, PeerConnector, PeerState, Role,
};

/// STUN/TURN server entry.
#[derive(Clone, Default)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl std::fmt::Debug for IceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IceServer")
            .field("urls", &self.urls)
            .field("username", &self.username)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn transport_error(e: webrtc::Error) -> BridgeError {
    BridgeError::Transport(e.to_string())
}

fn negotiation_error(e: webrtc::Error) -> BridgeError {
    BridgeError::Negotiation(e.to_string())
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, BridgeError> {
    let result = match desc.kind {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        SdpType::Rollback => {
            return Err(BridgeError::Negotiation("rollback is not supported".into()))
        }
    };
    result.map_err(negotiation_error)
}

fn from_rtc_description(desc: RTCSessionDescription) -> Result<SessionDescription, BridgeError> {
    let kind = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(BridgeError::Negotiation(
                "session description has no type".into(),
            ))
        }
    };
    Ok(SessionDescription {
        kind,
        sdp: desc.sdp,
    })
}

fn from_rtc_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn to_rtc_candidate(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_m_line_index,
        username_fragment: candidate.username_fragment,
    }
}

fn peer_state(state: RTCPeerConnectionState) -> Option<PeerState> {
    match state {
        RTCPeerConnectionState::New => Some(PeerState::New),
        RTCPeerConnectionState::Connecting => Some(PeerState::Connecting),
        RTCPeerConnectionState::Connected => Some(PeerState::Connected),
        RTCPeerConnectionState::Disconnected => Some(PeerState::Disconnected),
        RTCPeerConnectionState::Failed => Some(PeerState::Failed),
        RTCPeerConnectionState::Closed => Some(PeerState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

pub struct WebRtcConnector {
    api: API,
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcConnector {
    pub fn new(ice_servers: &[IceServer]) -> Result<Self, BridgeError> {
        let mut media = MediaEngine::default();
        let registry =
            register_default_interceptors(Registry::new(), &mut media).map_err(transport_error)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = ice_servers
            .iter()
            .map(|s| RTCIceServer {
                urls: s.urls.clone(),
                username: s.username.clone().unwrap_or_default(),
                credential: s.credential.clone().unwrap_or_default(),
            })
            .collect();

        Ok(Self { api, ice_servers })
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn open(
        &self,
        spec: LinkSpec,
        events: LinkEventSink,
    ) -> Result<Box<dyn PeerConnection>, BridgeError> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(RTCConfiguration {
                    ice_servers: self.ice_servers.clone(),
                    ..Default::default()
                })
                .await
                .map_err(transport_error)?,
        );
        let channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>> = Arc::default();

        let sink = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let sink = sink.clone();
            Box::pin(async move {
                // `None` marks the end of gathering.
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => sink.emit(LinkEvent::LocalCandidate(from_rtc_candidate(init))),
                    Err(e) => warn!(error = %e, "Failed to encode local candidate"),
                }
            })
        }));

        let sink = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let sink = sink.clone();
            Box::pin(async move {
                if let Some(state) = peer_state(state) {
                    sink.emit(LinkEvent::StateChanged(state));
                }
            })
        }));

        if spec.role == Role::Responder {
            let sink = events.clone();
            let slot = Arc::clone(&channel);
            let label = spec.channel_label.clone();
            pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let sink = sink.clone();
                let slot = Arc::clone(&slot);
                let label = label.clone();
                Box::pin(async move {
                    if dc.label() != label {
                        debug!(label = %dc.label(), "Ignoring unexpected data channel");
                        return;
                    }
                    attach_channel(&dc, sink);
                    *slot.lock().await = Some(dc);
                })
            }));
        }

        debug!(link = spec.link, role = ?spec.role, "WebRTC peer connection created");
        Ok(Box::new(WebRtcConnection {
            pc,
            channel,
            events,
        }))
    }
}

fn attach_channel(dc: &Arc<RTCDataChannel>, sink: LinkEventSink) {
    let on_open = sink.clone();
    dc.on_open(Box::new(move || {
        Box::pin(async move {
            on_open.emit(LinkEvent::ChannelOpen);
        })
    }));

    let on_close = sink.clone();
    dc.on_close(Box::new(move || {
        let sink = on_close.clone();
        Box::pin(async move {
            sink.emit(LinkEvent::ChannelClosed);
        })
    }));

    let on_error = sink.clone();
    dc.on_error(Box::new(move |err: webrtc::Error| {
        let sink = on_error.clone();
        Box::pin(async move {
            sink.emit(LinkEvent::ChannelError(err.to_string()));
        })
    }));

    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let sink = sink.clone();
        Box::pin(async move {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => sink.emit(LinkEvent::Message(text)),
                Err(_) => debug!("Dropping non-UTF-8 data channel frame"),
            }
        })
    }));
}

fn detach_channel(dc: &Arc<RTCDataChannel>) {
    dc.on_open(Box::new(|| Box::pin(async {})));
    dc.on_close(Box::new(|| Box::pin(async {})));
    dc.on_error(Box::new(|_| Box::pin(async {})));
    dc.on_message(Box::new(|_| Box::pin(async {})));
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

struct WebRtcConnection {
    pc: Arc<RTCPeerConnection>,
    channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    events: LinkEventSink,
}

#[async_trait]
impl PeerConnection for WebRtcConnection {
    async fn create_data_channel(&self, label: &str) -> Result<(), BridgeError> {
        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(transport_error)?;
        attach_channel(&dc, self.events.clone());
        *self.channel.lock().await = Some(dc);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, BridgeError> {
        let offer = self.pc.create_offer(None).await.map_err(negotiation_error)?;
        from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, BridgeError> {
        let answer = self.pc.create_answer(None).await.map_err(negotiation_error)?;
        from_rtc_description(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), BridgeError> {
        self.pc
            .set_local_description(to_rtc_description(desc)?)
            .await
            .map_err(negotiation_error)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), BridgeError> {
        self.pc
            .set_remote_description(to_rtc_description(desc)?)
            .await
            .map_err(negotiation_error)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), BridgeError> {
        self.pc
            .add_ice_candidate(to_rtc_candidate(candidate))
            .await
            .map_err(negotiation_error)
    }

    async fn send_text(&self, text: &str) -> Result<(), BridgeError> {
        let dc = self.channel.lock().await.clone();
        match dc {
            Some(dc) if dc.ready_state() == RTCDataChannelState::Open => {
                dc.send_text(text.to_string())
                    .await
                    .map_err(transport_error)?;
                Ok(())
            }
            _ => Err(BridgeError::ChannelNotOpen),
        }
    }

    async fn close(&self) {
        self.pc.on_ice_candidate(Box::new(|_| Box::pin(async {})));
        self.pc
            .on_peer_connection_state_change(Box::new(|_| Box::pin(async {})));
        self.pc.on_data_channel(Box::new(|_| Box::pin(async {})));

        if let Some(dc) = self.channel.lock().await.take() {
            detach_channel(&dc);
            if let Err(e) = dc.close().await {
                debug!(error = %e, "Data channel close failed");
            }
        }
        if let Err(e) = self.pc.close().await {
            debug!(error = %e, "Peer connection close failed");
        }
    }
}
