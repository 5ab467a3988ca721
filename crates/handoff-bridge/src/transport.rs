//! Seam between the bridge and the point-to-point transport.

use std::fmt;

use async_trait::async_trait;
use handoff_common::BridgeError;
use tokio::sync::mpsc;
use tracing::trace;

use crate::signal::{IceCandidate, SessionDescription};

/// Monotonic identifier of one pairing attempt.
pub type LinkId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the data channel and sends the offer.
    Initiator,
    /// Waits for an offer and answers it.
    Responder,
}

/// Connectivity state reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerState::New => "new",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::Disconnected => "disconnected",
            PeerState::Failed => "failed",
            PeerState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Callback from a transport, delivered to the bridge task.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    LocalCandidate(IceCandidate),
    StateChanged(PeerState),
    ChannelOpen,
    ChannelClosed,
    ChannelError(String),
    Message(String),
}

/// Where a connection reports its callbacks. Every event is tagged with the
/// link it was created for.
#[derive(Debug, Clone)]
pub struct LinkEventSink {
    link: LinkId,
    tx: mpsc::UnboundedSender<(LinkId, LinkEvent)>,
}

impl LinkEventSink {
    pub fn new(link: LinkId, tx: mpsc::UnboundedSender<(LinkId, LinkEvent)>) -> Self {
        Self { link, tx }
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn emit(&self, event: LinkEvent) {
        if self.tx.send((self.link, event)).is_err() {
            trace!(link = self.link, "Bridge task gone, link event dropped");
        }
    }
}

/// Parameters for a new connection.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub link: LinkId,
    pub role: Role,
    pub channel_label: String,
}

/// Creates fresh connection objects, one per pairing attempt.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn open(
        &self,
        spec: LinkSpec,
        events: LinkEventSink,
    ) -> Result<Box<dyn PeerConnection>, BridgeError>;
}

/// One direct-connection object. Never reused across attempts.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Create the named reliable ordered channel (initiator side).
    async fn create_data_channel(&self, label: &str) -> Result<(), BridgeError>;

    async fn create_offer(&self) -> Result<SessionDescription, BridgeError>;

    async fn create_answer(&self) -> Result<SessionDescription, BridgeError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), BridgeError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), BridgeError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), BridgeError>;

    /// Send one text frame on the open data channel.
    async fn send_text(&self, text: &str) -> Result<(), BridgeError>;

    /// Detach every callback, then close. No events may follow.
    async fn close(&self);
}
