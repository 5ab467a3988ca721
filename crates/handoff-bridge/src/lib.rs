//! Pairing bridge: a direct peer-to-peer channel between two sessions of
//! the same principal, negotiated over the relay's signal stream.
//!
//! The public surface is [`PairingBridge`]. Negotiation decisions live in
//! the pure transition function in [`machine`]; the bridge task only
//! executes the effects it returns.

mod bridge;
pub mod loopback;
pub mod machine;
pub mod message;
pub mod signal;
pub mod transport;
#[cfg(feature = "webrtc")]
pub mod rtc;

#[cfg(feature = "webrtc")]
pub use rtc::{IceServer, WebRtcConnector};


pub use bridge::{BridgeOptions, BridgeSnapshot, BridgeStatus, PairingBridge};
pub use message::{Address, BridgeMessage, FormPayload};
pub use signal::{IceCandidate, PairingSignal, SdpType, SessionDescription, SignalTransport};
pub use transport::{LinkEvent, LinkEventSink, LinkId, LinkSpec, PeerConnection, PeerConnector, PeerState, Role};

/// Signal channel used for pairing traffic.
pub const FORM_BRIDGE_CHANNEL: &str = "form-bridge";

/// Delay before a failed or closed link is replaced.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Upper bound on a link staying in `connecting`.
pub const DEFAULT_NEGOTIATION_TIMEOUT_MS: u64 = 20_000;
