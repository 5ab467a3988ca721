//! Handshake messages exchanged through the relay.

use async_trait::async_trait;
use handoff_common::BridgeError;
use handoff_realtime::{RelayConnectionManager, SignalEnvelope};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Wire Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description in the browser `RTCSessionDescriptionInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity candidate in the browser `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// One pairing handshake step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingSignal {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

/// Flat body as it appears inside a signal envelope:
/// `{type?, sdp?, candidate?}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SignalBody {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<SdpType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sdp: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    candidate: Option<IceCandidate>,
}

impl PairingSignal {
    pub fn to_envelope(&self, channel: &str) -> Result<SignalEnvelope, BridgeError> {
        let body = match self {
            PairingSignal::Offer(sdp) => SignalBody {
                kind: Some(SdpType::Offer),
                sdp: Some(sdp.clone()),
                ..Default::default()
            },
            PairingSignal::Answer(sdp) => SignalBody {
                kind: Some(SdpType::Answer),
                sdp: Some(sdp.clone()),
                ..Default::default()
            },
            PairingSignal::Candidate(candidate) => SignalBody {
                candidate: Some(candidate.clone()),
                ..Default::default()
            },
        };
        match serde_json::to_value(body)? {
            serde_json::Value::Object(map) => Ok(SignalEnvelope::new(channel, map)),
            _ => Err(BridgeError::Encode("signal body is not an object".into())),
        }
    }

    pub fn from_envelope(envelope: &SignalEnvelope) -> Result<Self, BridgeError> {
        let body: SignalBody =
            serde_json::from_value(serde_json::Value::Object(envelope.body.clone()))?;
        match body {
            SignalBody {
                kind: Some(SdpType::Offer),
                sdp: Some(sdp),
                ..
            } => Ok(PairingSignal::Offer(sdp)),
            SignalBody {
                kind: Some(SdpType::Answer),
                sdp: Some(sdp),
                ..
            } => Ok(PairingSignal::Answer(sdp)),
            SignalBody {
                kind: None,
                candidate: Some(candidate),
                ..
            } => Ok(PairingSignal::Candidate(candidate)),
            _ => Err(BridgeError::Negotiation("unrecognized pairing signal".into())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PairingSignal::Offer(_) => "offer",
            PairingSignal::Answer(_) => "answer",
            PairingSignal::Candidate(_) => "candidate",
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Carries signal envelopes between sessions of one principal.
///
/// Subscribers must only see envelopes sent by other sessions.
#[async_trait]
pub trait SignalTransport: Send + Sync {
    /// Fire-and-forget publish.
    async fn send_signal(&self, envelope: SignalEnvelope);

    fn subscribe(&self) -> broadcast::Receiver<SignalEnvelope>;
}

#[async_trait]
impl SignalTransport for RelayConnectionManager {
    async fn send_signal(&self, envelope: SignalEnvelope) {
        RelayConnectionManager::send_signal(self, envelope).await;
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalEnvelope> {
        self.on_signal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(body: serde_json::Value) -> SignalEnvelope {
        match body {
            serde_json::Value::Object(map) => SignalEnvelope::new("form-bridge", map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn offer_envelope_shape() {
        let env = PairingSignal::Offer(SessionDescription::offer("v=0"))
            .to_envelope("form-bridge")
            .unwrap();
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            json!({
                "channel": "form-bridge",
                "type": "offer",
                "sdp": { "type": "offer", "sdp": "v=0" }
            })
        );
    }

    #[test]
    fn candidate_envelope_has_no_type() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 2130706431 10.0.0.2 5000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        };
        let env = PairingSignal::Candidate(candidate.clone())
            .to_envelope("form-bridge")
            .unwrap();
        assert!(!env.body.contains_key("type"));
        assert_eq!(env.body["candidate"]["sdpMid"], "0");
        assert_eq!(env.body["candidate"]["sdpMLineIndex"], 0);
        assert_eq!(
            PairingSignal::from_envelope(&env).unwrap(),
            PairingSignal::Candidate(candidate)
        );
    }

    #[test]
    fn parses_browser_answer() {
        let env = envelope(json!({
            "type": "answer",
            "sdp": { "type": "answer", "sdp": "v=0\r\n" }
        }));
        assert_eq!(
            PairingSignal::from_envelope(&env).unwrap(),
            PairingSignal::Answer(SessionDescription::answer("v=0\r\n"))
        );
    }

    #[test]
    fn rejects_incomplete_signals() {
        assert!(PairingSignal::from_envelope(&envelope(json!({ "type": "offer" }))).is_err());
        assert!(PairingSignal::from_envelope(&envelope(json!({}))).is_err());
        assert!(PairingSignal::from_envelope(&envelope(json!({ "type": "hello" }))).is_err());
    }
}
