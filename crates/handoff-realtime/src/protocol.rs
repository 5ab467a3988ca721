//! Payloads carried over the relay connection.
//!
//! All three logical streams ride Phoenix broadcast messages; the relay
//! forwards them to the other sessions of the same principal without
//! interpreting them.

use serde::{Deserialize, Serialize};

/// Broadcast event names.
pub mod events {
    pub const SIGNAL: &str = "signal";
    pub const DRIVER_POSITION: &str = "driver-position";
    pub const ORDER_NOTE: &str = "order-note";
}

/// Topic shared by every session of one principal.
pub fn principal_topic(principal_id: &str) -> String {
    format!("principal:{principal_id}")
}

/// Topic carrying positions for one driver route.
pub fn driver_route_topic(key: &str) -> String {
    format!("driver-route:{key}")
}

/// An addressed signal routed to the principal's other sessions.
///
/// `channel` discriminates consumers (pairing uses `"form-bridge"`);
/// `origin` is the sending connection's id; everything else is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

impl SignalEnvelope {
    pub fn new(channel: impl Into<String>, body: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            channel: channel.into(),
            origin: None,
            body,
        }
    }
}

/// Live position update for a driver route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverPosition {
    pub route_key: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

/// Notification that a note was attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNote {
    pub order_id: String,
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}
