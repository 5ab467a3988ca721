//! Application messages carried over an open direct channel.

use handoff_common::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A message exchanged between paired sessions.
///
/// Wire form: `{"type": "form-request", "payload": {...}}`. Frames are
/// accepted as long as they carry a known `type`; a missing or `null`
/// payload reads as an empty form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
#[serde(try_from = "Frame")]
pub enum BridgeMessage {
    /// Initiator → responder: field values to prefill.
    FormRequest(FormPayload),
    /// Responder → initiator: submitted values.
    FormResponse(FormPayload),
}

#[derive(Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl TryFrom<Frame> for BridgeMessage {
    type Error = String;

    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        let payload = FormPayload::from(frame.payload.unwrap_or_default());
        match frame.kind.as_str() {
            "form-request" => Ok(BridgeMessage::FormRequest(payload)),
            "form-response" => Ok(BridgeMessage::FormResponse(payload)),
            other => Err(format!("unknown message type `{other}`")),
        }
    }
}

impl BridgeMessage {
    /// Parse a channel frame. Non-JSON, untyped, or unknown frames are errors.
    pub fn parse(text: &str) -> Result<Self, BridgeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, BridgeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn payload(&self) -> &FormPayload {
        match self {
            BridgeMessage::FormRequest(p) | BridgeMessage::FormResponse(p) => p,
        }
    }
}

/// Form contents as sent by the peer.
///
/// The record is application-defined, so every field is kept exactly as it
/// arrived and forwarded unchanged. The accessors read the well-known
/// contact fields leniently: numbers and booleans render as text, and a
/// plain-string address becomes its first line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormPayload {
    fields: Map<String, Value>,
}

impl From<Map<String, Value>> for FormPayload {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl FormPayload {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field; `Value::Null` removes it.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        match value.into() {
            Value::Null => {
                self.fields.remove(&key);
            }
            value => {
                self.fields.insert(key, value);
            }
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_note(self, note: impl Into<String>) -> Self {
        self.with("note", note.into())
    }

    pub fn first_name(&self) -> Option<String> {
        self.text("firstName")
    }

    pub fn last_name(&self) -> Option<String> {
        self.text("lastName")
    }

    pub fn email(&self) -> Option<String> {
        self.text("email")
    }

    pub fn phone(&self) -> Option<String> {
        self.text("phone")
    }

    pub fn note(&self) -> Option<String> {
        self.text("note")
    }

    pub fn address(&self) -> Option<Address> {
        self.fields.get("address").and_then(Address::from_value)
    }

    pub fn with_address(mut self, address: &Address) -> Self {
        if let Ok(value) = serde_json::to_value(address) {
            self.fields.insert("address".into(), value);
        }
        self
    }

    fn text(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(scalar_text)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Address {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => {
                let field = |key: &str| map.get(key).and_then(scalar_text);
                Some(Self {
                    line1: field("line1"),
                    line2: field("line2"),
                    city: field("city"),
                    region: field("region"),
                    postal_code: field("postalCode"),
                    country: field("country"),
                })
            }
            Value::String(line) => Some(Self {
                line1: Some(line.clone()),
                ..Default::default()
            }),
            _ => None,
        }
    }
}
