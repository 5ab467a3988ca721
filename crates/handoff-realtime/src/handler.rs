//! Incoming Phoenix message handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use handoff_common::ConnectionId;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::protocol::{events, DriverPosition, OrderNote, SignalEnvelope};
use crate::types::{PhoenixMessage, RelayEvent};

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Long-lived fan-out senders owned by the manager. Every connection
/// instance forwards into the same sinks, so subscribers survive rebuilds.
#[derive(Clone)]
pub(crate) struct Sinks {
    pub(crate) signals: broadcast::Sender<SignalEnvelope>,
    pub(crate) positions: broadcast::Sender<DriverPosition>,
    pub(crate) notes: broadcast::Sender<OrderNote>,
    pub(crate) events: broadcast::Sender<RelayEvent>,
}

impl Sinks {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            signals: broadcast::channel(capacity).0,
            positions: broadcast::channel(capacity).0,
            notes: broadcast::channel(capacity).0,
            events: broadcast::channel(capacity).0,
        }
    }
}

/// Per-connection view of the sinks. Once `detached` is set, nothing from
/// this connection reaches subscribers any more.
#[derive(Clone)]
pub(crate) struct DispatchContext {
    pub(crate) connection_id: ConnectionId,
    pub(crate) sinks: Sinks,
    pub(crate) detached: Arc<AtomicBool>,
}

impl DispatchContext {
    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub(crate) fn emit(&self, event: RelayEvent) {
        if self.is_detached() {
            return;
        }
        let _ = self.sinks.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Extract the short topic name from a Phoenix topic (strip "realtime:" prefix).
pub(crate) fn strip_topic_prefix(topic: &str) -> &str {
    topic.strip_prefix("realtime:").unwrap_or(topic)
}

fn reply_reason(payload: &serde_json::Value) -> String {
    payload
        .get("response")
        .and_then(|r| r.get("reason"))
        .and_then(|r| r.as_str())
        .unwrap_or("unknown error")
        .to_string()
}

// ---------------------------------------------------------------------------
// Message Handler
// ---------------------------------------------------------------------------

/// Handle a single incoming Phoenix message.
///
/// `pending_joins` maps outstanding `phx_join` refs to their topics so join
/// replies can be told apart from heartbeat replies.
pub(crate) fn handle_phoenix_message(
    msg: &PhoenixMessage,
    ctx: &DispatchContext,
    pending_joins: &mut HashMap<String, String>,
) {
    if ctx.is_detached() {
        return;
    }
    let topic = strip_topic_prefix(&msg.topic);

    match msg.event.as_str() {
        "phx_reply" => {
            let Some(join_topic) = msg.msg_ref.as_ref().and_then(|r| pending_joins.remove(r))
            else {
                return;
            };
            let status = msg
                .payload
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("error");
            if status == "ok" {
                debug!(topic = %join_topic, "Channel joined");
                ctx.emit(RelayEvent::ChannelJoined { topic: join_topic });
            } else {
                let message = reply_reason(&msg.payload);
                warn!(topic = %join_topic, status = %status, reason = %message, "Channel join rejected");
                ctx.emit(RelayEvent::ChannelError {
                    topic: join_topic,
                    message,
                });
            }
        }
        "phx_error" => {
            warn!(topic = %topic, "Channel error");
            ctx.emit(RelayEvent::ChannelError {
                topic: topic.to_string(),
                message: "Channel error".to_string(),
            });
        }
        "phx_close" => {
            info!(topic = %topic, "Channel closed");
            ctx.emit(RelayEvent::ChannelError {
                topic: topic.to_string(),
                message: "Channel closed".to_string(),
            });
        }
        "broadcast" => {
            let inner_event = msg
                .payload
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            let inner_payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            dispatch_broadcast(topic, inner_event, inner_payload, ctx);
        }
        _ => {
            debug!(topic = %topic, event = %msg.event, "Unhandled Phoenix event");
        }
    }
}

fn dispatch_broadcast(
    topic: &str,
    event: &str,
    payload: serde_json::Value,
    ctx: &DispatchContext,
) {
    match event {
        events::SIGNAL => match serde_json::from_value::<SignalEnvelope>(payload) {
            Ok(envelope) => {
                if envelope.origin.as_deref() == Some(ctx.connection_id.as_str()) {
                    debug!(channel = %envelope.channel, "Dropping self-echoed signal");
                    return;
                }
                let _ = ctx.sinks.signals.send(envelope);
            }
            Err(e) => debug!(topic = %topic, error = %e, "Malformed signal envelope"),
        },
        events::DRIVER_POSITION => match serde_json::from_value::<DriverPosition>(payload) {
            Ok(position) => {
                let _ = ctx.sinks.positions.send(position);
            }
            Err(e) => debug!(topic = %topic, error = %e, "Malformed driver position"),
        },
        events::ORDER_NOTE => match serde_json::from_value::<OrderNote>(payload) {
            Ok(note) => {
                let _ = ctx.sinks.notes.send(note);
            }
            Err(e) => debug!(topic = %topic, error = %e, "Malformed order note"),
        },
        other => debug!(topic = %topic, event = %other, "Unhandled broadcast event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> DispatchContext {
        DispatchContext {
            connection_id: ConnectionId::from("self-id"),
            sinks: Sinks::new(16),
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    fn broadcast(event: &str, payload: serde_json::Value) -> PhoenixMessage {
        PhoenixMessage {
            topic: "realtime:principal:u1".into(),
            event: "broadcast".into(),
            payload: json!({ "type": "broadcast", "event": event, "payload": payload }),
            msg_ref: None,
        }
    }

    #[test]
    fn strips_realtime_prefix() {
        assert_eq!(strip_topic_prefix("realtime:principal:u1"), "principal:u1");
        assert_eq!(strip_topic_prefix("phoenix"), "phoenix");
    }

    #[test]
    fn forwards_signal_from_other_connection() {
        let ctx = ctx();
        let mut rx = ctx.sinks.signals.subscribe();
        let msg = broadcast(
            events::SIGNAL,
            json!({ "channel": "form-bridge", "origin": "peer-id", "type": "answer" }),
        );
        handle_phoenix_message(&msg, &ctx, &mut HashMap::new());
        let env = rx.try_recv().unwrap();
        assert_eq!(env.origin.as_deref(), Some("peer-id"));
        assert_eq!(env.body["type"], "answer");
    }

    #[test]
    fn drops_self_echoed_signal() {
        let ctx = ctx();
        let mut rx = ctx.sinks.signals.subscribe();
        let msg = broadcast(
            events::SIGNAL,
            json!({ "channel": "form-bridge", "origin": "self-id" }),
        );
        handle_phoenix_message(&msg, &ctx, &mut HashMap::new());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn detached_context_forwards_nothing() {
        let ctx = ctx();
        ctx.detached.store(true, Ordering::Release);
        let mut rx = ctx.sinks.signals.subscribe();
        let mut events_rx = ctx.sinks.events.subscribe();
        let msg = broadcast(
            events::SIGNAL,
            json!({ "channel": "form-bridge", "origin": "peer-id" }),
        );
        handle_phoenix_message(&msg, &ctx, &mut HashMap::new());
        ctx.emit(RelayEvent::Error(handoff_common::RelayError::Closed));
        assert!(rx.try_recv().is_err());
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn routes_positions_and_notes() {
        let ctx = ctx();
        let mut positions = ctx.sinks.positions.subscribe();
        let mut notes = ctx.sinks.notes.subscribe();

        handle_phoenix_message(
            &broadcast(
                events::DRIVER_POSITION,
                json!({ "routeKey": "r1", "lat": 1.0, "lng": 2.0 }),
            ),
            &ctx,
            &mut HashMap::new(),
        );
        handle_phoenix_message(
            &broadcast(events::ORDER_NOTE, json!({ "orderId": "o1", "note": "gate code 42" })),
            &ctx,
            &mut HashMap::new(),
        );

        assert_eq!(positions.try_recv().unwrap().route_key, "r1");
        assert_eq!(notes.try_recv().unwrap().note, "gate code 42");
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        let ctx = ctx();
        let mut positions = ctx.sinks.positions.subscribe();
        handle_phoenix_message(
            &broadcast(events::DRIVER_POSITION, json!({ "lat": "north" })),
            &ctx,
            &mut HashMap::new(),
        );
        assert!(positions.try_recv().is_err());
    }

    #[test]
    fn join_reply_ok_and_rejected() {
        let ctx = ctx();
        let mut events_rx = ctx.sinks.events.subscribe();
        let mut pending = HashMap::new();
        pending.insert("1".to_string(), "principal:u1".to_string());
        pending.insert("2".to_string(), "driver-route:r1".to_string());

        handle_phoenix_message(
            &PhoenixMessage {
                topic: "realtime:principal:u1".into(),
                event: "phx_reply".into(),
                payload: json!({ "status": "ok", "response": {} }),
                msg_ref: Some("1".into()),
            },
            &ctx,
            &mut pending,
        );
        handle_phoenix_message(
            &PhoenixMessage {
                topic: "realtime:driver-route:r1".into(),
                event: "phx_reply".into(),
                payload: json!({ "status": "error", "response": { "reason": "unauthorized" } }),
                msg_ref: Some("2".into()),
            },
            &ctx,
            &mut pending,
        );

        assert!(matches!(
            events_rx.try_recv().unwrap(),
            RelayEvent::ChannelJoined { topic } if topic == "principal:u1"
        ));
        assert!(matches!(
            events_rx.try_recv().unwrap(),
            RelayEvent::ChannelError { topic, message }
                if topic == "driver-route:r1" && message == "unauthorized"
        ));
        assert!(pending.is_empty());
    }

    #[test]
    fn heartbeat_replies_are_ignored() {
        let ctx = ctx();
        let mut events_rx = ctx.sinks.events.subscribe();
        handle_phoenix_message(
            &PhoenixMessage {
                topic: "phoenix".into(),
                event: "phx_reply".into(),
                payload: json!({ "status": "ok", "response": {} }),
                msg_ref: Some("99".into()),
            },
            &ctx,
            &mut HashMap::new(),
        );
        assert!(events_rx.try_recv().is_err());
    }
}
