//! Background WebSocket task for one relay connection instance.
//!
//! Makes exactly one connection attempt. Failures are reported through
//! `RelayEvent::Error` and end the task; reconnecting is the manager
//! owner's decision.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use handoff_common::RelayError;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::credentials::RealtimeCredential;
use crate::handler::{handle_phoenix_message, DispatchContext};
use crate::types::{PhoenixMessage, RelayClientConfig, RelayCommand, RelayEvent};

type WsWriter = Arc<Mutex<SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>>>;

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

pub(crate) fn join_frame(topic: &str, credential: &RealtimeCredential) -> PhoenixMessage {
    PhoenixMessage {
        topic: format!("realtime:{topic}"),
        event: "phx_join".to_string(),
        payload: serde_json::json!({
            "config": {
                "broadcast": { "self": false, "ack": false },
                "presence": { "key": "" }
            },
            "access_token": credential.token,
        }),
        msg_ref: Some(next_ref()),
    }
}

pub(crate) fn broadcast_frame(topic: &str, event: &str, payload: serde_json::Value) -> PhoenixMessage {
    PhoenixMessage {
        topic: format!("realtime:{topic}"),
        event: "broadcast".to_string(),
        payload: serde_json::json!({
            "type": "broadcast",
            "event": event,
            "payload": payload
        }),
        msg_ref: Some(next_ref()),
    }
}

fn heartbeat_frame() -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: serde_json::json!({}),
        msg_ref: Some(next_ref()),
    }
}

async fn write_frame(writer: &WsWriter, msg: &PhoenixMessage) -> Result<(), RelayError> {
    let json = serde_json::to_string(msg).map_err(|e| RelayError::Protocol(e.to_string()))?;
    writer
        .lock()
        .await
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|_| RelayError::Closed)
}

/// Map a handshake failure onto the relay error taxonomy. HTTP 401/403 on
/// upgrade means the credential itself was refused.
fn classify_connect_error(e: &tokio_tungstenite::tungstenite::Error) -> RelayError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match e {
        WsError::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
            RelayError::Rejected(format!("HTTP {}", response.status().as_u16()))
        }
        other => RelayError::Connect(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Connection Task
// ---------------------------------------------------------------------------

/// Run one relay connection until it closes, fails, or is told to stop.
pub(crate) async fn run_connection(
    config: RelayClientConfig,
    credential: RealtimeCredential,
    topics: Vec<String>,
    ctx: DispatchContext,
    connected: Arc<AtomicBool>,
    mut command_rx: mpsc::Receiver<RelayCommand>,
) {
    let url = config.ws_url(&credential);
    info!(
        url = %url.split('?').next().unwrap_or(""),
        connection = %ctx.connection_id,
        "Connecting to relay"
    );

    let ws_stream = match tokio::time::timeout(
        config.connect_timeout(),
        tokio_tungstenite::connect_async(&url),
    )
    .await
    {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(e)) => {
            let err = classify_connect_error(&e);
            error!(error = %err, "Failed to connect to relay");
            ctx.emit(RelayEvent::Error(err));
            return;
        }
        Err(_) => {
            error!("Relay connection attempt timed out");
            ctx.emit(RelayEvent::Error(RelayError::Connect(
                "connection attempt timed out".into(),
            )));
            return;
        }
    };

    connected.store(true, Ordering::Release);
    ctx.emit(RelayEvent::Connected {
        connection_id: ctx.connection_id.clone(),
    });

    let (ws_write, mut ws_read) = ws_stream.split();
    let ws_write: WsWriter = Arc::new(Mutex::new(ws_write));

    let mut joined: HashSet<String> = HashSet::new();
    let mut pending_joins: HashMap<String, String> = HashMap::new();

    for topic in topics {
        join_topic(&ws_write, &credential, &topic, &mut joined, &mut pending_joins).await;
    }

    // Heartbeat task.
    let heartbeat_write = Arc::clone(&ws_write);
    let heartbeat_interval = config.heartbeat_interval();
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat_interval);
        interval.tick().await;
        loop {
            interval.tick().await;
            if write_frame(&heartbeat_write, &heartbeat_frame()).await.is_err() {
                break;
            }
        }
    });

    let mut closed_by_owner = false;
    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(RelayCommand::Join { topic }) => {
                        join_topic(&ws_write, &credential, &topic, &mut joined, &mut pending_joins).await;
                    }
                    Some(RelayCommand::Broadcast { topic, event, payload }) => {
                        join_topic(&ws_write, &credential, &topic, &mut joined, &mut pending_joins).await;
                        if let Err(e) = write_frame(&ws_write, &broadcast_frame(&topic, &event, payload)).await {
                            warn!(topic = %topic, error = %e, "Broadcast send failed");
                        }
                    }
                    Some(RelayCommand::Disconnect) | None => {
                        for topic in &joined {
                            let leave = PhoenixMessage {
                                topic: format!("realtime:{topic}"),
                                event: "phx_leave".to_string(),
                                payload: serde_json::json!({}),
                                msg_ref: Some(next_ref()),
                            };
                            let _ = write_frame(&ws_write, &leave).await;
                        }
                        let _ = ws_write.lock().await.send(WsMessage::Close(None)).await;
                        closed_by_owner = true;
                        break;
                    }
                }
            }
            frame = ws_read.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<PhoenixMessage>(&text) {
                            Ok(msg) => handle_phoenix_message(&msg, &ctx, &mut pending_joins),
                            Err(_) => debug!(text = %text.as_str(), "Unrecognized message from relay"),
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = ws_write.lock().await.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("Relay closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Relay WebSocket error");
                        ctx.emit(RelayEvent::Error(RelayError::Protocol(e.to_string())));
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    heartbeat_handle.abort();
    connected.store(false, Ordering::Release);
    if !closed_by_owner {
        warn!(connection = %ctx.connection_id, "Relay connection lost");
    }
    ctx.emit(RelayEvent::Disconnected {
        connection_id: ctx.connection_id.clone(),
    });
}

async fn join_topic(
    writer: &WsWriter,
    credential: &RealtimeCredential,
    topic: &str,
    joined: &mut HashSet<String>,
    pending_joins: &mut HashMap<String, String>,
) {
    if joined.contains(topic) {
        return;
    }
    let frame = join_frame(topic, credential);
    if let Some(r) = &frame.msg_ref {
        pending_joins.insert(r.clone(), topic.to_string());
    }
    match write_frame(writer, &frame).await {
        Ok(()) => {
            joined.insert(topic.to_string());
        }
        Err(e) => warn!(topic = %topic, error = %e, "Join send failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_increase() {
        let a: u64 = next_ref().parse().unwrap();
        let b: u64 = next_ref().parse().unwrap();
        assert!(b > a);
    }

    #[test]
    fn join_frame_carries_token() {
        let frame = join_frame("principal:u1", &RealtimeCredential::new("tok", "u1"));
        assert_eq!(frame.topic, "realtime:principal:u1");
        assert_eq!(frame.event, "phx_join");
        assert_eq!(frame.payload["access_token"], "tok");
        assert_eq!(frame.payload["config"]["broadcast"]["self"], false);
    }

    #[test]
    fn broadcast_frame_wraps_payload() {
        let frame = broadcast_frame("principal:u1", "signal", serde_json::json!({ "a": 1 }));
        assert_eq!(frame.event, "broadcast");
        assert_eq!(frame.payload["type"], "broadcast");
        assert_eq!(frame.payload["event"], "signal");
        assert_eq!(frame.payload["payload"]["a"], 1);
    }
}
