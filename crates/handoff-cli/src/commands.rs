use handoff_bridge::{BridgeMessage, BridgeStatus, FormPayload, PairingBridge};
use handoff_common::{BridgeError, HandoffError};
use handoff_realtime::RelayConnectionManager;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Initiator side: open the bridge, send one form request, print the reply.
pub async fn request(bridge: &PairingBridge, note: Option<String>) -> Result<(), HandoffError> {
    let mut messages = bridge.on_message();
    bridge.ensure_connection(true).await;

    let mut payload = FormPayload::default();
    payload.set("note", note);
    loop {
        wait_until_connected(bridge).await?;
        if bridge.send_form_request(payload.clone()).await {
            info!("Form request sent");
            break;
        }
        warn!(error = ?bridge.last_error(), "Form request not delivered, waiting for the link");
    }

    loop {
        match next_message(&mut messages).await? {
            BridgeMessage::FormResponse(payload) => {
                print_json(&payload);
                return Ok(());
            }
            BridgeMessage::FormRequest(_) => info!("Ignoring form request from peer"),
        }
    }
}

/// Responder side: answer the first form request that arrives.
pub async fn respond(bridge: &PairingBridge, note: Option<String>) -> Result<(), HandoffError> {
    let mut messages = bridge.on_message();
    bridge.ensure_connection(false).await;
    info!("Waiting for a form request");

    loop {
        let BridgeMessage::FormRequest(request) = next_message(&mut messages).await? else {
            continue;
        };
        print_json(&request);

        let mut response = FormPayload::default();
        response.set("note", note.clone());
        if bridge.send_form_response(response).await {
            info!("Form response sent");
            return Ok(());
        }
        warn!(error = ?bridge.last_error(), "Form response not delivered, waiting for a new request");
    }
}

/// Print driver positions and order notes until interrupted.
pub async fn watch(relay: &RelayConnectionManager, routes: &[String]) -> Result<(), HandoffError> {
    let mut positions = relay.on_driver_position();
    let mut notes = relay.on_order_note();
    for route in routes {
        relay.subscribe_driver_route(route).await;
        info!(route = %route, "Watching driver route");
    }

    loop {
        tokio::select! {
            position = positions.recv() => match position {
                Ok(position) => print_json(&position),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped driver positions"),
                Err(RecvError::Closed) => return Ok(()),
            },
            note = notes.recv() => match note {
                Ok(note) => print_json(&note),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped order notes"),
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn wait_until_connected(bridge: &PairingBridge) -> Result<(), BridgeError> {
    let mut status = bridge.on_status_change();
    loop {
        {
            let snapshot = status.borrow_and_update();
            match snapshot.status {
                BridgeStatus::Connected => return Ok(()),
                BridgeStatus::Error => {
                    warn!(error = ?snapshot.last_error, "Bridge error, retry pending")
                }
                BridgeStatus::Idle | BridgeStatus::Connecting => {}
            }
        }
        status.changed().await.map_err(|_| BridgeError::Stopped)?;
    }
}

async fn next_message(
    messages: &mut tokio::sync::broadcast::Receiver<BridgeMessage>,
) -> Result<BridgeMessage, BridgeError> {
    loop {
        match messages.recv().await {
            Ok(message) => return Ok(message),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped bridge messages"),
            Err(RecvError::Closed) => return Err(BridgeError::Stopped),
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "Failed to render JSON"),
    }
}
