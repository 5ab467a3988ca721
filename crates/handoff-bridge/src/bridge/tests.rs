use std::time::Duration;

use handoff_realtime::SignalEnvelope;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;

use super::*;
use crate::loopback::{LoopbackConnector, LoopbackNetwork, SignalHub};
use crate::machine::NEGOTIATION_TIMED_OUT;
use crate::signal::{PairingSignal, SessionDescription};

const WAIT: Duration = Duration::from_secs(120);

struct Pair {
    hub: Arc<SignalHub>,
    a: PairingBridge,
    b: PairingBridge,
    a_links: Arc<LoopbackConnector>,
    b_links: Arc<LoopbackConnector>,
}

fn pair() -> Pair {
    let network = LoopbackNetwork::new();
    let hub = SignalHub::new();
    let a_links = network.connector();
    let b_links = network.connector();
    let a = PairingBridge::spawn(BridgeOptions::default(), a_links.clone(), hub.endpoint());
    let b = PairingBridge::spawn(BridgeOptions::default(), b_links.clone(), hub.endpoint());
    Pair {
        hub,
        a,
        b,
        a_links,
        b_links,
    }
}

async fn wait_until(bridge: &PairingBridge, pred: impl FnMut(&BridgeSnapshot) -> bool) {
    let mut rx = bridge.on_status_change();
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("status wait timed out")
        .expect("bridge dropped");
}

async fn wait_status(bridge: &PairingBridge, status: BridgeStatus) {
    wait_until(bridge, |s| s.status == status).await;
}

async fn connected_pair() -> Pair {
    let p = pair();
    p.a.ensure_connection(true).await;
    wait_status(&p.a, BridgeStatus::Connected).await;
    wait_status(&p.b, BridgeStatus::Connected).await;
    p
}

fn count_kind(hub: &SignalHub, kind: &str) -> usize {
    hub.sent()
        .iter()
        .filter(|e| e.body.get("type").and_then(|t| t.as_str()) == Some(kind))
        .count()
}

/// Let the bridge tasks drain their queues.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn initiator_and_responder_reach_connected() {
    let p = pair();
    assert_eq!(p.a.status(), BridgeStatus::Idle);
    assert_eq!(p.b.status(), BridgeStatus::Idle);

    p.a.ensure_connection(true).await;
    wait_status(&p.a, BridgeStatus::Connected).await;
    wait_status(&p.b, BridgeStatus::Connected).await;

    assert_eq!(count_kind(&p.hub, "offer"), 1);
    assert_eq!(count_kind(&p.hub, "answer"), 1);
    assert!(p.hub.sent().iter().all(|e| e.channel == "form-bridge"));
    assert_eq!(p.a.last_error(), None);
    assert_eq!(p.a_links.live_links(), 1);
    assert_eq!(p.b_links.live_links(), 1);
}

#[tokio::test(start_paused = true)]
async fn form_response_is_delivered_exactly_once() {
    let p = connected_pair().await;
    let mut inbox = p.a.on_message();

    let sent = p
        .b
        .send_form_response(FormPayload::default().with_note("left at door"))
        .await;
    assert!(sent);

    let received = tokio::time::timeout(WAIT, inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        serde_json::to_value(&received).unwrap(),
        serde_json::json!({ "type": "form-response", "payload": { "note": "left at door" } })
    );
    settle().await;
    assert!(matches!(inbox.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn every_message_subscriber_receives_a_copy() {
    let p = connected_pair().await;
    let mut first = p.b.on_message();
    let mut second = p.b.on_message();

    assert!(p.a.send_form_request(FormPayload::default()).await);

    for inbox in [&mut first, &mut second] {
        let msg = tokio::time::timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
        assert!(matches!(msg, BridgeMessage::FormRequest(_)));
    }
}

#[tokio::test(start_paused = true)]
async fn repeated_ensure_never_duplicates_negotiation() {
    let p = pair();
    for _ in 0..5 {
        p.a.ensure_connection(true).await;
    }
    wait_status(&p.a, BridgeStatus::Connected).await;
    for _ in 0..5 {
        p.a.ensure_connection(true).await;
    }
    settle().await;

    assert_eq!(p.a_links.opened_links(), 1);
    assert_eq!(p.a_links.live_links(), 1);
    assert_eq!(count_kind(&p.hub, "offer"), 1);
}

#[tokio::test(start_paused = true)]
async fn send_while_not_connected_returns_false() {
    let p = pair();

    assert!(!p.a.send_form_request(FormPayload::default()).await);
    assert_eq!(p.a.status(), BridgeStatus::Error);
    assert_eq!(p.a.last_error().as_deref(), Some("data channel is not open"));

    // Nothing was requested, so nothing is retried.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(p.a_links.opened_links(), 0);
}

#[tokio::test(start_paused = true)]
async fn send_while_connecting_returns_false() {
    let network = LoopbackNetwork::new();
    let hub = SignalHub::new();
    let links = network.connector();
    let lonely = PairingBridge::spawn(BridgeOptions::default(), links.clone(), hub.endpoint());

    lonely.ensure_connection(true).await;
    wait_status(&lonely, BridgeStatus::Connecting).await;

    assert!(!lonely.send_form_request(FormPayload::default()).await);
    assert_eq!(lonely.status(), BridgeStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn malformed_channel_messages_change_nothing() {
    let p = connected_pair().await;
    let mut inbox = p.a.on_message();

    p.a_links.inject_message("not json");
    p.a_links.inject_message(r#"{"payload":{"note":"x"}}"#);
    p.a_links.inject_message(r#"{"type":"form-cancel","payload":{}}"#);
    settle().await;

    assert_eq!(p.a.status(), BridgeStatus::Connected);
    assert_eq!(p.a.last_error(), None);
    assert!(matches!(inbox.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn loosely_typed_form_fields_are_delivered() {
    let p = connected_pair().await;
    let mut inbox = p.a.on_message();

    p.a_links
        .inject_message(r#"{"type":"form-response","payload":{"phone":5551234}}"#);
    p.a_links
        .inject_message(r#"{"type":"form-request","payload":{"address":"1 Main St"}}"#);
    p.a_links.inject_message(r#"{"type":"form-response"}"#);

    let first = tokio::time::timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(first.payload().phone().as_deref(), Some("5551234"));
    let second = tokio::time::timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(
        second.payload().address().and_then(|a| a.line1).as_deref(),
        Some("1 Main St")
    );
    let third = tokio::time::timeout(WAIT, inbox.recv()).await.unwrap().unwrap();
    assert_eq!(third, BridgeMessage::FormResponse(FormPayload::default()));
    assert_eq!(p.a.status(), BridgeStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn connectivity_failure_retries_after_delay() {
    let p = connected_pair().await;

    p.a_links.fail_links();
    wait_status(&p.a, BridgeStatus::Error).await;
    let failed_at = Instant::now();
    assert_eq!(p.a.last_error().as_deref(), Some("peer connection failed"));

    wait_until(&p.a, |s| s.status != BridgeStatus::Error).await;
    let waited = failed_at.elapsed();
    assert!(waited >= Duration::from_millis(3000), "retried after {waited:?}");
    assert!(waited < Duration::from_millis(3500), "retried after {waited:?}");
    assert!(matches!(
        p.a.status(),
        BridgeStatus::Connecting | BridgeStatus::Connected
    ));

    wait_status(&p.a, BridgeStatus::Connected).await;
    wait_status(&p.b, BridgeStatus::Connected).await;
    assert_eq!(p.a_links.opened_links(), 2);
    assert_eq!(p.a_links.live_links(), 1);
    assert_eq!(count_kind(&p.hub, "offer"), 2);
}

#[tokio::test(start_paused = true)]
async fn closed_channel_goes_idle_and_retries_once() {
    let p = connected_pair().await;

    p.a_links.close_channels();
    p.a_links.close_channels();
    wait_status(&p.a, BridgeStatus::Idle).await;

    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert_eq!(p.a_links.opened_links(), 1);

    wait_status(&p.a, BridgeStatus::Connected).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(p.a_links.opened_links(), 2);
    assert_eq!(p.a.status(), BridgeStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn duplicate_answer_is_ignored() {
    let p = connected_pair().await;

    let answer = p
        .hub
        .sent()
        .into_iter()
        .find(|e| e.body.get("type").and_then(|t| t.as_str()) == Some("answer"))
        .unwrap();
    p.hub.inject(answer);
    settle().await;

    assert_eq!(p.a.status(), BridgeStatus::Connected);
    assert_eq!(p.a.last_error(), None);
    assert_eq!(p.a_links.opened_links(), 1);
}

#[tokio::test(start_paused = true)]
async fn offers_on_other_channels_are_ignored() {
    let p = pair();
    let mut env = PairingSignal::Offer(SessionDescription::offer("loopback 99"))
        .to_envelope("chat")
        .unwrap();
    env.origin = Some("someone-else".into());
    p.hub.inject(env);
    settle().await;

    assert_eq!(p.b.status(), BridgeStatus::Idle);
    assert_eq!(p.b_links.opened_links(), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_signal_is_dropped() {
    let p = pair();
    let mut body = serde_json::Map::new();
    body.insert("type".into(), serde_json::json!("offer"));
    let mut env = SignalEnvelope::new("form-bridge", body);
    env.origin = Some("someone-else".into());
    p.hub.inject(env);
    settle().await;

    assert_eq!(p.b.status(), BridgeStatus::Idle);
    assert_eq!(p.b_links.opened_links(), 0);
}

#[tokio::test(start_paused = true)]
async fn bad_offer_sets_error_and_retries() {
    let p = pair();
    let mut env = PairingSignal::Offer(SessionDescription::offer("garbage"))
        .to_envelope("form-bridge")
        .unwrap();
    env.origin = Some("someone-else".into());
    p.hub.inject(env);

    wait_status(&p.b, BridgeStatus::Error).await;
    assert!(p.b.last_error().unwrap().contains("unrecognized session description"));

    // Responder retries by opening a fresh link that waits for an offer.
    wait_status(&p.b, BridgeStatus::Connecting).await;
    assert_eq!(p.b_links.opened_links(), 2);
    assert_eq!(p.b_links.live_links(), 1);
}

#[tokio::test(start_paused = true)]
async fn negotiation_times_out_without_a_peer() {
    let network = LoopbackNetwork::new();
    let hub = SignalHub::new();
    let links = network.connector();
    let lonely = PairingBridge::spawn(BridgeOptions::default(), links.clone(), hub.endpoint());

    let started = Instant::now();
    lonely.ensure_connection(true).await;
    wait_status(&lonely, BridgeStatus::Error).await;
    assert!(started.elapsed() >= Duration::from_secs(20));
    assert_eq!(lonely.last_error().as_deref(), Some(NEGOTIATION_TIMED_OUT));

    wait_status(&lonely, BridgeStatus::Connecting).await;
    assert_eq!(links.opened_links(), 2);
    assert_eq!(links.live_links(), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_timeout_leaves_link_connecting() {
    let network = LoopbackNetwork::new();
    let hub = SignalHub::new();
    let links = network.connector();
    let options = BridgeOptions {
        negotiation_timeout: None,
        ..Default::default()
    };
    let lonely = PairingBridge::spawn(options, links.clone(), hub.endpoint());

    lonely.ensure_connection(true).await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(lonely.status(), BridgeStatus::Connecting);
    assert_eq!(links.opened_links(), 1);
}

#[tokio::test(start_paused = true)]
async fn initiator_restart_renegotiates_with_responder() {
    let p = connected_pair().await;

    p.a.shutdown().await;
    assert_eq!(p.a_links.live_links(), 0);
    wait_until(&p.b, |s| s.status != BridgeStatus::Connected).await;

    let network_a = p.a_links;
    let restarted = PairingBridge::spawn(
        BridgeOptions::default(),
        network_a.clone(),
        p.hub.endpoint(),
    );
    restarted.ensure_connection(true).await;
    wait_status(&restarted, BridgeStatus::Connected).await;
    wait_status(&p.b, BridgeStatus::Connected).await;
    assert_eq!(p.b_links.live_links(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_link_and_stops() {
    let p = connected_pair().await;
    p.a.shutdown().await;

    assert_eq!(p.a_links.live_links(), 0);
    assert_eq!(p.a.status(), BridgeStatus::Idle);
    assert!(!p.a.send_form_request(FormPayload::default()).await);

    p.a.ensure_connection(true).await;
    settle().await;
    assert_eq!(p.a_links.opened_links(), 1);
}
