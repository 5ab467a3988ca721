//! The bridge task: feeds every input through the transition function and
//! executes the resulting effects.

use std::collections::VecDeque;
use std::sync::Arc;

use handoff_common::BridgeError;
use handoff_realtime::SignalEnvelope;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::types::{BridgeOptions, BridgeSnapshot};
use crate::machine::{self, BridgeEvent, Effect, LinkState};
use crate::message::BridgeMessage;
use crate::signal::{PairingSignal, SignalTransport};
use crate::transport::{LinkEvent, LinkEventSink, LinkId, LinkSpec, PeerConnection, PeerConnector, Role};

/// Requests from the public handle.
pub(crate) enum Command {
    Ensure {
        initiate: bool,
    },
    Send {
        message: BridgeMessage,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

struct ActiveLink {
    id: LinkId,
    conn: Box<dyn PeerConnection>,
}

pub(crate) struct Channels {
    pub(crate) commands: mpsc::Receiver<Command>,
    pub(crate) signals: broadcast::Receiver<SignalEnvelope>,
    pub(crate) snapshot: watch::Sender<BridgeSnapshot>,
    pub(crate) messages: broadcast::Sender<BridgeMessage>,
}

pub(crate) struct Driver {
    options: BridgeOptions,
    connector: Arc<dyn PeerConnector>,
    relay: Arc<dyn SignalTransport>,
    state: LinkState,
    active: Option<ActiveLink>,
    snapshot_tx: watch::Sender<BridgeSnapshot>,
    message_tx: broadcast::Sender<BridgeMessage>,
    link_tx: mpsc::UnboundedSender<(LinkId, LinkEvent)>,
    timer_tx: mpsc::UnboundedSender<BridgeEvent>,
    running: bool,
}

impl Driver {
    pub(crate) async fn run(
        options: BridgeOptions,
        connector: Arc<dyn PeerConnector>,
        relay: Arc<dyn SignalTransport>,
        channels: Channels,
    ) {
        let Channels {
            mut commands,
            signals: mut signal_rx,
            snapshot,
            messages,
        } = channels;
        let (link_tx, mut link_rx) = mpsc::unbounded_channel();
        let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();

        let mut driver = Driver {
            options,
            connector,
            relay,
            state: LinkState::default(),
            active: None,
            snapshot_tx: snapshot,
            message_tx: messages,
            link_tx,
            timer_tx,
            running: true,
        };
        let mut signals_open = true;

        while driver.running {
            let event = tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Ensure { initiate }) => BridgeEvent::Ensure { initiate },
                    Some(Command::Send { message, reply }) => {
                        driver.send(message, reply).await;
                        continue;
                    }
                    Some(Command::Shutdown) | None => BridgeEvent::Shutdown,
                },
                received = signal_rx.recv(), if signals_open => match received {
                    Ok(envelope) => match driver.decode(&envelope) {
                        Some(signal) => BridgeEvent::Signal(signal),
                        None => continue,
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Signal subscription lagged, handshake messages lost");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        warn!("Signal transport closed");
                        signals_open = false;
                        continue;
                    }
                },
                Some((link, event)) = link_rx.recv() => BridgeEvent::Link { link, event },
                Some(event) = timer_rx.recv() => event,
            };
            driver.dispatch(event).await;
        }

        debug!("Pairing bridge task stopped");
    }

    /// Keep only pairing traffic on our channel.
    fn decode(&self, envelope: &SignalEnvelope) -> Option<PairingSignal> {
        if envelope.channel != self.options.channel_label {
            return None;
        }
        match PairingSignal::from_envelope(envelope) {
            Ok(signal) => Some(signal),
            Err(e) => {
                debug!(error = %e, origin = ?envelope.origin, "Dropping malformed pairing signal");
                None
            }
        }
    }

    /// Run one input and everything it causes to completion.
    async fn dispatch(&mut self, event: BridgeEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let (next, effects) = machine::on_event(&self.state, event);
            self.state = next;
            self.publish();

            for effect in effects {
                let link = effect.link();
                if let Err(e) = self.execute(effect).await {
                    warn!(link = ?link, error = %e, "Bridge effect failed");
                    if let Some(link) = link {
                        queue.push_back(BridgeEvent::NegotiationFailed {
                            link,
                            message: e.to_string(),
                        });
                    }
                    break;
                }
            }
        }
    }

    fn publish(&self) {
        let snapshot = BridgeSnapshot {
            status: self.state.status,
            last_error: self.state.last_error.clone(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            info!(
                from = %current.status,
                to = %snapshot.status,
                error = ?snapshot.last_error,
                "Bridge status changed"
            );
            *current = snapshot;
            true
        });
    }

    fn conn(&self, link: LinkId) -> Result<&dyn PeerConnection, BridgeError> {
        match &self.active {
            Some(active) if active.id == link => Ok(active.conn.as_ref()),
            _ => Err(BridgeError::Transport(format!("link {link} is not active"))),
        }
    }

    async fn execute(&mut self, effect: Effect) -> Result<(), BridgeError> {
        match effect {
            Effect::OpenLink { link, role } => {
                let spec = LinkSpec {
                    link,
                    role,
                    channel_label: self.options.channel_label.clone(),
                };
                let sink = LinkEventSink::new(link, self.link_tx.clone());
                let conn = self.connector.open(spec, sink).await?;
                info!(link, role = ?role, "Peer link opened");
                self.active = Some(ActiveLink { id: link, conn });
                if role == Role::Initiator {
                    self.conn(link)?
                        .create_data_channel(&self.options.channel_label)
                        .await?;
                }
            }
            Effect::CloseLink { link } => {
                if self.active.as_ref().is_some_and(|a| a.id == link) {
                    if let Some(active) = self.active.take() {
                        active.conn.close().await;
                        debug!(link, "Peer link closed");
                    }
                }
            }
            Effect::SendOffer { link } => {
                let conn = self.conn(link)?;
                let offer = conn.create_offer().await?;
                conn.set_local_description(offer.clone()).await?;
                self.relay_signal(PairingSignal::Offer(offer)).await;
            }
            Effect::AnswerOffer { link, offer } => {
                let conn = self.conn(link)?;
                conn.set_remote_description(offer).await?;
                let answer = conn.create_answer().await?;
                conn.set_local_description(answer.clone()).await?;
                self.relay_signal(PairingSignal::Answer(answer)).await;
            }
            Effect::ApplyAnswer { link, answer } => {
                self.conn(link)?.set_remote_description(answer).await?;
            }
            Effect::AddCandidate { link, candidate } => {
                self.conn(link)?.add_ice_candidate(candidate).await?;
            }
            Effect::Signal(signal) => self.relay_signal(signal).await,
            Effect::ScheduleRetry { ticket } => {
                debug!(ticket, delay = ?self.options.reconnect_delay, "Retry scheduled");
                self.after(self.options.reconnect_delay, BridgeEvent::RetryElapsed { ticket });
            }
            Effect::ArmTimeout { link } => {
                if let Some(timeout) = self.options.negotiation_timeout {
                    self.after(timeout, BridgeEvent::TimeoutElapsed { link });
                }
            }
            Effect::Deliver(message) => {
                let _ = self.message_tx.send(message);
            }
            Effect::Stop => self.running = false,
        }
        Ok(())
    }

    fn after(&self, delay: std::time::Duration, event: BridgeEvent) {
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }

    async fn relay_signal(&self, signal: PairingSignal) {
        match signal.to_envelope(&self.options.channel_label) {
            Ok(envelope) => {
                debug!(kind = signal.kind(), "Relaying pairing signal");
                self.relay.send_signal(envelope).await;
            }
            Err(e) => warn!(error = %e, "Failed to encode pairing signal"),
        }
    }

    /// Transmit on the open channel. A refusal is reported to the caller
    /// only after the status change it causes is visible.
    async fn send(&mut self, message: BridgeMessage, reply: oneshot::Sender<bool>) {
        let result = self.transmit(&message).await;
        if let Err(e) = &result {
            self.dispatch(BridgeEvent::SendRejected {
                message: e.to_string(),
            })
            .await;
        }
        let _ = reply.send(result.is_ok());
    }

    async fn transmit(&self, message: &BridgeMessage) -> Result<(), BridgeError> {
        let link = self.state.open_link().ok_or(BridgeError::ChannelNotOpen)?;
        let text = message.to_json()?;
        self.conn(link)?.send_text(&text).await
    }
}
