//! Pure transition function for the pairing bridge.
//!
//! [`on_event`] takes the current [`LinkState`] and one input and returns
//! the next state plus the effects the bridge task must run, in order.
//! Nothing here touches the network, timers, or the relay.
//!
//! Timer inputs carry the ticket or link they were armed for, and
//! transport inputs carry their link id, so anything left over from a
//! replaced link or a cancelled timer falls through as a no-op.

use tracing::debug;

use crate::bridge::BridgeStatus;
use crate::message::BridgeMessage;
use crate::signal::{IceCandidate, PairingSignal, SessionDescription};
use crate::transport::{LinkEvent, LinkId, PeerState, Role};

/// Identifier of a scheduled retry.
pub type Ticket = u64;

pub const NEGOTIATION_TIMED_OUT: &str = "negotiation timed out";

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Bookkeeping for the current pairing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerLink {
    pub id: LinkId,
    pub role: Role,
    /// Set once an offer or answer has been applied. A second answer is
    /// ignored; a second offer starts a new link.
    pub remote_applied: bool,
    /// Remote candidates received before the remote description.
    pub pending_candidates: Vec<IceCandidate>,
    pub channel_open: bool,
}

impl PeerLink {
    fn new(id: LinkId, role: Role) -> Self {
        Self {
            id,
            role,
            remote_applied: false,
            pending_candidates: Vec::new(),
            channel_open: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkState {
    pub status: BridgeStatus,
    pub last_error: Option<String>,
    /// Role preference from the last `ensure_connection`.
    pub initiate: bool,
    /// `ensure_connection` has been called at least once.
    pub requested: bool,
    pub link: Option<PeerLink>,
    /// The one pending retry, if any.
    pub retry: Option<Ticket>,
    pub stopped: bool,
    last_link: LinkId,
    last_ticket: Ticket,
}

impl LinkState {
    /// Link id of an open, usable channel.
    pub fn open_link(&self) -> Option<LinkId> {
        match (&self.status, &self.link) {
            (BridgeStatus::Connected, Some(link)) if link.channel_open => Some(link.id),
            _ => None,
        }
    }

    pub fn current_link(&self) -> Option<LinkId> {
        self.link.as_ref().map(|l| l.id)
    }
}

// ---------------------------------------------------------------------------
// Inputs & Effects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    Ensure { initiate: bool },
    Signal(PairingSignal),
    Link { link: LinkId, event: LinkEvent },
    RetryElapsed { ticket: Ticket },
    TimeoutElapsed { link: LinkId },
    /// A negotiation effect for `link` returned an error.
    NegotiationFailed { link: LinkId, message: String },
    /// A send was refused because no channel is open.
    SendRejected { message: String },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create a connection object; initiators also create the data channel.
    OpenLink { link: LinkId, role: Role },
    /// Detach callbacks and close.
    CloseLink { link: LinkId },
    /// Create an offer, set it locally, relay it.
    SendOffer { link: LinkId },
    /// Apply the offer, create an answer, set it locally, relay it.
    AnswerOffer { link: LinkId, offer: SessionDescription },
    ApplyAnswer { link: LinkId, answer: SessionDescription },
    AddCandidate { link: LinkId, candidate: IceCandidate },
    /// Relay a handshake message.
    Signal(PairingSignal),
    ScheduleRetry { ticket: Ticket },
    ArmTimeout { link: LinkId },
    Deliver(BridgeMessage),
    Stop,
}

impl Effect {
    /// Link a fallible effect acts on.
    pub fn link(&self) -> Option<LinkId> {
        match self {
            Effect::OpenLink { link, .. }
            | Effect::CloseLink { link }
            | Effect::SendOffer { link }
            | Effect::AnswerOffer { link, .. }
            | Effect::ApplyAnswer { link, .. }
            | Effect::AddCandidate { link, .. }
            | Effect::ArmTimeout { link } => Some(*link),
            Effect::Signal(_) | Effect::ScheduleRetry { .. } | Effect::Deliver(_) | Effect::Stop => {
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transition Function
// ---------------------------------------------------------------------------

pub fn on_event(state: &LinkState, event: BridgeEvent) -> (LinkState, Vec<Effect>) {
    let mut next = state.clone();
    let mut effects = Vec::new();

    if next.stopped {
        return (next, effects);
    }

    match event {
        BridgeEvent::Ensure { initiate } => {
            next.initiate = initiate;
            next.requested = true;
            if matches!(next.status, BridgeStatus::Connecting | BridgeStatus::Connected) {
                debug!(status = %next.status, "Link already active, ensure is a no-op");
            } else {
                let role = preferred_role(&next);
                start_link(&mut next, role, &mut effects);
            }
        }
        BridgeEvent::Signal(signal) => on_signal(&mut next, signal, &mut effects),
        BridgeEvent::Link { link, event } => {
            if next.current_link() == Some(link) {
                on_link_event(&mut next, event, &mut effects);
            } else {
                debug!(link, "Ignoring event from retired link");
            }
        }
        BridgeEvent::RetryElapsed { ticket } => {
            if next.retry == Some(ticket) {
                next.retry = None;
                let role = preferred_role(&next);
                start_link(&mut next, role, &mut effects);
            } else {
                debug!(ticket, "Ignoring superseded retry");
            }
        }
        BridgeEvent::TimeoutElapsed { link } => {
            if next.current_link() == Some(link) && next.status == BridgeStatus::Connecting {
                fail(&mut next, NEGOTIATION_TIMED_OUT.to_string(), &mut effects);
            }
        }
        BridgeEvent::NegotiationFailed { link, message } => {
            if next.current_link() == Some(link) {
                fail(&mut next, message, &mut effects);
            }
        }
        BridgeEvent::SendRejected { message } => fail(&mut next, message, &mut effects),
        BridgeEvent::Shutdown => {
            next.stopped = true;
            next.retry = None;
            if let Some(link) = next.link.take() {
                effects.push(Effect::CloseLink { link: link.id });
            }
            next.status = BridgeStatus::Idle;
            effects.push(Effect::Stop);
        }
    }

    (next, effects)
}

fn preferred_role(state: &LinkState) -> Role {
    if state.initiate {
        Role::Initiator
    } else {
        Role::Responder
    }
}

/// Replace whatever link exists with a fresh one.
fn start_link(state: &mut LinkState, role: Role, effects: &mut Vec<Effect>) {
    state.retry = None;
    if let Some(old) = state.link.take() {
        effects.push(Effect::CloseLink { link: old.id });
    }

    state.last_link += 1;
    let id = state.last_link;
    state.link = Some(PeerLink::new(id, role));
    state.status = BridgeStatus::Connecting;

    effects.push(Effect::OpenLink { link: id, role });
    effects.push(Effect::ArmTimeout { link: id });
    if role == Role::Initiator {
        effects.push(Effect::SendOffer { link: id });
    }
}

fn fail(state: &mut LinkState, message: String, effects: &mut Vec<Effect>) {
    state.status = BridgeStatus::Error;
    state.last_error = Some(message);
    if let Some(link) = state.link.as_mut() {
        link.channel_open = false;
    }
    schedule_retry(state, effects);
}

/// Keep at most one retry pending. Nothing is retried before the bridge
/// has been asked for a connection or engaged by a peer.
fn schedule_retry(state: &mut LinkState, effects: &mut Vec<Effect>) {
    if state.retry.is_some() || !(state.requested || state.link.is_some()) {
        return;
    }
    state.last_ticket += 1;
    state.retry = Some(state.last_ticket);
    effects.push(Effect::ScheduleRetry {
        ticket: state.last_ticket,
    });
}

fn flush_candidates(link: &mut PeerLink, effects: &mut Vec<Effect>) {
    for candidate in link.pending_candidates.drain(..) {
        effects.push(Effect::AddCandidate {
            link: link.id,
            candidate,
        });
    }
}

fn on_signal(state: &mut LinkState, signal: PairingSignal, effects: &mut Vec<Effect>) {
    match signal {
        PairingSignal::Offer(offer) => {
            // A failed link with a retry pending is never revived by an offer.
            let failed = state.status == BridgeStatus::Error || state.retry.is_some();
            let needs_fresh = match &state.link {
                None => true,
                Some(link) => failed || link.remote_applied || link.role == Role::Initiator,
            };
            if needs_fresh {
                start_link(state, Role::Responder, effects);
            }
            if let Some(link) = state.link.as_mut() {
                link.remote_applied = true;
                effects.push(Effect::AnswerOffer {
                    link: link.id,
                    offer,
                });
                flush_candidates(link, effects);
            }
        }
        PairingSignal::Answer(answer) => match state.link.as_mut() {
            Some(link) if link.role == Role::Initiator && !link.remote_applied => {
                link.remote_applied = true;
                effects.push(Effect::ApplyAnswer {
                    link: link.id,
                    answer,
                });
                flush_candidates(link, effects);
            }
            _ => debug!("Ignoring duplicate or unexpected answer"),
        },
        PairingSignal::Candidate(candidate) => {
            if state.link.is_none() {
                start_link(state, Role::Responder, effects);
            }
            if let Some(link) = state.link.as_mut() {
                if link.remote_applied {
                    effects.push(Effect::AddCandidate {
                        link: link.id,
                        candidate,
                    });
                } else {
                    link.pending_candidates.push(candidate);
                }
            }
        }
    }
}

fn on_link_event(state: &mut LinkState, event: LinkEvent, effects: &mut Vec<Effect>) {
    match event {
        LinkEvent::LocalCandidate(candidate) => {
            effects.push(Effect::Signal(PairingSignal::Candidate(candidate)));
        }
        LinkEvent::StateChanged(peer @ (PeerState::Failed | PeerState::Disconnected)) => {
            fail(state, format!("peer connection {peer}"), effects);
        }
        LinkEvent::StateChanged(_) => {}
        LinkEvent::ChannelOpen => {
            if let Some(link) = state.link.as_mut() {
                link.channel_open = true;
            }
            state.status = BridgeStatus::Connected;
            state.last_error = None;
            state.retry = None;
        }
        LinkEvent::ChannelClosed => {
            if let Some(link) = state.link.as_mut() {
                link.channel_open = false;
            }
            if state.status == BridgeStatus::Connected {
                state.status = BridgeStatus::Idle;
            }
            schedule_retry(state, effects);
        }
        LinkEvent::ChannelError(message) => {
            fail(state, format!("data channel error: {message}"), effects);
        }
        LinkEvent::Message(text) => match BridgeMessage::parse(&text) {
            Ok(message) => effects.push(Effect::Deliver(message)),
            Err(e) => debug!(error = %e, "Dropping malformed channel message"),
        },
    }
}
