/*!
Readiness bookkeeping deciding when the initiator may create its offer.

Three independent signals have to line up before an offer can be made: the signaling
channel is open, local media is attached-ready and the other participant announced itself.
They arrive in any order, possibly more than once, so every arrival re-runs
[`Readiness::evaluate`], which hands out [`Action::SendOffer`] at most once.
*/

use coach_call_protocol::Role;

/// Progress of the single offer a session is allowed to make.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OfferProgress {
    Waiting,
    /// Offer is being created; the gate is closed while the asynchronous steps run.
    InFlight,
    Sent,
}

/// What the coordinator has to do after a readiness change.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Action {
    SendOffer,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Readiness {
    role: Role,
    channel_open: bool,
    media_ready: bool,
    remote_ready: bool,
    offer: OfferProgress,
}

impl Readiness {
    /// Responder carries no outbound media, so it starts out media-ready.
    #[must_use]
    pub const fn new(role: Role) -> Self {
        Self {
            role,
            channel_open: false,
            media_ready: matches!(role, Role::Responder),
            remote_ready: false,
            offer: OfferProgress::Waiting,
        }
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    pub fn channel_opened(&mut self) {
        self.channel_open = true;
    }

    pub fn media_acquired(&mut self) {
        self.media_ready = true;
    }

    pub fn remote_announced(&mut self) {
        self.remote_ready = true;
    }

    #[must_use]
    pub const fn is_channel_open(&self) -> bool {
        self.channel_open
    }

    #[must_use]
    pub const fn is_media_ready(&self) -> bool {
        self.media_ready
    }

    #[must_use]
    pub const fn is_remote_ready(&self) -> bool {
        self.remote_ready
    }

    /// True from the moment an offer is handed out, including while it is still in flight.
    #[must_use]
    pub fn offer_sent(&self) -> bool {
        self.offer != OfferProgress::Waiting
    }

    #[must_use]
    pub const fn offer_progress(&self) -> OfferProgress {
        self.offer
    }

    /// Pure guard: what should happen given the current flags, without changing them.
    #[must_use]
    pub fn decide(&self) -> Option<Action> {
        let ready = self.channel_open && self.media_ready && self.remote_ready;
        (self.role == Role::Initiator && ready && self.offer == OfferProgress::Waiting)
            .then_some(Action::SendOffer)
    }

    /// [`decide`](Self::decide) and, if an offer is due, close the gate before returning.
    ///
    /// Safe to call any number of times; only the first call after all conditions are met
    /// returns [`Action::SendOffer`].
    pub fn evaluate(&mut self) -> Option<Action> {
        let action = self.decide();
        if action.is_some() {
            self.offer = OfferProgress::InFlight;
        }
        action
    }

    /// The offer left through the signaling channel.
    pub fn offer_dispatched(&mut self) {
        if self.offer == OfferProgress::InFlight {
            self.offer = OfferProgress::Sent;
        }
    }

    /// Creating the offer failed; the next readiness event may try again.
    pub fn offer_failed(&mut self) {
        if self.offer == OfferProgress::InFlight {
            self.offer = OfferProgress::Waiting;
        }
    }
}
