//! Which provider listeners the connector keeps attached.
//!
//! A disconnected connector only waits for the provider's `connect` event, a
//! connected one follows `accountsChanged`, `chainChanged` and `disconnect`.
//! Every transition yields the listeners to attach and detach so that the
//! provider never delivers an event twice nor drops one.

use crate::provider::EventKind;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateEvent {
    /// the connector was set up
    Setup,
    ConnectRequested,
    /// accounts were obtained, either by `connect` or because the provider
    /// reconnected on its own
    Established,
    /// `connect` failed, back to the state it started from
    Failed(ConnectionState),
    /// disconnection, asked by the application or reported by the provider
    Disconnected,
}

/// A set of [`EventKind`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ListenerSet(u8);

impl ListenerSet {
    pub const EMPTY: Self = Self(0);
    pub const DISCONNECTED: Self = Self::EMPTY.with(EventKind::Connect);
    pub const CONNECTED: Self = Self::EMPTY
        .with(EventKind::AccountsChanged)
        .with(EventKind::ChainChanged)
        .with(EventKind::Disconnect);

    const fn bit(kind: EventKind) -> u8 {
        match kind {
            EventKind::Connect => 1,
            EventKind::Disconnect => 1 << 1,
            EventKind::AccountsChanged => 1 << 2,
            EventKind::ChainChanged => 1 << 3,
        }
    }

    pub const fn with(self, kind: EventKind) -> Self {
        Self(self.0 | Self::bit(kind))
    }

    pub const fn without(self, kind: EventKind) -> Self {
        Self(self.0 & !Self::bit(kind))
    }

    pub const fn contains(self, kind: EventKind) -> bool {
        self.0 & Self::bit(kind) != 0
    }

    pub fn iter(self) -> impl Iterator<Item = EventKind> {
        EventKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }

    fn minus(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerDelta {
    pub attach: ListenerSet,
    pub detach: ListenerSet,
}

impl ListenerDelta {
    pub fn is_empty(&self) -> bool {
        self.attach == ListenerSet::EMPTY && self.detach == ListenerSet::EMPTY
    }

    /// the listeners attached once the delta is applied to `attached`
    pub fn apply(&self, attached: ListenerSet) -> ListenerSet {
        ListenerSet(attached.minus(self.detach).0 | self.attach.0)
    }
}

fn required(state: ConnectionState, attached: ListenerSet) -> ListenerSet {
    match state {
        ConnectionState::Disconnected => ListenerSet::DISCONNECTED,
        // keep whatever is attached while negotiating
        ConnectionState::Connecting => attached,
        ConnectionState::Connected => ListenerSet::CONNECTED,
    }
}

/// The transition table: next state for `(state, event)` and the listener
/// changes it implies given what is currently `attached`.
pub fn transition(
    state: ConnectionState,
    event: StateEvent,
    attached: ListenerSet,
) -> (ConnectionState, ListenerDelta) {
    let next = match (state, event) {
        (ConnectionState::Connected, StateEvent::Setup) => ConnectionState::Connected,
        (_, StateEvent::Setup) => ConnectionState::Disconnected,
        (_, StateEvent::ConnectRequested) => ConnectionState::Connecting,
        (_, StateEvent::Established) => ConnectionState::Connected,
        (_, StateEvent::Failed(previous)) => previous,
        (_, StateEvent::Disconnected) => ConnectionState::Disconnected,
    };

    let target = required(next, attached);
    let delta = ListenerDelta {
        attach: target.minus(attached),
        detach: attached.minus(target),
    };
    (next, delta)
}
