//! Transport lifecycle and observable bring-up progress.

use crate::address::TransportType;
use std::fmt;
use tokio::sync::watch;
use tracing::info;

/// Lifecycle of one transport instance. States advance one way; an instance
/// that reached `Shutdown` is done for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportState {
    /// Constructed, nothing started.
    Uninitialized,
    /// Bring-up in flight.
    Initializing,
    /// Serving sockets.
    Ready,
    /// Teardown in flight.
    ShuttingDown,
    /// Torn down.
    Shutdown,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Uninitialized => "uninitialized",
            TransportState::Initializing => "initializing",
            TransportState::Ready => "ready",
            TransportState::ShuttingDown => "shutting_down",
            TransportState::Shutdown => "shutdown",
        };
        write!(f, "{name}")
    }
}

/// Watchable holder for a transport's lifecycle state.
#[derive(Debug)]
pub struct TransportStateCell {
    transport: TransportType,
    tx: watch::Sender<TransportState>,
}

impl TransportStateCell {
    /// Start at [`TransportState::Uninitialized`].
    pub fn new(transport: TransportType) -> Self {
        let (tx, _rx) = watch::channel(TransportState::Uninitialized);
        Self { transport, tx }
    }

    /// Current state.
    pub fn get(&self) -> TransportState {
        *self.tx.borrow()
    }

    /// Watch future state changes.
    pub fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.tx.subscribe()
    }

    /// Advance to `next`. Transitions never go backwards; a stale `set` is
    /// ignored.
    pub fn set(&self, next: TransportState) {
        self.tx.send_if_modified(|current| {
            if next > *current {
                info!(transport = %self.transport, from = %*current, to = %next, "transport state changed");
                *current = next;
                true
            } else {
                false
            }
        });
    }
}

/// Milestones a transport walks through while coming up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootstrapState {
    /// Reaching the underlying network (daemon bootstrap, router probe).
    BootstrapToNetwork,
    /// Publishing the local listening endpoint.
    StartPublishService,
    /// Endpoint published and reachable.
    ServicePublished,
    /// At least one peer connection established.
    ConnectedToPeers,
}

impl BootstrapState {
    /// Progress floor once the milestone is reached.
    pub fn base_progress(self) -> f64 {
        match self {
            BootstrapState::BootstrapToNetwork => 0.0,
            BootstrapState::StartPublishService => 0.25,
            BootstrapState::ServicePublished => 0.5,
            BootstrapState::ConnectedToPeers => 0.75,
        }
    }
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapState::BootstrapToNetwork => "bootstrap_to_network",
            BootstrapState::StartPublishService => "start_publish_service",
            BootstrapState::ServicePublished => "service_published",
            BootstrapState::ConnectedToPeers => "connected_to_peers",
        };
        write!(f, "{name}")
    }
}

/// Observable bring-up progress: the current milestone, a fraction in
/// `[0, 1]` and a short human-readable detail. Milestone and fraction only
/// ever advance, so watchers can render a progress bar that never jumps
/// backwards even when updates race.
#[derive(Debug)]
pub struct BootstrapInfo {
    transport: TransportType,
    state: watch::Sender<BootstrapState>,
    progress: watch::Sender<f64>,
    details: watch::Sender<String>,
}

impl BootstrapInfo {
    /// Start at [`BootstrapState::BootstrapToNetwork`] with zero progress.
    pub fn new(transport: TransportType) -> Self {
        let (state, _) = watch::channel(BootstrapState::BootstrapToNetwork);
        let (progress, _) = watch::channel(0.0);
        let (details, _) = watch::channel(String::new());
        Self { transport, state, progress, details }
    }

    /// Current milestone.
    pub fn state(&self) -> BootstrapState {
        *self.state.borrow()
    }

    /// Current progress fraction.
    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    /// Latest detail line.
    pub fn details(&self) -> String {
        self.details.borrow().clone()
    }

    /// Watch milestone changes.
    pub fn subscribe_state(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    /// Watch progress changes.
    pub fn subscribe_progress(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    /// Report reaching `state` with `progress`. The effective fraction is at
    /// least the milestone's floor; updates older than the current milestone
    /// are dropped entirely.
    pub fn update(&self, state: BootstrapState, progress: f64, details: impl Into<String>) {
        if state < *self.state.borrow() {
            return;
        }
        let reached_milestone = self.state.send_if_modified(|current| {
            if state > *current {
                *current = state;
                true
            } else {
                false
            }
        });
        let effective = progress.max(state.base_progress()).clamp(0.0, 1.0);
        self.progress.send_if_modified(|current| {
            if effective > *current {
                *current = effective;
                true
            } else {
                false
            }
        });
        let details = details.into();
        if reached_milestone {
            info!(transport = %self.transport, milestone = %state, details, "bootstrap milestone reached");
        }
        self.details.send_replace(details);
    }

    /// Record one established peer connection. The first one reaches the
    /// final milestone; each further connection closes a quarter of the
    /// remaining gap to 1.0, so progress keeps moving without ever reporting
    /// completion for a network that is still growing.
    pub fn on_peer_connected(&self, details: impl Into<String>) {
        self.update(BootstrapState::ConnectedToPeers, 0.0, details);
        self.progress.send_if_modified(|current| {
            *current += (1.0 - *current) * 0.25;
            true
        });
    }
}
