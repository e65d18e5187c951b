//! Reconnect supervision for the feed subscription.
//!
//! The feed closes subscriptions on its own schedule. Whenever the live
//! subscription reports that it ended (or its stream is gone), the supervisor
//! waits a fixed delay and opens a new one through the same connector, so the
//! same post handler keeps receiving posts.
//!
//! ```text
//!                open                       ended / destroyed
//! Disconnected ───────▶ Connected ─────────────────────────▶ WaitingToReconnect
//!                           ▲                                        │
//!                           └──────────── delay elapsed ─────────────┘
//! ```
//!
//! Both terminal signals usually arrive for the same subscription. Only the
//! first one schedules a reconnect; at most one timer is ever pending.

use crate::source::{FeedSignal, FeedTransport, StreamConnector};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default delay between a subscription ending and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Connection state of the supervised subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connected,
    WaitingToReconnect,
}

/// Outcome of a terminal signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Start the reconnect timer.
    ScheduleReconnect,
    /// A timer is already pending; nothing to do.
    AlreadyWaiting,
    /// The signal belongs to an older subscription, or nothing is connected.
    Ignored,
}

/// The reconnect state machine, without any timers or I/O.
#[derive(Debug)]
pub struct ReconnectState {
    state: SupervisorState,
    generation: u64,
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectState {
    pub fn new() -> Self {
        Self {
            state: SupervisorState::Disconnected,
            generation: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Generation of the current (or most recent) subscription.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record that a new subscription was opened. Returns its generation.
    pub fn connected(&mut self) -> u64 {
        self.generation += 1;
        self.state = SupervisorState::Connected;
        self.generation
    }

    /// Apply an ended/destroyed signal from subscription `generation`.
    pub fn on_terminal(&mut self, generation: u64) -> Transition {
        if generation != self.generation {
            return Transition::Ignored;
        }

        match self.state {
            SupervisorState::Connected => {
                self.state = SupervisorState::WaitingToReconnect;
                Transition::ScheduleReconnect
            }
            SupervisorState::WaitingToReconnect => Transition::AlreadyWaiting,
            SupervisorState::Disconnected => Transition::Ignored,
        }
    }

    pub fn disconnected(&mut self) {
        self.state = SupervisorState::Disconnected;
    }
}

/// Counters returned when the supervisor stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Subscriptions opened, including the first.
    pub subscriptions: u64,
    /// Terminal signals that did not schedule a reconnect.
    pub signals_ignored: u64,
}

/// Keeps one feed subscription alive, reopening it after a fixed delay.
pub struct ReconnectSupervisor<T> {
    connector: StreamConnector<T>,
    signals: UnboundedReceiver<FeedSignal>,
    delay: Duration,
    state: ReconnectState,
    subscription: Option<JoinHandle<()>>,
    stats: SupervisorStats,
}

impl<T: FeedTransport> ReconnectSupervisor<T> {
    /// Create a supervisor.
    ///
    /// `signals` must be the receiving end of the channel `connector`
    /// reports terminal signals on.
    pub fn new(
        connector: StreamConnector<T>,
        signals: UnboundedReceiver<FeedSignal>,
        delay: Duration,
    ) -> Self {
        Self {
            connector,
            signals,
            delay,
            state: ReconnectState::new(),
            subscription: None,
            stats: SupervisorStats::default(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state.state()
    }

    /// Open the first subscription and keep reopening it until `shutdown`
    /// flips to `true` (or its sender is dropped).
    ///
    /// On shutdown the pending timer is dropped and the live subscription is
    /// aborted before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SupervisorStats {
        if *shutdown.borrow_and_update() {
            return self.stats;
        }

        self.connect();

        let timer = tokio::time::sleep(self.delay);
        tokio::pin!(timer);

        loop {
            let waiting = self.state.state() == SupervisorState::WaitingToReconnect;

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested, stopping feed supervisor");
                        break;
                    }
                }
                signal = self.signals.recv() => {
                    let Some(signal) = signal else {
                        warn!("Feed signal channel closed, stopping feed supervisor");
                        break;
                    };
                    if self.on_signal(&signal) {
                        timer.as_mut().reset(Instant::now() + self.delay);
                    }
                }
                () = &mut timer, if waiting => {
                    info!("Reconnecting to feed");
                    self.connect();
                }
            }
        }

        self.disconnect().await;
        self.stats
    }

    /// Returns `true` if a reconnect timer should be started.
    fn on_signal(&mut self, signal: &FeedSignal) -> bool {
        let transition = self.state.on_terminal(signal.generation());
        match transition {
            Transition::ScheduleReconnect => {
                match signal {
                    FeedSignal::Ended { reason, .. } => {
                        warn!("Feed subscription ended: {}", reason)
                    }
                    FeedSignal::Destroyed { .. } => warn!("Feed stream destroyed"),
                }
                info!("Reconnecting in {}s", self.delay.as_secs());
                true
            }
            Transition::AlreadyWaiting | Transition::Ignored => {
                self.stats.signals_ignored += 1;
                debug!(
                    "Ignoring {:?} (current generation {}, {:?})",
                    signal,
                    self.state.generation(),
                    transition
                );
                false
            }
        }
    }

    fn connect(&mut self) {
        if let Some(previous) = self.subscription.take() {
            previous.abort();
        }

        let generation = self.state.connected();
        self.stats.subscriptions += 1;
        self.subscription = Some(self.connector.open(generation));
    }

    async fn disconnect(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.abort();
            // Wait for the task to be dropped so the transport is released.
            let _ = subscription.await;
        }
        self.state.disconnected();
    }
}
