//! The per-room lobby state machine.
//!
//! The machine is plain data: a phase, the instant it was entered, and at
//! most one deadline. Nothing here sleeps or spawns. A scheduler calls
//! [`LobbyMachine::advance`] with the current time and the machine
//! reports which phase changes happened, so tests can drive it with
//! synthetic instants.

use std::time::{Duration, Instant};

use crate::{RoomConfig, RoomPhase};

/// A phase change (or phase snapshot) to be announced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// The lobby is open; the countdown begins after `remaining`.
    LobbyOpened { remaining: Duration },
    /// Periodic reminder of the time left in an open lobby.
    LobbyTick { remaining: Duration },
    /// One step of the pre-game countdown.
    Countdown(u32),
    /// The game has started.
    Started,
}

#[derive(Debug, Clone)]
pub struct LobbyMachine {
    phase: RoomPhase,
    entered_at: Instant,
    deadline: Option<Instant>,
    countdown: u32,
    countdown_from: u32,
    countdown_interval: Duration,
    lobby_wait: Duration,
    lobby_tick_interval: Option<Duration>,
    next_lobby_tick: Option<Instant>,
}

impl LobbyMachine {
    pub fn new(config: &RoomConfig, now: Instant) -> Self {
        Self {
            phase: RoomPhase::Waiting,
            entered_at: now,
            deadline: None,
            countdown: 0,
            countdown_from: config.countdown_from,
            countdown_interval: config.countdown_interval(),
            lobby_wait: config.lobby_wait(),
            lobby_tick_interval: config.lobby_tick_interval(),
            next_lobby_tick: None,
        }
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn entered_at(&self) -> Instant {
        self.entered_at
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Current countdown value while in [`RoomPhase::Countdown`].
    pub fn countdown(&self) -> Option<u32> {
        (self.phase == RoomPhase::Countdown).then_some(self.countdown)
    }

    /// Time left before the armed deadline fires.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .map(|d| d.saturating_duration_since(now))
            .unwrap_or_default()
    }

    /// Moves to `phase` if that keeps the phase monotonic.
    fn enter(&mut self, phase: RoomPhase, at: Instant) -> bool {
        if !self.phase.can_advance_to(phase) {
            return false;
        }
        tracing::debug!(from = %self.phase, to = %phase, "room phase change");
        self.phase = phase;
        self.entered_at = at;
        true
    }

    /// Applies the population rule: a room opens its lobby the moment
    /// it holds two players. A lone player waits with no timer.
    pub fn on_population(&mut self, members: usize, now: Instant) -> Option<PhaseEvent> {
        if members < 2 {
            return None;
        }
        self.open_lobby(self.lobby_wait, now)
    }

    /// Opens the lobby with an explicit wait. Only valid from
    /// [`RoomPhase::Waiting`]; later phases are left alone.
    pub fn open_lobby(&mut self, wait: Duration, now: Instant) -> Option<PhaseEvent> {
        if self.phase != RoomPhase::Waiting || !self.enter(RoomPhase::Lobby, now) {
            return None;
        }
        self.deadline = Some(now + wait);
        self.next_lobby_tick = self.lobby_tick_interval.map(|every| now + every);
        Some(PhaseEvent::LobbyOpened { remaining: wait })
    }

    /// Skips any remaining waiting and starts the game now.
    pub fn force_start(&mut self, now: Instant) -> Option<PhaseEvent> {
        if !self.enter(RoomPhase::Active, now) {
            return None;
        }
        self.deadline = None;
        Some(PhaseEvent::Started)
    }

    /// Fires every deadline that is due at `now`, in order.
    ///
    /// Usually yields zero or one event, but a scheduler that stalled can
    /// cross several deadlines at once; each intermediate step is still
    /// reported. A deadline left over from a phase that has already been
    /// passed (e.g. by a force start) is discarded.
    ///
    /// Lobby ticks are not deadlines: missed ones collapse into the latest,
    /// and none is reported once the lobby deadline itself is due.
    pub fn advance(&mut self, now: Instant) -> Vec<PhaseEvent> {
        let mut events: Vec<PhaseEvent> = self.lobby_tick(now).into_iter().collect();

        while let Some(due) = self.deadline {
            if now < due {
                break;
            }
            match self.phase {
                RoomPhase::Lobby => {
                    if self.countdown_from == 0 {
                        self.deadline = None;
                        self.enter(RoomPhase::Active, due);
                        events.push(PhaseEvent::Started);
                    } else {
                        self.enter(RoomPhase::Countdown, due);
                        self.countdown = self.countdown_from;
                        self.deadline = Some(due + self.countdown_interval);
                        events.push(PhaseEvent::Countdown(self.countdown));
                    }
                }
                RoomPhase::Countdown if self.countdown > 1 => {
                    self.countdown -= 1;
                    self.deadline = Some(due + self.countdown_interval);
                    events.push(PhaseEvent::Countdown(self.countdown));
                }
                RoomPhase::Countdown => {
                    self.deadline = None;
                    self.enter(RoomPhase::Active, due);
                    events.push(PhaseEvent::Started);
                }
                RoomPhase::Waiting | RoomPhase::Active => {
                    tracing::trace!(phase = %self.phase, "discarding stale deadline");
                    self.deadline = None;
                }
            }
        }

        events
    }

    fn lobby_tick(&mut self, now: Instant) -> Option<PhaseEvent> {
        if self.phase != RoomPhase::Lobby {
            return None;
        }
        let (Some(mut tick), Some(every), Some(deadline)) =
            (self.next_lobby_tick, self.lobby_tick_interval, self.deadline)
        else {
            return None;
        };
        if now < tick {
            return None;
        }
        while tick + every <= now {
            tick += every;
        }
        self.next_lobby_tick = Some(tick + every);
        if now >= deadline || tick >= deadline {
            return None;
        }
        Some(PhaseEvent::LobbyTick {
            remaining: deadline - tick,
        })
    }

    /// The snapshot a late joiner needs to sync with the room's phase.
    pub fn catch_up(&self, now: Instant) -> Option<PhaseEvent> {
        match self.phase {
            RoomPhase::Waiting => None,
            RoomPhase::Lobby => Some(PhaseEvent::LobbyOpened {
                remaining: self.remaining(now),
            }),
            RoomPhase::Countdown => Some(PhaseEvent::Countdown(self.countdown)),
            RoomPhase::Active => Some(PhaseEvent::Started),
        }
    }

    /// Disarms the pending deadline, if any. The phase is unchanged.
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.next_lobby_tick = None;
    }
}
