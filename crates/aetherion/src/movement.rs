//! Server-side plausibility check for client-reported movement.
//!
//! Clients own their own physics; the server only refuses moves that no
//! legitimate client could produce. Two rules, in order:
//!
//! 1. **Teleport**: a jump longer than `teleport_threshold` is rejected
//!    outright and the player stays where the server last saw them.
//! 2. **Speed**: a move longer than the player's distance allowance is
//!    clamped along its direction of travel to the furthest legal point.
//!
//! The allowance refills at `max_speed` and banks up to `burst_secs`
//! worth of travel. Updates are timed by their arrival at the server, so
//! frames that the network delivers bunched together spend from the bank
//! instead of being judged on a near-zero gap. Sustained movement above
//! `max_speed` drains the bank and is clamped.

use std::fmt;

use aetherion_protocol::Vec3;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Metres per second.
    pub max_speed: f32,
    /// Metres per update.
    pub teleport_threshold: f32,
    /// Seconds of travel at `max_speed` a player may bank. Zero judges
    /// every update on its own arrival gap.
    pub burst_secs: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            max_speed: 15.0,
            teleport_threshold: 10.0,
            burst_secs: 0.5,
        }
    }
}

impl MovementConfig {
    /// Largest distance a player can have banked, and the allowance a
    /// fresh position baseline starts with.
    pub fn burst_allowance(&self) -> f32 {
        self.max_speed * self.burst_secs.max(0.0)
    }
}

/// Why a reported position was not accepted verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionReason {
    SpeedLimit,
    TeleportBlocked,
}

impl CorrectionReason {
    /// Wire name sent in `position_correction`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpeedLimit => "speed_limit",
            Self::TeleportBlocked => "teleport_blocked",
        }
    }
}

impl fmt::Display for CorrectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementVerdict {
    /// The position the server will store and broadcast.
    pub position: Vec3,
    pub corrected: bool,
    pub reason: Option<CorrectionReason>,
    /// Distance allowance left for the next update.
    pub budget: f32,
}

impl MovementVerdict {
    /// The first known position. Nothing to check it against.
    pub fn baseline(config: &MovementConfig, position: Vec3) -> Self {
        Self::accepted(position, config.burst_allowance())
    }

    fn accepted(position: Vec3, budget: f32) -> Self {
        Self {
            position,
            corrected: false,
            reason: None,
            budget,
        }
    }

    fn corrected(position: Vec3, reason: CorrectionReason, budget: f32) -> Self {
        Self {
            position,
            corrected: true,
            reason: Some(reason),
            budget,
        }
    }
}

/// Checks a move from `last` to `reported` that arrived `elapsed_secs`
/// after the previous one, with `budget` metres of allowance banked.
///
/// Callers must reject non-finite input before calling; this function
/// assumes every coordinate is a real number.
pub fn validate(
    config: &MovementConfig,
    last: Vec3,
    reported: Vec3,
    elapsed_secs: f32,
    budget: f32,
) -> MovementVerdict {
    let refill = config.max_speed * elapsed_secs.max(0.0);
    let available = (budget.max(0.0) + refill).min(config.burst_allowance().max(refill));
    let delta = reported - last;
    let distance = delta.length();

    if distance > config.teleport_threshold {
        return MovementVerdict::corrected(last, CorrectionReason::TeleportBlocked, available);
    }

    if distance > available {
        // distance > available >= 0, so the division is safe.
        let clamped = last + delta.scale(available / distance);
        return MovementVerdict::corrected(clamped, CorrectionReason::SpeedLimit, 0.0);
    }

    MovementVerdict::accepted(reported, available - distance)
}
