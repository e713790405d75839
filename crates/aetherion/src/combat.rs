//! Server-authoritative damage resolution.
//!
//! The formula is a pure function of the attacker's stats, class, attack
//! category and a pair of pre-drawn [`Rolls`]. Randomness is drawn
//! separately so tests can pin it.
//!
//! ```text
//! base  = offset + 2·primary + 0.5·secondary
//! raw   = base × class_multiplier × variance × (crit ? crit_multiplier : 1)
//! final = max(0, round(raw))
//! ```

use std::fmt;

use aetherion_protocol::{AttackType, StatBlock, Vec3};
use rand::Rng;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub melee_range: f32,
    pub ranged_range: f32,
    pub magic_range: f32,
    pub base_damage_offset: f32,
    /// Half-width of the uniform damage spread (0.1 = ±10%).
    pub variance: f32,
    pub crit_per_luck: f32,
    pub crit_cap: f32,
    pub crit_multiplier: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            melee_range: 3.0,
            ranged_range: 30.0,
            magic_range: 25.0,
            base_damage_offset: 10.0,
            variance: 0.10,
            crit_per_luck: 0.02,
            crit_cap: 0.50,
            crit_multiplier: 2.0,
        }
    }
}

impl CombatConfig {
    pub fn max_range(&self, attack_type: AttackType) -> f32 {
        match attack_type {
            AttackType::Melee => self.melee_range,
            AttackType::Ranged => self.ranged_range,
            AttackType::Magic => self.magic_range,
        }
    }

    /// Probability of a critical hit, in `0.0..=crit_cap`.
    pub fn crit_chance(&self, luck: f32) -> f32 {
        (luck * self.crit_per_luck).clamp(0.0, self.crit_cap.clamp(0.0, 1.0))
    }
}

// ---------------------------------------------------------------------------
// Character classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterClass {
    Warrior,
    Archer,
    Mage,
    Rogue,
    Paladin,
    /// Any class name the server does not know. Deals neutral damage.
    Unknown,
}

impl CharacterClass {
    /// Case-insensitive lookup. Never fails.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "warrior" => Self::Warrior,
            "archer" => Self::Archer,
            "mage" => Self::Mage,
            "rogue" => Self::Rogue,
            "paladin" => Self::Paladin,
            _ => Self::Unknown,
        }
    }

    pub fn multiplier(self, attack_type: AttackType) -> f32 {
        use AttackType::{Magic, Melee, Ranged};
        match (self, attack_type) {
            (Self::Warrior, Melee) => 1.2,
            (Self::Warrior, Ranged) => 0.8,
            (Self::Warrior, Magic) => 0.7,
            (Self::Archer, Melee) => 0.9,
            (Self::Archer, Ranged) => 1.25,
            (Self::Archer, Magic) => 0.8,
            (Self::Mage, Melee) => 0.7,
            (Self::Mage, Ranged) => 0.8,
            (Self::Mage, Magic) => 1.3,
            (Self::Rogue, Melee) => 1.15,
            (Self::Rogue, Ranged) => 1.1,
            (Self::Rogue, Magic) => 0.8,
            (Self::Paladin, Melee) => 1.1,
            (Self::Paladin, Ranged) => 0.8,
            (Self::Paladin, Magic) => 1.1,
            (Self::Unknown, _) => 1.0,
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Warrior => "Warrior",
            Self::Archer => "Archer",
            Self::Mage => "Mage",
            Self::Rogue => "Rogue",
            Self::Paladin => "Paladin",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Rolls and damage
// ---------------------------------------------------------------------------

/// The random inputs of one attack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rolls {
    /// Damage multiplier in `[1 − variance, 1 + variance]`.
    pub variance: f32,
    pub crit: bool,
}

impl Rolls {
    /// No spread, no crit.
    pub const NEUTRAL: Self = Self {
        variance: 1.0,
        crit: false,
    };

    pub fn roll<R: Rng + ?Sized>(config: &CombatConfig, luck: f32, rng: &mut R) -> Self {
        let spread = config.variance.max(0.0);
        let variance = rng.random_range((1.0 - spread)..=(1.0 + spread));
        let crit = rng.random_bool(f64::from(config.crit_chance(luck)));
        Self { variance, crit }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damage {
    pub amount: u32,
    pub critical: bool,
}

/// Primary and secondary attribute for an attack category.
fn weighted_stats(stats: &StatBlock, attack_type: AttackType) -> (f32, f32) {
    match attack_type {
        AttackType::Melee => (stats.strength, stats.agility),
        AttackType::Ranged => (stats.perception, stats.agility),
        AttackType::Magic => (stats.intelligence, stats.charisma),
    }
}

pub fn compute_damage(
    config: &CombatConfig,
    stats: &StatBlock,
    class: CharacterClass,
    attack_type: AttackType,
    rolls: Rolls,
) -> Damage {
    let (primary, secondary) = weighted_stats(stats, attack_type);
    let base = config.base_damage_offset + 2.0 * primary + 0.5 * secondary;
    let mut raw = base * class.multiplier(attack_type) * rolls.variance;
    if rolls.crit {
        raw *= config.crit_multiplier;
    }
    let amount = if raw.is_finite() { raw.round().max(0.0) as u32 } else { 0 };
    Damage {
        amount,
        critical: rolls.crit,
    }
}

/// An attack whose target was out of reach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutOfRange {
    pub distance: f32,
    pub max_range: f32,
}

/// Returns the attacker-to-target distance if it is within range.
pub fn check_range(
    config: &CombatConfig,
    attack_type: AttackType,
    from: Vec3,
    to: Vec3,
) -> Result<f32, OutOfRange> {
    let distance = from.distance(to);
    let max_range = config.max_range(attack_type);
    if distance > max_range {
        Err(OutOfRange {
            distance,
            max_range,
        })
    } else {
        Ok(distance)
    }
}
