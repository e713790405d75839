//! Hook for loading character stats from the storage service.
//!
//! The session server never owns persistence. It asks a [`StatsSource`]
//! for a character's SPECIAL snapshot once per join, in the background,
//! and plays with baseline stats until the answer arrives.

use std::collections::HashMap;

use aetherion_protocol::StatBlock;

use crate::SessionError;

/// Looks up the stat snapshot for a user's character.
///
/// # Example
///
/// ```rust
/// use aetherion_protocol::StatBlock;
/// use aetherion_session::{SessionError, StatsSource};
///
/// /// Every account plays a glass cannon.
/// struct GlassCannon;
///
/// impl StatsSource for GlassCannon {
///     async fn load(
///         &self,
///         _user_id: &str,
///         _character_class: &str,
///     ) -> Result<Option<StatBlock>, SessionError> {
///         Ok(Some(StatBlock { strength: 10.0, endurance: 0.0, ..StatBlock::baseline() }))
///     }
/// }
/// ```
pub trait StatsSource: Send + Sync + 'static {
    /// Returns the stored stats, or `Ok(None)` when no character is on
    /// record (the session keeps the baseline).
    fn load(
        &self,
        user_id: &str,
        character_class: &str,
    ) -> impl std::future::Future<Output = Result<Option<StatBlock>, SessionError>> + Send;
}

/// A source with no storage behind it: everyone plays at baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineStats;

impl StatsSource for BaselineStats {
    async fn load(
        &self,
        _user_id: &str,
        _character_class: &str,
    ) -> Result<Option<StatBlock>, SessionError> {
        Ok(None)
    }
}

/// An in-memory table keyed by `(user id, character class)`.
///
/// Handy for local play and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    characters: HashMap<(String, String), StatBlock>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        user_id: impl Into<String>,
        character_class: impl Into<String>,
        stats: StatBlock,
    ) -> Self {
        self.characters
            .insert((user_id.into(), character_class.into()), stats);
        self
    }
}

impl StatsSource for MemoryStats {
    async fn load(
        &self,
        user_id: &str,
        character_class: &str,
    ) -> Result<Option<StatBlock>, SessionError> {
        Ok(self
            .characters
            .get(&(user_id.to_string(), character_class.to_string()))
            .copied())
    }
}
