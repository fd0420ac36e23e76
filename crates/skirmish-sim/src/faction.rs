//! Faction hostility and the hostile monster roster.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use skirmish_common::{FactionId, MonsterTypeId};
use tracing::info;

use crate::config::FactionConfig;

/// Set of factions whose NPCs run combat AI.
#[derive(Debug, Clone, Default)]
pub struct HostileFactions {
    factions: AHashSet<FactionId>,
}

impl HostileFactions {
    /// Creates the set from faction IDs.
    #[must_use]
    pub fn new(factions: impl IntoIterator<Item = FactionId>) -> Self {
        Self {
            factions: factions.into_iter().collect(),
        }
    }

    /// Returns whether the faction is hostile.
    #[must_use]
    pub fn contains(&self, faction: FactionId) -> bool {
        self.factions.contains(&faction)
    }

    /// Number of hostile factions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factions.len()
    }

    /// Returns true if no faction is hostile.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factions.is_empty()
    }
}

impl From<&FactionConfig> for HostileFactions {
    fn from(config: &FactionConfig) -> Self {
        Self::new(config.hostile.iter().copied())
    }
}

/// Static data of a monster archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterRecord {
    /// Archetype ID
    pub id: MonsterTypeId,
    /// Faction the archetype belongs to
    pub faction: FactionId,
    /// Character chassis; zero means the record has no spawnable body
    pub chassis_id: u32,
}

/// Spawnable hostile monster types for an area.
///
/// Built once at area load and read-only afterwards.
#[derive(Debug, Clone)]
pub struct HostileRoster {
    types: Vec<MonsterTypeId>,
}

impl HostileRoster {
    /// Collects hostile, spawnable archetypes; falls back to `fallback` if none qualify.
    #[must_use]
    pub fn build(records: &[MonsterRecord], hostile: &HostileFactions, fallback: MonsterTypeId) -> Self {
        let mut types: Vec<MonsterTypeId> = records
            .iter()
            .filter(|r| r.chassis_id != 0 && hostile.contains(r.faction))
            .map(|r| r.id)
            .collect();
        types.sort_unstable();
        types.dedup();

        if types.is_empty() {
            types.push(fallback);
        }

        info!("Hostile roster: {} monster types", types.len());
        Self { types }
    }

    /// Roster entries.
    #[must_use]
    pub fn types(&self) -> &[MonsterTypeId] {
        &self.types
    }

    /// Picks a random entry.
    #[must_use]
    pub fn pick(&self, rng: &mut fastrand::Rng) -> MonsterTypeId {
        self.types[rng.usize(..self.types.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, faction: u32, chassis_id: u32) -> MonsterRecord {
        MonsterRecord {
            id: MonsterTypeId::new(id),
            faction: FactionId::new(faction),
            chassis_id,
        }
    }

    #[test]
    fn test_hostile_factions() {
        let hostile = HostileFactions::from(&FactionConfig::default());
        assert!(hostile.contains(FactionId::new(2)));
        assert!(!hostile.contains(FactionId::NEUTRAL));
        assert_eq!(hostile.len(), 3);
    }

    #[test]
    fn test_roster_filters_records() {
        let hostile = HostileFactions::new([FactionId::new(5)]);
        let records = [record(10, 5, 1), record(11, 5, 0), record(12, 1, 1), record(13, 5, 7)];
        let roster = HostileRoster::build(&records, &hostile, MonsterTypeId::new(356));
        assert_eq!(roster.types(), &[MonsterTypeId::new(10), MonsterTypeId::new(13)]);

        let mut rng = fastrand::Rng::with_seed(1);
        assert!(roster.types().contains(&roster.pick(&mut rng)));
    }

    #[test]
    fn test_roster_fallback() {
        let roster = HostileRoster::build(&[], &HostileFactions::default(), MonsterTypeId::new(356));
        assert_eq!(roster.types(), &[MonsterTypeId::new(356)]);
    }
}
