//! Type effectiveness chart.

use crate::dataset::Dataset;
use crate::models::{Skill, Species, TypeEffectiveness, TypeId};
use std::collections::HashMap;

/// Multiplier applied when no row exists for a pair.
pub const NEUTRAL_MULTIPLIER: f64 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct TypeChart {
    multipliers: HashMap<(TypeId, TypeId), f64>,
    type_ids: Vec<TypeId>,
}

impl TypeChart {
    pub fn new(rows: &[TypeEffectiveness], type_ids: impl IntoIterator<Item = TypeId>) -> Self {
        let mut type_ids: Vec<TypeId> = type_ids.into_iter().collect();
        type_ids.sort_unstable();
        type_ids.dedup();

        Self {
            multipliers: rows
                .iter()
                .map(|row| ((row.attacking, row.defending), row.multiplier))
                .collect(),
            type_ids,
        }
    }

    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self::new(&dataset.effectiveness, dataset.types.keys().copied())
    }

    /// Multiplier for `attacking` hitting `defending`.
    pub fn multiplier(&self, attacking: TypeId, defending: TypeId) -> f64 {
        self.multipliers
            .get(&(attacking, defending))
            .copied()
            .unwrap_or(NEUTRAL_MULTIPLIER)
    }

    pub fn skill_multiplier(&self, skill: &Skill, target: &Species) -> f64 {
        self.multiplier(skill.type_id, target.type_id)
    }

    /// Attacking types that deal more than neutral damage to `defending`.
    pub fn weaknesses(&self, defending: TypeId) -> Vec<(TypeId, f64)> {
        self.against(defending, |m| m > NEUTRAL_MULTIPLIER)
    }

    /// Attacking types that deal less than neutral damage to `defending`.
    pub fn resistances(&self, defending: TypeId) -> Vec<(TypeId, f64)> {
        self.against(defending, |m| m < NEUTRAL_MULTIPLIER)
    }

    fn against(&self, defending: TypeId, keep: impl Fn(f64) -> bool) -> Vec<(TypeId, f64)> {
        self.type_ids
            .iter()
            .map(|&attacking| (attacking, self.multiplier(attacking, defending)))
            .filter(|&(_, m)| keep(m))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{bear_dataset, species};

    fn chart() -> TypeChart {
        TypeChart::from_dataset(&Dataset::from_raw(bear_dataset()).unwrap())
    }

    #[test]
    fn test_stored_and_missing_pairs() {
        let chart = chart();
        assert_eq!(chart.multiplier(2, 1), 2.0);
        assert_eq!(chart.multiplier(1, 2), 0.5);
        assert_eq!(chart.multiplier(3, 1), 1.0);
        // Types never listed as attackers fall back to neutral too.
        assert_eq!(chart.multiplier(42, 1), 1.0);
    }

    #[test]
    fn test_weaknesses_and_resistances() {
        let chart = chart();
        assert_eq!(chart.weaknesses(1), vec![(2, 2.0)]);
        assert!(chart.resistances(1).is_empty());
        assert_eq!(chart.resistances(2), vec![(1, 0.5)]);
    }

    #[test]
    fn test_skill_against_species() {
        let dataset = Dataset::from_raw(bear_dataset()).unwrap();
        let chart = TypeChart::from_dataset(&dataset);
        let flame = &dataset.skills[&100];
        assert_eq!(chart.skill_multiplier(flame, &species(9, "Target", 1)), 2.0);
        assert_eq!(chart.skill_multiplier(flame, &species(9, "Target", 3)), 1.0);
    }
}
