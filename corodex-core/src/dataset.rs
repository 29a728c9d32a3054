//! Fully materialized reference data.
//!
//! A [`Dataset`] is loaded once (from seed files or the database), validated,
//! and then only read.

use crate::error::{CorodexError, Result};
use crate::models::{
    ElementType, EvolutionLink, Skill, SkillEffect, SkillId, Species, SpeciesId, SpeciesTrait,
    Trait, TraitId, TraitVersion, TypeEffectiveness, TypeId,
};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub types: BTreeMap<TypeId, ElementType>,
    pub species: BTreeMap<SpeciesId, Species>,
    pub effectiveness: Vec<TypeEffectiveness>,
    pub evolutions: Vec<EvolutionLink>,
    pub traits: BTreeMap<TraitId, Trait>,
    pub trait_versions: Vec<TraitVersion>,
    pub species_traits: Vec<SpeciesTrait>,
    pub skills: BTreeMap<SkillId, Skill>,
    pub skill_effects: Vec<SkillEffect>,
}

/// Flat collections as they come out of a loader, before keying.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    pub types: Vec<ElementType>,
    pub species: Vec<Species>,
    pub effectiveness: Vec<TypeEffectiveness>,
    pub evolutions: Vec<EvolutionLink>,
    pub traits: Vec<Trait>,
    pub trait_versions: Vec<TraitVersion>,
    pub species_traits: Vec<SpeciesTrait>,
    pub skills: Vec<Skill>,
    pub skill_effects: Vec<SkillEffect>,
}

fn keyed<K: Ord + std::fmt::Display + Copy, V>(
    rows: Vec<V>,
    what: &str,
    key: impl Fn(&V) -> K,
) -> Result<BTreeMap<K, V>> {
    let mut map = BTreeMap::new();
    for row in rows {
        let id = key(&row);
        if map.insert(id, row).is_some() {
            return Err(CorodexError::DuplicateEntry(format!("{} id {}", what, id)));
        }
    }
    Ok(map)
}

impl Dataset {
    /// Key the raw collections and validate the result.
    pub fn from_raw(raw: RawDataset) -> Result<Self> {
        let dataset = Self {
            types: keyed(raw.types, "type", |t| t.id)?,
            species: keyed(raw.species, "species", |s| s.id)?,
            effectiveness: raw.effectiveness,
            evolutions: raw.evolutions,
            traits: keyed(raw.traits, "trait", |t| t.id)?,
            trait_versions: raw.trait_versions,
            species_traits: raw.species_traits,
            skills: keyed(raw.skills, "skill", |s| s.id)?,
            skill_effects: raw.skill_effects,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Check unique keys and foreign references.
    pub fn validate(&self) -> Result<()> {
        let mut type_names = HashSet::new();
        for element in self.types.values() {
            if !type_names.insert(element.name.as_str()) {
                return Err(CorodexError::DuplicateEntry(format!("type name {}", element.name)));
            }
        }

        let mut species_names = HashSet::new();
        for species in self.species.values() {
            if !species_names.insert(species.name.as_str()) {
                return Err(CorodexError::DuplicateEntry(format!(
                    "species name {}",
                    species.name
                )));
            }
            self.require_type(species.type_id, &format!("species {}", species.name))?;
        }

        let mut pairs = HashSet::new();
        for row in &self.effectiveness {
            self.require_type(row.attacking, "type effectiveness")?;
            self.require_type(row.defending, "type effectiveness")?;
            if !row.multiplier.is_finite() || row.multiplier < 0.0 {
                return Err(CorodexError::Validation(format!(
                    "Multiplier {} for types {} -> {} is not a non-negative number",
                    row.multiplier, row.attacking, row.defending
                )));
            }
            if !pairs.insert((row.attacking, row.defending)) {
                return Err(CorodexError::DuplicateEntry(format!(
                    "type effectiveness {} -> {}",
                    row.attacking, row.defending
                )));
            }
        }

        for link in &self.evolutions {
            let context = format!("evolution row of species {}", link.species_id);
            self.require_species(link.species_id, &context)?;
            if let Some(previous) = link.previous {
                self.require_species(previous, &context)?;
            }
            if let Some(next) = link.next {
                self.require_species(next, &context)?;
            }
        }

        let mut versions = HashSet::new();
        for version in &self.trait_versions {
            self.require_trait(version.trait_id, "trait version")?;
            if !versions.insert((version.trait_id, version.plus)) {
                return Err(CorodexError::DuplicateEntry(format!(
                    "trait {} plus {}",
                    version.trait_id, version.plus
                )));
            }
        }

        let mut grants = HashSet::new();
        for grant in &self.species_traits {
            self.require_species(grant.species_id, "species trait")?;
            self.require_trait(grant.trait_id, "species trait")?;
            if !(grant.probability > 0.0 && grant.probability <= 1.0) {
                return Err(CorodexError::Validation(format!(
                    "Probability {} for species {} trait {} is outside (0, 1]",
                    grant.probability, grant.species_id, grant.trait_id
                )));
            }
            if !grants.insert((grant.species_id, grant.trait_id)) {
                return Err(CorodexError::DuplicateEntry(format!(
                    "species {} trait {}",
                    grant.species_id, grant.trait_id
                )));
            }
        }

        for skill in self.skills.values() {
            self.require_type(skill.type_id, &format!("skill {}", skill.name))?;
        }
        for effect in &self.skill_effects {
            if !self.skills.contains_key(&effect.skill_id) {
                return Err(CorodexError::NotFound(format!(
                    "skill {} referenced by effect {}",
                    effect.skill_id, effect.effect
                )));
            }
        }

        Ok(())
    }

    fn require_type(&self, type_id: TypeId, context: &str) -> Result<()> {
        if self.types.contains_key(&type_id) {
            Ok(())
        } else {
            Err(CorodexError::NotFound(format!("type {} referenced by {}", type_id, context)))
        }
    }

    fn require_species(&self, species_id: SpeciesId, context: &str) -> Result<()> {
        if self.species.contains_key(&species_id) {
            Ok(())
        } else {
            Err(CorodexError::NotFound(format!(
                "species {} referenced by {}",
                species_id, context
            )))
        }
    }

    fn require_trait(&self, trait_id: TraitId, context: &str) -> Result<()> {
        if self.traits.contains_key(&trait_id) {
            Ok(())
        } else {
            Err(CorodexError::NotFound(format!("trait {} referenced by {}", trait_id, context)))
        }
    }

    /// Exact, case-sensitive name lookup.
    pub fn species_by_name(&self, name: &str) -> Option<&Species> {
        self.species.values().find(|s| s.name == name)
    }

    /// Accepts a numeric id or an exact species name.
    pub fn find_species(&self, key: &str) -> Option<&Species> {
        match key.trim().parse::<SpeciesId>() {
            Ok(id) => self.species.get(&id),
            Err(_) => self.species_by_name(key),
        }
    }

    pub fn type_by_name(&self, name: &str) -> Option<&ElementType> {
        self.types.values().find(|t| t.name == name)
    }

    pub fn type_name(&self, type_id: TypeId) -> Option<&str> {
        self.types.get(&type_id).map(|t| t.name.as_str())
    }

    pub fn skills_of_type(&self, type_id: TypeId) -> Vec<&Skill> {
        self.skills.values().filter(|s| s.type_id == type_id).collect()
    }

    pub fn effects_of_skill(&self, skill_id: SkillId) -> Vec<&SkillEffect> {
        self.skill_effects
            .iter()
            .filter(|e| e.skill_id == skill_id)
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::models::{StatKind, TraitKind};

    pub fn species(id: SpeciesId, name: &str, type_id: TypeId) -> Species {
        Species {
            id,
            name: name.to_string(),
            type_id,
            base_sp: 20,
            stats: StatKind::ALL.into_iter().map(|k| (k, 10)).collect(),
        }
    }

    pub fn passive(id: TraitId, name: &str) -> Trait {
        Trait {
            id,
            name: name.to_string(),
            kind: TraitKind::Passive,
            description: format!("{} base", name),
        }
    }

    pub fn grant(species_id: SpeciesId, trait_id: TraitId, probability: f64) -> SpeciesTrait {
        SpeciesTrait {
            species_id,
            trait_id,
            probability,
            plus: None,
        }
    }

    pub fn link(id: SpeciesId, previous: Option<SpeciesId>, next: Option<SpeciesId>) -> EvolutionLink {
        EvolutionLink {
            species_id: id,
            previous,
            next,
            condition: None,
        }
    }

    /// Cubzero -> Aroara -> Bearealis, plus a single-stage species and a Titan.
    pub fn bear_dataset() -> RawDataset {
        RawDataset {
            types: vec![
                ElementType { id: 1, name: "Ice".into() },
                ElementType { id: 2, name: "Fire".into() },
                ElementType { id: 3, name: "Normal".into() },
            ],
            species: vec![
                species(1, "Cubzero", 1),
                species(2, "Aroara", 1),
                species(3, "Bearealis", 1),
                species(4, "Toruga", 2),
                species(1001, "Titan Hozai", 2),
            ],
            effectiveness: vec![
                TypeEffectiveness { attacking: 2, defending: 1, multiplier: 2.0 },
                TypeEffectiveness { attacking: 1, defending: 2, multiplier: 0.5 },
            ],
            evolutions: vec![
                link(1, None, Some(2)),
                link(2, Some(1), Some(3)),
                link(3, Some(2), None),
                link(4, None, None),
                link(1001, None, None),
            ],
            traits: vec![
                passive(10, "Frostbite"),
                passive(11, "Thick Fur"),
                passive(12, "Sturdy"),
                passive(13, "Titan Might"),
            ],
            trait_versions: vec![
                TraitVersion { trait_id: 10, plus: 0, description: "Frostbite +0".into() },
                TraitVersion { trait_id: 10, plus: 1, description: "Frostbite +1".into() },
                TraitVersion { trait_id: 10, plus: 2, description: "Frostbite +2".into() },
            ],
            species_traits: vec![
                grant(3, 10, 0.3),
                grant(3, 11, 0.2),
                grant(4, 12, 0.125),
                grant(1001, 13, 1.0),
            ],
            skills: vec![Skill {
                id: 100,
                name: "Flame Burst".into(),
                type_id: 2,
                power: Some(40),
                accuracy: Some(100),
            }],
            skill_effects: vec![SkillEffect {
                skill_id: 100,
                effect: "burn".into(),
                magnitude: None,
                chance: Some(0.1),
                is_primary: false,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_valid_dataset_loads() {
        let dataset = Dataset::from_raw(bear_dataset()).unwrap();
        assert_eq!(dataset.species.len(), 5);
        assert_eq!(dataset.species_by_name("Aroara").map(|s| s.id), Some(2));
        assert_eq!(dataset.find_species("3").map(|s| s.name.as_str()), Some("Bearealis"));
        assert_eq!(dataset.find_species("Cubzero").map(|s| s.id), Some(1));
        assert!(dataset.find_species("cubzero").is_none());
        assert_eq!(dataset.type_by_name("Fire").map(|t| t.id), Some(2));
        assert_eq!(dataset.skills_of_type(2).len(), 1);
        assert_eq!(dataset.effects_of_skill(100).len(), 1);
    }

    #[test]
    fn test_duplicate_species_id_fails() {
        let mut raw = bear_dataset();
        raw.species.push(species(1, "Cubzero Again", 1));
        assert!(matches!(Dataset::from_raw(raw), Err(CorodexError::DuplicateEntry(_))));
    }

    #[test]
    fn test_duplicate_species_name_fails() {
        let mut raw = bear_dataset();
        raw.species.push(species(5, "Cubzero", 1));
        assert!(matches!(Dataset::from_raw(raw), Err(CorodexError::DuplicateEntry(_))));
    }

    #[test]
    fn test_dangling_evolution_reference_fails() {
        let mut raw = bear_dataset();
        raw.evolutions.push(link(4, None, Some(77)));
        assert!(matches!(Dataset::from_raw(raw), Err(CorodexError::NotFound(_))));
    }

    #[test]
    fn test_dangling_species_type_fails() {
        let mut raw = bear_dataset();
        raw.species.push(species(6, "Nobody", 99));
        assert!(matches!(Dataset::from_raw(raw), Err(CorodexError::NotFound(_))));
    }

    #[test]
    fn test_probability_out_of_range_fails() {
        let mut raw = bear_dataset();
        raw.species_traits.push(grant(1, 12, 0.0));
        assert!(matches!(Dataset::from_raw(raw), Err(CorodexError::Validation(_))));

        let mut raw = bear_dataset();
        raw.species_traits.push(grant(1, 12, 1.5));
        assert!(matches!(Dataset::from_raw(raw), Err(CorodexError::Validation(_))));
    }

    #[test]
    fn test_duplicate_effectiveness_pair_fails() {
        let mut raw = bear_dataset();
        raw.effectiveness.push(TypeEffectiveness { attacking: 2, defending: 1, multiplier: 1.0 });
        assert!(matches!(Dataset::from_raw(raw), Err(CorodexError::DuplicateEntry(_))));
    }

    #[test]
    fn test_effect_on_unknown_skill_fails() {
        let mut raw = bear_dataset();
        raw.skill_effects.push(SkillEffect {
            skill_id: 999,
            effect: "stun".into(),
            magnitude: None,
            chance: None,
            is_primary: true,
        });
        assert!(matches!(Dataset::from_raw(raw), Err(CorodexError::NotFound(_))));
    }
}
