//! Trait tier resolution.
//!
//! A species' tier comes from its chain position through the [`TierTable`].
//! Its traits are the ones granted to it directly, or, when it has none, the
//! traits of the final evolution of its chain.

use crate::chains::{ChainIndex, ChainPosition};
use crate::dataset::Dataset;
use crate::error::{CorodexError, Result};
use crate::models::{
    SpeciesId, SpeciesTrait, Trait, TraitId, TraitKind, TraitVersion, is_titan,
};
use crate::tiers::TierTable;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Trait lookups for resolution, built once from the dataset.
#[derive(Debug, Clone, Default)]
pub struct TraitsIndex {
    species: BTreeSet<SpeciesId>,
    traits: HashMap<TraitId, Trait>,
    versions: HashMap<(TraitId, u8), String>,
    grants: HashMap<SpeciesId, Vec<SpeciesTrait>>,
}

impl TraitsIndex {
    pub fn new(
        species: impl IntoIterator<Item = SpeciesId>,
        traits: impl IntoIterator<Item = Trait>,
        versions: &[TraitVersion],
        grants: &[SpeciesTrait],
    ) -> Self {
        let mut by_species: HashMap<SpeciesId, Vec<SpeciesTrait>> = HashMap::new();
        for grant in grants {
            by_species
                .entry(grant.species_id)
                .or_default()
                .push(grant.clone());
        }

        Self {
            species: species.into_iter().collect(),
            traits: traits.into_iter().map(|t| (t.id, t)).collect(),
            versions: versions
                .iter()
                .map(|v| ((v.trait_id, v.plus), v.description.clone()))
                .collect(),
            grants: by_species,
        }
    }

    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self::new(
            dataset.species.keys().copied(),
            dataset.traits.values().cloned(),
            &dataset.trait_versions,
            &dataset.species_traits,
        )
    }

    pub fn contains_species(&self, species_id: SpeciesId) -> bool {
        self.species.contains(&species_id)
    }

    pub fn species_ids(&self) -> impl Iterator<Item = SpeciesId> + '_ {
        self.species.iter().copied()
    }

    /// Grants recorded on the species itself.
    pub fn direct_grants(&self, species_id: SpeciesId) -> &[SpeciesTrait] {
        self.grants
            .get(&species_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn describe(&self, trait_def: &Trait, plus: u8) -> String {
        self.versions
            .get(&(trait_def.id, plus))
            .cloned()
            .unwrap_or_else(|| trait_def.description.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraitSource {
    Direct,
    /// Taken from the final evolution because the species has no traits of its own.
    Inherited { from: SpeciesId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTrait {
    pub trait_id: TraitId,
    pub name: String,
    pub kind: TraitKind,
    pub probability: f64,
    pub plus: u8,
    pub description: String,
    pub source: TraitSource,
}

impl ResolvedTrait {
    /// Probability as a whole percentage, for display only.
    pub fn display_percent(&self) -> u32 {
        (self.probability * 100.0).round() as u32
    }
}

/// Resolved traits, or the explicit marker that neither the species nor its
/// final evolution carries any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "traits", rename_all = "snake_case")]
pub enum TraitList {
    Available(Vec<ResolvedTrait>),
    NoneAvailable,
}

impl TraitList {
    pub fn is_available(&self) -> bool {
        matches!(self, TraitList::Available(_))
    }

    pub fn traits(&self) -> &[ResolvedTrait] {
        match self {
            TraitList::Available(traits) => traits,
            TraitList::NoneAvailable => &[],
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedTrait> {
        self.traits().iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesResolution {
    pub species_id: SpeciesId,
    pub chain: ChainPosition,
    pub plus: u8,
    pub traits: TraitList,
}

/// Resolve the tier and effective traits of one species.
pub fn resolve_species(
    chains: &ChainIndex,
    traits: &TraitsIndex,
    tiers: &TierTable,
    species_id: SpeciesId,
) -> Result<SpeciesResolution> {
    if !traits.contains_species(species_id) {
        return Err(CorodexError::UnknownSpecies(species_id));
    }

    // Species without an evolution row never evolve.
    let chain = chains
        .position(species_id)
        .unwrap_or_else(|| ChainPosition::single_stage(species_id));

    let plus = if is_titan(species_id) {
        0
    } else {
        tiers.tier_for(&chain)?
    };

    let direct = traits.direct_grants(species_id);
    let resolved = if !direct.is_empty() {
        collect_traits(traits, direct, plus, TraitSource::Direct, true)?
    } else {
        match chains.terminal_of(species_id) {
            Some(terminal) if terminal != species_id && !is_titan(species_id) => {
                let inherited = traits.direct_grants(terminal);
                collect_traits(
                    traits,
                    inherited,
                    plus,
                    TraitSource::Inherited { from: terminal },
                    false,
                )?
            }
            _ => Vec::new(),
        }
    };

    let traits = if resolved.is_empty() {
        TraitList::NoneAvailable
    } else {
        TraitList::Available(resolved)
    };

    Ok(SpeciesResolution {
        species_id,
        chain,
        plus,
        traits,
    })
}

/// Turn grants into resolved traits, keeping one entry per trait name.
///
/// Pinned tiers only apply to the species they were granted to; inherited
/// traits always take the resolving species' tier.
fn collect_traits(
    index: &TraitsIndex,
    grants: &[SpeciesTrait],
    plus: u8,
    source: TraitSource,
    honor_pinned: bool,
) -> Result<Vec<ResolvedTrait>> {
    let mut resolved: Vec<ResolvedTrait> = Vec::with_capacity(grants.len());

    for grant in grants {
        let trait_def = index.traits.get(&grant.trait_id).ok_or_else(|| {
            CorodexError::NotFound(format!(
                "trait {} granted to species {}",
                grant.trait_id, grant.species_id
            ))
        })?;
        let trait_plus = if honor_pinned {
            grant.plus.unwrap_or(plus)
        } else {
            plus
        };

        let entry = ResolvedTrait {
            trait_id: trait_def.id,
            name: trait_def.name.clone(),
            kind: trait_def.kind,
            probability: grant.probability,
            plus: trait_plus,
            description: index.describe(trait_def, trait_plus),
            source,
        };

        // Same name: the more likely grant wins as a whole, in place.
        match resolved.iter_mut().find(|t| t.name == entry.name) {
            Some(existing) if entry.probability > existing.probability => *existing = entry,
            Some(_) => {}
            None => resolved.push(entry),
        }
    }

    Ok(resolved)
}

/// Resolve every known species. Failures stay per species.
pub fn resolve_all(
    chains: &ChainIndex,
    traits: &TraitsIndex,
    tiers: &TierTable,
) -> Vec<(SpeciesId, Result<SpeciesResolution>)> {
    let ids: Vec<SpeciesId> = traits.species_ids().collect();
    ids.par_iter()
        .map(|&id| (id, resolve_species(chains, traits, tiers, id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::build_chains;
    use crate::dataset::fixtures::*;

    struct Fixture {
        chains: ChainIndex,
        traits: TraitsIndex,
        tiers: TierTable,
    }

    impl Fixture {
        fn new(dataset: Dataset) -> Self {
            Self {
                chains: build_chains(&dataset.evolutions).unwrap(),
                traits: TraitsIndex::from_dataset(&dataset),
                tiers: TierTable::default(),
            }
        }

        fn resolve(&self, id: SpeciesId) -> Result<SpeciesResolution> {
            resolve_species(&self.chains, &self.traits, &self.tiers, id)
        }
    }

    fn bears() -> Fixture {
        Fixture::new(Dataset::from_raw(bear_dataset()).unwrap())
    }

    #[test]
    fn test_three_stage_tiers() {
        let fixture = bears();
        assert_eq!(fixture.resolve(1).unwrap().plus, 2);
        assert_eq!(fixture.resolve(2).unwrap().plus, 1);
        assert_eq!(fixture.resolve(3).unwrap().plus, 0);
        assert_eq!(fixture.resolve(4).unwrap().plus, 0);
    }

    #[test]
    fn test_traitless_species_inherit_final_form_traits() {
        let fixture = bears();
        for id in [1, 2] {
            let resolution = fixture.resolve(id).unwrap();
            let traits = resolution.traits.traits();
            assert_eq!(traits.len(), 2);

            let frostbite = resolution.traits.get("Frostbite").unwrap();
            assert_eq!(frostbite.probability, 0.3);
            assert_eq!(frostbite.source, TraitSource::Inherited { from: 3 });
            let fur = resolution.traits.get("Thick Fur").unwrap();
            assert_eq!(fur.probability, 0.2);
        }
    }

    #[test]
    fn test_inherited_traits_use_resolving_species_tier() {
        let fixture = bears();
        let cubzero = fixture.resolve(1).unwrap();
        let frostbite = cubzero.traits.get("Frostbite").unwrap();
        assert_eq!(frostbite.plus, 2);
        assert_eq!(frostbite.description, "Frostbite +2");

        let aroara = fixture.resolve(2).unwrap();
        assert_eq!(aroara.traits.get("Frostbite").unwrap().description, "Frostbite +1");

        // No version row for Thick Fur: base description.
        assert_eq!(
            aroara.traits.get("Thick Fur").unwrap().description,
            "Thick Fur base"
        );
    }

    #[test]
    fn test_direct_traits_never_consult_fallback() {
        let mut raw = bear_dataset();
        raw.species_traits.push(grant(2, 12, 0.5));
        let fixture = Fixture::new(Dataset::from_raw(raw).unwrap());

        let aroara = fixture.resolve(2).unwrap();
        let traits = aroara.traits.traits();
        assert_eq!(traits.len(), 1);
        assert_eq!(traits[0].name, "Sturdy");
        assert_eq!(traits[0].source, TraitSource::Direct);
        assert!(aroara.traits.get("Frostbite").is_none());
    }

    #[test]
    fn test_no_traits_anywhere_is_explicit() {
        let mut raw = bear_dataset();
        raw.species.push(species(5, "Lonely", 3));
        raw.evolutions.push(link(5, None, None));
        let fixture = Fixture::new(Dataset::from_raw(raw).unwrap());

        let lonely = fixture.resolve(5).unwrap();
        assert_eq!(lonely.traits, TraitList::NoneAvailable);
        assert!(!lonely.traits.is_available());
        assert!(lonely.traits.traits().is_empty());
    }

    #[test]
    fn test_unknown_species() {
        let fixture = bears();
        assert!(matches!(
            fixture.resolve(404),
            Err(CorodexError::UnknownSpecies(404))
        ));
    }

    #[test]
    fn test_titan_is_single_stage_tier_zero() {
        let fixture = bears();
        let titan = fixture.resolve(1001).unwrap();
        assert_eq!(titan.plus, 0);
        assert_eq!(titan.chain, ChainPosition::single_stage(1001));
        assert_eq!(titan.traits.traits()[0].source, TraitSource::Direct);

        // Titans stay at tier 0 even when the table has no single-stage row.
        let tiers = TierTable::from_str("[[shapes]]\nlength = 3\ntiers = [2, 1, 0]\n").unwrap();
        let titan = resolve_species(&fixture.chains, &fixture.traits, &tiers, 1001).unwrap();
        assert_eq!(titan.plus, 0);
    }

    #[test]
    fn test_species_without_evolution_row_is_single_stage() {
        let mut raw = bear_dataset();
        raw.species.push(species(6, "Rowless", 3));
        let fixture = Fixture::new(Dataset::from_raw(raw).unwrap());
        let rowless = fixture.resolve(6).unwrap();
        assert_eq!(rowless.chain, ChainPosition::single_stage(6));
        assert_eq!(rowless.plus, 0);
    }

    #[test]
    fn test_unsupported_chain_shape_is_per_species() {
        let mut raw = bear_dataset();
        raw.species.push(species(7, "Bearealis Prime", 1));
        raw.evolutions[2] = link(3, Some(2), Some(7));
        raw.evolutions.push(link(7, Some(3), None));
        let fixture = Fixture::new(Dataset::from_raw(raw).unwrap());

        assert!(matches!(
            fixture.resolve(1),
            Err(CorodexError::UnsupportedChainShape { length: 4, root: 1 })
        ));
        // Other chains are unaffected.
        assert_eq!(fixture.resolve(4).unwrap().plus, 0);

        let outcomes = resolve_all(&fixture.chains, &fixture.traits, &fixture.tiers);
        let failures = outcomes.iter().filter(|(_, r)| r.is_err()).count();
        assert_eq!(failures, 4);
    }

    #[test]
    fn test_pinned_plus_applies_to_direct_grants() {
        let mut raw = bear_dataset();
        raw.species_traits[0].plus = Some(1);
        let fixture = Fixture::new(Dataset::from_raw(raw).unwrap());

        let bearealis = fixture.resolve(3).unwrap();
        let frostbite = bearealis.traits.get("Frostbite").unwrap();
        assert_eq!(frostbite.plus, 1);
        assert_eq!(frostbite.description, "Frostbite +1");

        // The pin belongs to Bearealis, Cubzero still gets its own tier.
        let cubzero = fixture.resolve(1).unwrap();
        assert_eq!(cubzero.traits.get("Frostbite").unwrap().plus, 2);
    }

    #[test]
    fn test_same_trait_name_is_deduplicated() {
        let mut raw = bear_dataset();
        raw.traits.push(Trait {
            id: 20,
            name: "Thick Fur".to_string(),
            kind: TraitKind::Active,
            description: "second".to_string(),
        });
        raw.species_traits.push(grant(3, 20, 0.4));
        let fixture = Fixture::new(Dataset::from_raw(raw).unwrap());

        let bearealis = fixture.resolve(3).unwrap();
        assert_eq!(bearealis.traits.traits().len(), 2);
        let fur = bearealis.traits.get("Thick Fur").unwrap();
        assert_eq!(fur.trait_id, 20);
        assert_eq!(fur.kind, TraitKind::Active);
        assert_eq!(fur.probability, 0.4);
        assert_eq!(fur.description, "second");
        // Grant order is kept.
        assert_eq!(bearealis.traits.traits()[1].name, "Thick Fur");
    }

    #[test]
    fn test_less_likely_duplicate_name_is_dropped() {
        let mut raw = bear_dataset();
        raw.traits.push(passive(20, "Thick Fur"));
        raw.species_traits.push(grant(3, 20, 0.1));
        let fixture = Fixture::new(Dataset::from_raw(raw).unwrap());

        let bearealis = fixture.resolve(3).unwrap();
        let fur = bearealis.traits.get("Thick Fur").unwrap();
        assert_eq!(fur.trait_id, 11);
        assert_eq!(fur.probability, 0.2);
    }

    #[test]
    fn test_near_duplicate_names_stay_distinct() {
        let mut raw = bear_dataset();
        raw.traits.push(passive(21, "Gullible"));
        raw.traits.push(passive(22, "Gullibile"));
        raw.species_traits.push(grant(4, 21, 0.1));
        raw.species_traits.push(grant(4, 22, 0.1));
        let fixture = Fixture::new(Dataset::from_raw(raw).unwrap());

        let toruga = fixture.resolve(4).unwrap();
        assert_eq!(toruga.traits.traits().len(), 3);
    }

    #[test]
    fn test_display_percent_rounds() {
        let fixture = bears();
        let toruga = fixture.resolve(4).unwrap();
        let sturdy = toruga.traits.get("Sturdy").unwrap();
        assert_eq!(sturdy.probability, 0.125);
        assert_eq!(sturdy.display_percent(), 13);
    }

    #[test]
    fn test_resolve_all_is_sorted_and_complete() {
        let fixture = bears();
        let outcomes = resolve_all(&fixture.chains, &fixture.traits, &fixture.tiers);
        let ids: Vec<SpeciesId> = outcomes.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 1001]);
        assert!(outcomes.iter().all(|(_, r)| r.is_ok()));
    }
}
