//! Per-species reports built from a loaded dataset.
//!
//! The report combines the evolution line, tier and effective traits of
//! every species. Species that fail to resolve are listed with their error
//! instead of aborting the whole report.

use crate::chains::{ChainIndex, EvolutionLine, build_chains};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::models::SpeciesId;
use crate::resolver::{SpeciesResolution, TraitList, TraitsIndex, resolve_all};
use crate::tiers::TierTable;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesReport {
    pub species_id: SpeciesId,
    pub name: String,
    pub type_name: String,
    pub evolution_line: Vec<String>,
    pub position: usize,
    pub chain_length: usize,
    pub plus: u8,
    pub traits: TraitList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionFailure {
    pub species_id: SpeciesId,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub species: Vec<SpeciesReport>,
    pub failures: Vec<ResolutionFailure>,
}

/// Everything derived from a dataset that queries need.
#[derive(Debug, Clone)]
pub struct Resolver {
    pub chains: ChainIndex,
    pub traits: TraitsIndex,
    pub tiers: TierTable,
}

impl Resolver {
    /// Build the chain index once. Fails if the evolution rows are malformed.
    pub fn new(dataset: &Dataset, tiers: TierTable) -> Result<Self> {
        let chains = build_chains(&dataset.evolutions)?;
        for chain in tiers.unsupported_chains(&chains) {
            tracing::warn!(
                "Chain rooted at species {} has {} stages and no tier table entry",
                chain.root,
                chain.len()
            );
        }
        Ok(Self {
            chains,
            traits: TraitsIndex::from_dataset(dataset),
            tiers,
        })
    }

    pub fn resolve(&self, species_id: SpeciesId) -> Result<SpeciesResolution> {
        crate::resolver::resolve_species(&self.chains, &self.traits, &self.tiers, species_id)
    }

    pub fn evolution_lines(&self, dataset: &Dataset) -> Result<Vec<EvolutionLine>> {
        self.chains.evolution_lines(&dataset.species)
    }

    pub fn report(&self, dataset: &Dataset) -> Report {
        let mut report = Report::default();

        for (species_id, outcome) in resolve_all(&self.chains, &self.traits, &self.tiers) {
            let name = dataset
                .species
                .get(&species_id)
                .map(|s| s.name.clone())
                .unwrap_or_default();

            let row = outcome.and_then(|resolution| {
                let line = match self.chains.position(species_id) {
                    Some(_) => self.chains.evolution_line(species_id, &dataset.species)?.names,
                    None => vec![name.clone()],
                };
                let type_name = dataset
                    .species
                    .get(&species_id)
                    .and_then(|s| dataset.type_name(s.type_id))
                    .unwrap_or_default()
                    .to_string();
                Ok(SpeciesReport {
                    species_id,
                    name: name.clone(),
                    type_name,
                    evolution_line: line,
                    position: resolution.chain.position,
                    chain_length: resolution.chain.length,
                    plus: resolution.plus,
                    traits: resolution.traits,
                })
            });

            match row {
                Ok(row) => report.species.push(row),
                Err(e) => {
                    tracing::warn!("Could not resolve species {} ({}): {}", species_id, name, e);
                    report.failures.push(ResolutionFailure {
                        species_id,
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}
