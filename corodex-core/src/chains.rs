//! Evolution chain construction.
//!
//! Evolution rows are loaded into an id-indexed map and every chain is walked
//! from its root along `next` pointers. Each walk is bounded by the number of
//! species not yet visited, so corrupted rows surface as
//! [`CorodexError::MalformedChain`] instead of an endless loop.

use crate::error::{CorodexError, Result};
use crate::models::{EvolutionLink, Species, SpeciesId, TITAN_ID_FLOOR, is_titan};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Where a species sits inside its evolution chain. Positions are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPosition {
    pub root: SpeciesId,
    pub position: usize,
    pub length: usize,
}

impl ChainPosition {
    /// Position and length of a species that never evolves.
    pub fn single_stage(species_id: SpeciesId) -> Self {
        Self {
            root: species_id,
            position: 1,
            length: 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.position == self.length
    }
}

/// A maximal linear run of species, ordered from base form to final form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub root: SpeciesId,
    pub members: Vec<SpeciesId>,
}

impl Chain {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Final evolution of the chain.
    pub fn terminal(&self) -> SpeciesId {
        self.members.last().copied().unwrap_or(self.root)
    }
}

/// The evolution line of one species, with member names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionLine {
    pub species_id: SpeciesId,
    pub root: SpeciesId,
    pub position: usize,
    pub length: usize,
    pub names: Vec<String>,
}

/// All chains plus a species -> (chain, position) lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainIndex {
    chains: Vec<Chain>,
    slots: HashMap<SpeciesId, (usize, usize)>,
}

impl ChainIndex {
    fn push(&mut self, chain: Chain) {
        let chain_idx = self.chains.len();
        for (offset, &species_id) in chain.members.iter().enumerate() {
            self.slots.insert(species_id, (chain_idx, offset + 1));
        }
        self.chains.push(chain);
    }

    /// Chains ordered by root species id.
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// Number of species assigned to a chain.
    pub fn species_count(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, species_id: SpeciesId) -> bool {
        self.slots.contains_key(&species_id)
    }

    pub fn chain_of(&self, species_id: SpeciesId) -> Option<&Chain> {
        self.slots
            .get(&species_id)
            .map(|&(chain_idx, _)| &self.chains[chain_idx])
    }

    pub fn position(&self, species_id: SpeciesId) -> Option<ChainPosition> {
        self.slots.get(&species_id).map(|&(chain_idx, position)| {
            let chain = &self.chains[chain_idx];
            ChainPosition {
                root: chain.root,
                position,
                length: chain.len(),
            }
        })
    }

    /// Final evolution of the chain containing `species_id`.
    pub fn terminal_of(&self, species_id: SpeciesId) -> Option<SpeciesId> {
        self.chain_of(species_id).map(Chain::terminal)
    }

    /// Evolution line for one species, naming every member of its chain.
    pub fn evolution_line(
        &self,
        species_id: SpeciesId,
        species: &BTreeMap<SpeciesId, Species>,
    ) -> Result<EvolutionLine> {
        let (chain, position) = match (self.chain_of(species_id), self.position(species_id)) {
            (Some(chain), Some(position)) => (chain, position),
            _ => return Err(CorodexError::UnknownSpecies(species_id)),
        };

        let names = chain
            .members
            .iter()
            .map(|id| {
                species
                    .get(id)
                    .map(|s| s.name.clone())
                    .ok_or(CorodexError::UnknownSpecies(*id))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(EvolutionLine {
            species_id,
            root: position.root,
            position: position.position,
            length: position.length,
            names,
        })
    }

    /// Evolution lines for every chained species, in chain order.
    pub fn evolution_lines(
        &self,
        species: &BTreeMap<SpeciesId, Species>,
    ) -> Result<Vec<EvolutionLine>> {
        self.chains
            .iter()
            .flat_map(|chain| chain.members.iter())
            .map(|&id| self.evolution_line(id, species))
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Node {
    previous: Option<SpeciesId>,
    next: Option<SpeciesId>,
}

/// Partition species into evolution chains.
///
/// All-or-nothing: any cycle, branch or contradictory pair of rows fails the
/// whole build and no index is returned.
pub fn build_chains(links: &[EvolutionLink]) -> Result<ChainIndex> {
    let nodes = link_nodes(links)?;

    let mut index = ChainIndex::default();
    let mut visited = BTreeSet::new();
    let roots: Vec<SpeciesId> = nodes
        .iter()
        .filter(|(_, node)| node.previous.is_none())
        .map(|(&id, _)| id)
        .collect();

    for root in roots {
        let chain = walk_chain(root, &nodes, &mut visited)?;
        index.push(chain);
    }

    // Anything left over sits on a loop that has no root.
    if visited.len() != nodes.len() {
        let stranded: Vec<SpeciesId> = nodes
            .keys()
            .filter(|id| !visited.contains(*id))
            .copied()
            .collect();
        return Err(CorodexError::malformed("evolution cycle without a base form", stranded));
    }

    tracing::debug!(
        "Built {} evolution chains covering {} species",
        index.chains.len(),
        index.slots.len()
    );
    Ok(index)
}

fn walk_chain(
    root: SpeciesId,
    nodes: &BTreeMap<SpeciesId, Node>,
    visited: &mut BTreeSet<SpeciesId>,
) -> Result<Chain> {
    let bound = nodes.len() - visited.len();
    let mut members = Vec::new();
    let mut current = Some(root);

    while let Some(species_id) = current {
        if members.len() >= bound || !visited.insert(species_id) {
            members.push(species_id);
            return Err(CorodexError::malformed("evolution cycle", members));
        }
        members.push(species_id);
        current = nodes.get(&species_id).and_then(|node| node.next);
    }

    Ok(Chain { root, members })
}

/// Index the rows by species and check that both ends of every edge agree.
fn link_nodes(links: &[EvolutionLink]) -> Result<BTreeMap<SpeciesId, Node>> {
    let mut nodes: BTreeMap<SpeciesId, Node> = BTreeMap::new();

    for link in links {
        let node = Node {
            previous: link.previous,
            next: link.next,
        };
        if nodes.insert(link.species_id, node).is_some() {
            return Err(CorodexError::malformed(
                "duplicate evolution row",
                vec![link.species_id],
            ));
        }
    }

    for link in links {
        if let Some(next) = link.next {
            connect(&mut nodes, link.species_id, next)?;
        }
        if let Some(previous) = link.previous {
            connect(&mut nodes, previous, link.species_id)?;
        }
    }

    Ok(nodes)
}

fn connect(nodes: &mut BTreeMap<SpeciesId, Node>, from: SpeciesId, to: SpeciesId) -> Result<()> {
    if from == to {
        return Err(CorodexError::malformed("species evolves into itself", vec![from]));
    }
    if is_titan(from) || is_titan(to) {
        return Err(CorodexError::malformed(
            format!(
                "titan species (id >= {}) cannot be part of an evolution",
                TITAN_ID_FLOOR
            ),
            vec![from, to],
        ));
    }

    let from_node = nodes.entry(from).or_default();
    match from_node.next {
        None => from_node.next = Some(to),
        Some(existing) if existing == to => {}
        Some(existing) => {
            return Err(CorodexError::malformed(
                "species has two successors",
                vec![from, existing, to],
            ));
        }
    }

    let to_node = nodes.entry(to).or_default();
    match to_node.previous {
        None => to_node.previous = Some(from),
        Some(existing) if existing == from => {}
        Some(existing) => {
            return Err(CorodexError::malformed(
                "species has two predecessors",
                vec![to, existing, from],
            ));
        }
    }

    Ok(())
}
