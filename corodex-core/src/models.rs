//! Data models for the Coromon reference data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CorodexError;

pub type SpeciesId = i32;
pub type TypeId = i32;
pub type TraitId = i32;
pub type SkillId = i32;

/// Species ids from this value upwards are Titans (bonus species that never evolve).
pub const TITAN_ID_FLOOR: SpeciesId = 1000;

pub fn is_titan(species_id: SpeciesId) -> bool {
    species_id >= TITAN_ID_FLOOR
}

/// Base stat kinds carried by every species besides SP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Hp,
    Speed,
    Defense,
    SpecialAttack,
    SpecialDefense,
}

impl StatKind {
    pub const ALL: [StatKind; 5] = [
        StatKind::Hp,
        StatKind::Speed,
        StatKind::Defense,
        StatKind::SpecialAttack,
        StatKind::SpecialDefense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Hp => "hp",
            StatKind::Speed => "speed",
            StatKind::Defense => "defense",
            StatKind::SpecialAttack => "special_attack",
            StatKind::SpecialDefense => "special_defense",
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatKind {
    type Err = CorodexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CorodexError::Parse(format!("Unknown stat kind: {}", s)))
    }
}

/// A creature species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: SpeciesId,
    pub name: String,
    pub type_id: TypeId,
    pub base_sp: i32,
    pub stats: BTreeMap<StatKind, i32>,
}

impl Species {
    pub fn stat(&self, kind: StatKind) -> Option<i32> {
        self.stats.get(&kind).copied()
    }

    pub fn is_titan(&self) -> bool {
        is_titan(self.id)
    }
}

/// Elemental type, e.g. "Fire" or "Water".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementType {
    pub id: TypeId,
    pub name: String,
}

/// Damage multiplier for an (attacking, defending) type pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeEffectiveness {
    pub attacking: TypeId,
    pub defending: TypeId,
    pub multiplier: f64,
}

/// One evolution row per species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionLink {
    pub species_id: SpeciesId,
    pub previous: Option<SpeciesId>,
    pub next: Option<SpeciesId>,
    pub condition: Option<String>,
}

impl EvolutionLink {
    pub fn single(species_id: SpeciesId) -> Self {
        Self {
            species_id,
            previous: None,
            next: None,
            condition: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraitKind {
    Passive,
    Active,
}

impl TraitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraitKind::Passive => "Passive",
            TraitKind::Active => "Active",
        }
    }
}

impl FromStr for TraitKind {
    type Err = CorodexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Passive" => Ok(TraitKind::Passive),
            "Active" => Ok(TraitKind::Active),
            other => Err(CorodexError::Parse(format!("Unknown trait kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trait {
    pub id: TraitId,
    pub name: String,
    pub kind: TraitKind,
    pub description: String,
}

/// Description of a trait at one "plus" tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitVersion {
    pub trait_id: TraitId,
    pub plus: u8,
    pub description: String,
}

/// A trait a species may manifest, with its probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesTrait {
    pub species_id: SpeciesId,
    pub trait_id: TraitId,
    pub probability: f64,
    /// Pinned tier for this grant; the chain-derived tier applies when absent.
    pub plus: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
    pub type_id: TypeId,
    pub power: Option<i32>,
    pub accuracy: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEffect {
    pub skill_id: SkillId,
    pub effect: String,
    pub magnitude: Option<f64>,
    pub chance: Option<f64>,
    pub is_primary: bool,
}
