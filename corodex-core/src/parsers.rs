//! Seed file parsers.
//!
//! Seed data is a directory of CSV files, one per collection. Types are
//! referenced by name in the seed files and turned into ids here.

use crate::dataset::RawDataset;
use crate::error::{CorodexError, Result};
use crate::file_utils::{find_files_with_extension, read_seed_file};
use crate::models::{
    ElementType, EvolutionLink, Skill, SkillEffect, Species, SpeciesId, SpeciesTrait, StatKind,
    Trait, TraitKind, TraitVersion, TypeEffectiveness, TypeId,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

pub const TYPES_FILE: &str = "types.csv";
pub const EFFECTIVENESS_FILE: &str = "type_effectiveness.csv";
pub const SPECIES_FILE: &str = "species.csv";
pub const EVOLUTIONS_FILE: &str = "evolutions.csv";
pub const TRAITS_FILE: &str = "traits.csv";
pub const TRAIT_VERSIONS_FILE: &str = "trait_versions.csv";
pub const SPECIES_TRAITS_FILE: &str = "species_traits.csv";
pub const SKILLS_FILE: &str = "skills.csv";
pub const SKILL_EFFECTS_FILE: &str = "skill_effects.csv";

const KNOWN_FILES: [&str; 9] = [
    TYPES_FILE,
    EFFECTIVENESS_FILE,
    SPECIES_FILE,
    EVOLUTIONS_FILE,
    TRAITS_FILE,
    TRAIT_VERSIONS_FILE,
    SPECIES_TRAITS_FILE,
    SKILLS_FILE,
    SKILL_EFFECTS_FILE,
];

#[derive(Debug, Deserialize)]
struct TypeRecord {
    id: TypeId,
    name: String,
}

#[derive(Debug, Deserialize)]
struct EffectivenessRecord {
    attacking: String,
    defending: String,
    multiplier: f64,
}

#[derive(Debug, Deserialize)]
struct SpeciesRecord {
    id: SpeciesId,
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    sp: i32,
    hp: i32,
    speed: i32,
    defense: i32,
    special_attack: i32,
    special_defense: i32,
}

#[derive(Debug, Deserialize)]
struct EvolutionRecord {
    species_id: SpeciesId,
    previous_id: Option<SpeciesId>,
    next_id: Option<SpeciesId>,
    condition: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TraitRecord {
    id: i32,
    name: String,
    kind: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct TraitVersionRecord {
    trait_id: i32,
    plus: u8,
    description: String,
}

#[derive(Debug, Deserialize)]
struct SpeciesTraitRecord {
    species_id: SpeciesId,
    trait_id: i32,
    probability: f64,
    plus: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct SkillRecord {
    id: i32,
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    power: Option<i32>,
    accuracy: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct SkillEffectRecord {
    skill_id: i32,
    effect: String,
    magnitude: Option<f64>,
    chance: Option<f64>,
    primary: bool,
}

/// Parse CSV text with a header row into records.
pub fn parse_csv<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in reader.deserialize() {
        let record: T = result?;
        records.push(record);
    }
    Ok(records)
}

fn read_csv<T: DeserializeOwned>(dir: &Path, file: &str, required: bool) -> Result<Vec<T>> {
    let path = dir.join(file);
    if !path.exists() {
        if required {
            return Err(CorodexError::NotFound(format!(
                "Required seed file {}",
                path.display()
            )));
        }
        tracing::debug!("Optional seed file {} not present", path.display());
        return Ok(Vec::new());
    }

    let text = read_seed_file(&path)?;
    let records = parse_csv(&text).map_err(|e| {
        CorodexError::Parse(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    tracing::debug!("Read {} rows from {}", records.len(), path.display());
    Ok(records)
}

fn type_lookup(types: &[ElementType]) -> HashMap<&str, TypeId> {
    types.iter().map(|t| (t.name.as_str(), t.id)).collect()
}

fn resolve_type(lookup: &HashMap<&str, TypeId>, name: &str, context: &str) -> Result<TypeId> {
    lookup
        .get(name)
        .copied()
        .ok_or_else(|| CorodexError::NotFound(format!("type '{}' referenced by {}", name, context)))
}

fn species_from_record(record: SpeciesRecord, lookup: &HashMap<&str, TypeId>) -> Result<Species> {
    let type_id = resolve_type(lookup, &record.type_name, &format!("species {}", record.name))?;
    let stats = BTreeMap::from([
        (StatKind::Hp, record.hp),
        (StatKind::Speed, record.speed),
        (StatKind::Defense, record.defense),
        (StatKind::SpecialAttack, record.special_attack),
        (StatKind::SpecialDefense, record.special_defense),
    ]);
    Ok(Species {
        id: record.id,
        name: record.name,
        type_id,
        base_sp: record.sp,
        stats,
    })
}

/// Load every seed file from `dir`.
///
/// `types.csv`, `type_effectiveness.csv`, `species.csv`, `evolutions.csv`,
/// `traits.csv` and `species_traits.csv` are required.
pub fn load_seed_dir(dir: &Path) -> Result<RawDataset> {
    for path in find_files_with_extension(dir, "csv")? {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !KNOWN_FILES.contains(&name) {
            tracing::warn!("Ignoring unrecognized seed file {}", path.display());
        }
    }

    let types: Vec<ElementType> = read_csv::<TypeRecord>(dir, TYPES_FILE, true)?
        .into_iter()
        .map(|r| ElementType { id: r.id, name: r.name })
        .collect();
    let lookup = type_lookup(&types);

    let effectiveness = read_csv::<EffectivenessRecord>(dir, EFFECTIVENESS_FILE, true)?
        .into_iter()
        .map(|r| -> Result<TypeEffectiveness> {
            let context = format!("effectiveness {} -> {}", r.attacking, r.defending);
            Ok(TypeEffectiveness {
                attacking: resolve_type(&lookup, &r.attacking, &context)?,
                defending: resolve_type(&lookup, &r.defending, &context)?,
                multiplier: r.multiplier,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let species = read_csv::<SpeciesRecord>(dir, SPECIES_FILE, true)?
        .into_iter()
        .map(|r| species_from_record(r, &lookup))
        .collect::<Result<Vec<_>>>()?;

    let evolutions = read_csv::<EvolutionRecord>(dir, EVOLUTIONS_FILE, true)?
        .into_iter()
        .map(|r| EvolutionLink {
            species_id: r.species_id,
            previous: r.previous_id,
            next: r.next_id,
            condition: r.condition.filter(|c| !c.is_empty()),
        })
        .collect();

    let traits = read_csv::<TraitRecord>(dir, TRAITS_FILE, true)?
        .into_iter()
        .map(|r| -> Result<Trait> {
            Ok(Trait {
                id: r.id,
                name: r.name,
                kind: r.kind.parse::<TraitKind>()?,
                description: r.description,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let trait_versions = read_csv::<TraitVersionRecord>(dir, TRAIT_VERSIONS_FILE, false)?
        .into_iter()
        .map(|r| TraitVersion {
            trait_id: r.trait_id,
            plus: r.plus,
            description: r.description,
        })
        .collect();

    let species_traits = read_csv::<SpeciesTraitRecord>(dir, SPECIES_TRAITS_FILE, true)?
        .into_iter()
        .map(|r| SpeciesTrait {
            species_id: r.species_id,
            trait_id: r.trait_id,
            probability: r.probability,
            plus: r.plus,
        })
        .collect();

    let skills = read_csv::<SkillRecord>(dir, SKILLS_FILE, false)?
        .into_iter()
        .map(|r| -> Result<Skill> {
            Ok(Skill {
                type_id: resolve_type(&lookup, &r.type_name, &format!("skill {}", r.name))?,
                id: r.id,
                name: r.name,
                power: r.power,
                accuracy: r.accuracy,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let skill_effects = read_csv::<SkillEffectRecord>(dir, SKILL_EFFECTS_FILE, false)?
        .into_iter()
        .map(|r| SkillEffect {
            skill_id: r.skill_id,
            effect: r.effect,
            magnitude: r.magnitude,
            chance: r.chance,
            is_primary: r.primary,
        })
        .collect();

    tracing::info!(
        "Loaded seed data from {}: {} types, {} species, {} traits, {} skills",
        dir.display(),
        types.len(),
        species.len(),
        traits.len(),
        skills.len()
    );

    Ok(RawDataset {
        types,
        species,
        effectiveness,
        evolutions,
        traits,
        trait_versions,
        species_traits,
        skills,
        skill_effects,
    })
}
