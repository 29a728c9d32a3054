use crate::dataset::{Dataset, RawDataset};
use crate::error::{CorodexError, Result};
use crate::models::{
    ElementType, EvolutionLink, Skill, SkillEffect, SkillId, Species, SpeciesId, SpeciesTrait,
    StatKind, Trait, TraitKind, TraitVersion, TypeEffectiveness, TypeId,
};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};
use std::collections::{BTreeMap, HashMap};

const SCHEMA_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS types (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS type_effectiveness (
        attacking_type_id INTEGER NOT NULL,
        defending_type_id INTEGER NOT NULL,
        multiplier REAL NOT NULL,
        PRIMARY KEY (attacking_type_id, defending_type_id),
        FOREIGN KEY (attacking_type_id) REFERENCES types(id) ON DELETE CASCADE,
        FOREIGN KEY (defending_type_id) REFERENCES types(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS species (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        type_id INTEGER NOT NULL,
        base_sp INTEGER NOT NULL,
        FOREIGN KEY (type_id) REFERENCES types(id)
    );

    CREATE TABLE IF NOT EXISTS species_stats (
        species_id INTEGER NOT NULL,
        stat TEXT NOT NULL,
        value INTEGER NOT NULL,
        PRIMARY KEY (species_id, stat),
        FOREIGN KEY (species_id) REFERENCES species(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS evolutions (
        species_id INTEGER PRIMARY KEY,
        previous_id INTEGER,
        next_id INTEGER,
        condition TEXT,
        FOREIGN KEY (species_id) REFERENCES species(id) ON DELETE CASCADE,
        FOREIGN KEY (previous_id) REFERENCES species(id),
        FOREIGN KEY (next_id) REFERENCES species(id)
    );

    CREATE TABLE IF NOT EXISTS traits (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('Passive', 'Active')),
        description TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS trait_versions (
        trait_id INTEGER NOT NULL,
        plus INTEGER NOT NULL CHECK(plus >= 0),
        description TEXT NOT NULL,
        PRIMARY KEY (trait_id, plus),
        FOREIGN KEY (trait_id) REFERENCES traits(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS species_traits (
        species_id INTEGER NOT NULL,
        trait_id INTEGER NOT NULL,
        probability REAL NOT NULL CHECK(probability > 0 AND probability <= 1),
        plus INTEGER,
        PRIMARY KEY (species_id, trait_id),
        FOREIGN KEY (species_id) REFERENCES species(id) ON DELETE CASCADE,
        FOREIGN KEY (trait_id) REFERENCES traits(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS skills (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        type_id INTEGER NOT NULL,
        power INTEGER,
        accuracy INTEGER,
        FOREIGN KEY (type_id) REFERENCES types(id)
    );

    CREATE TABLE IF NOT EXISTS skill_effects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        skill_id INTEGER NOT NULL,
        effect TEXT NOT NULL,
        magnitude REAL,
        chance REAL,
        is_primary INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (skill_id) REFERENCES skills(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_species_type_id ON species(type_id);
    CREATE INDEX IF NOT EXISTS idx_species_traits_trait_id ON species_traits(trait_id);
    CREATE INDEX IF NOT EXISTS idx_skills_type_id ON skills(type_id);
    CREATE INDEX IF NOT EXISTS idx_skill_effects_skill_id ON skill_effects(skill_id);
"#;

/// Tables in insertion order; cleared in reverse.
const TABLES: [&str; 10] = [
    "types",
    "type_effectiveness",
    "species",
    "species_stats",
    "evolutions",
    "traits",
    "trait_versions",
    "species_traits",
    "skills",
    "skill_effects",
];

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(SCHEMA_V1)])
}

pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn new(path: &std::path::Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        });
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self { pool };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.connection()?;
        migrations().to_latest(&mut conn)?;
        Ok(())
    }

    /// Replace all stored reference data with `dataset` in a single transaction.
    /// Returns the number of rows written.
    pub fn replace_dataset(&self, dataset: &Dataset) -> Result<usize> {
        dataset.validate()?;

        let mut conn = self.connection()?;
        let tx = conn.transaction()?;

        for table in TABLES.iter().rev() {
            tx.execute(&format!("DELETE FROM {}", table), ())?;
        }

        let mut inserted = 0;
        {
            let mut stmt = tx.prepare("INSERT INTO types (id, name) VALUES (?1, ?2)")?;
            for element in dataset.types.values() {
                stmt.execute(params![element.id, element.name])?;
                inserted += 1;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO type_effectiveness (attacking_type_id, defending_type_id, multiplier)
                 VALUES (?1, ?2, ?3)",
            )?;
            for row in &dataset.effectiveness {
                stmt.execute(params![row.attacking, row.defending, row.multiplier])?;
                inserted += 1;
            }

            let mut species_stmt = tx.prepare(
                "INSERT INTO species (id, name, type_id, base_sp) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut stat_stmt = tx.prepare(
                "INSERT INTO species_stats (species_id, stat, value) VALUES (?1, ?2, ?3)",
            )?;
            for species in dataset.species.values() {
                species_stmt.execute(params![
                    species.id,
                    species.name,
                    species.type_id,
                    species.base_sp
                ])?;
                inserted += 1;
                for (kind, value) in &species.stats {
                    stat_stmt.execute(params![species.id, kind.as_str(), value])?;
                    inserted += 1;
                }
            }

            let mut stmt = tx.prepare(
                "INSERT INTO evolutions (species_id, previous_id, next_id, condition)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for link in &dataset.evolutions {
                stmt.execute(params![link.species_id, link.previous, link.next, link.condition])?;
                inserted += 1;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO traits (id, name, kind, description) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for trait_def in dataset.traits.values() {
                stmt.execute(params![
                    trait_def.id,
                    trait_def.name,
                    trait_def.kind.as_str(),
                    trait_def.description
                ])?;
                inserted += 1;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO trait_versions (trait_id, plus, description) VALUES (?1, ?2, ?3)",
            )?;
            for version in &dataset.trait_versions {
                stmt.execute(params![version.trait_id, version.plus, version.description])?;
                inserted += 1;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO species_traits (species_id, trait_id, probability, plus)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for grant in &dataset.species_traits {
                stmt.execute(params![
                    grant.species_id,
                    grant.trait_id,
                    grant.probability,
                    grant.plus
                ])?;
                inserted += 1;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO skills (id, name, type_id, power, accuracy) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for skill in dataset.skills.values() {
                stmt.execute(params![
                    skill.id,
                    skill.name,
                    skill.type_id,
                    skill.power,
                    skill.accuracy
                ])?;
                inserted += 1;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO skill_effects (skill_id, effect, magnitude, chance, is_primary)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for effect in &dataset.skill_effects {
                stmt.execute(params![
                    effect.skill_id,
                    effect.effect,
                    effect.magnitude,
                    effect.chance,
                    effect.is_primary
                ])?;
                inserted += 1;
            }
        }

        tx.commit()?;
        tracing::info!("Stored {} reference rows", inserted);
        Ok(inserted)
    }

    /// Read every table back into a validated [`Dataset`].
    pub fn load_dataset(&self) -> Result<Dataset> {
        let conn = self.connection()?;

        let types = conn
            .prepare("SELECT id, name FROM types ORDER BY id")?
            .query_map([], |row| {
                Ok(ElementType {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let effectiveness = conn
            .prepare(
                "SELECT attacking_type_id, defending_type_id, multiplier
                 FROM type_effectiveness ORDER BY rowid",
            )?
            .query_map([], |row| {
                Ok(TypeEffectiveness {
                    attacking: row.get(0)?,
                    defending: row.get(1)?,
                    multiplier: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stats = load_all_stats(&conn)?;
        let species = conn
            .prepare("SELECT id, name, type_id, base_sp FROM species ORDER BY id")?
            .query_map([], species_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|mut s| {
                s.stats = stats.remove(&s.id).unwrap_or_default();
                s
            })
            .collect();

        let evolutions = conn
            .prepare(
                "SELECT species_id, previous_id, next_id, condition FROM evolutions ORDER BY species_id",
            )?
            .query_map([], |row| {
                Ok(EvolutionLink {
                    species_id: row.get(0)?,
                    previous: row.get(1)?,
                    next: row.get(2)?,
                    condition: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let trait_rows = conn
            .prepare("SELECT id, name, kind, description FROM traits ORDER BY id")?
            .query_map([], |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let traits = trait_rows
            .into_iter()
            .map(|(id, name, kind, description)| -> Result<Trait> {
                Ok(Trait {
                    id,
                    name,
                    kind: kind.parse::<TraitKind>()?,
                    description,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let trait_versions = conn
            .prepare("SELECT trait_id, plus, description FROM trait_versions ORDER BY rowid")?
            .query_map([], |row| {
                Ok(TraitVersion {
                    trait_id: row.get(0)?,
                    plus: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let species_traits = conn
            .prepare(
                "SELECT species_id, trait_id, probability, plus
                 FROM species_traits ORDER BY rowid",
            )?
            .query_map([], |row| {
                Ok(SpeciesTrait {
                    species_id: row.get(0)?,
                    trait_id: row.get(1)?,
                    probability: row.get(2)?,
                    plus: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let skills = conn
            .prepare("SELECT id, name, type_id, power, accuracy FROM skills ORDER BY id")?
            .query_map([], skill_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let skill_effects = conn
            .prepare(
                "SELECT skill_id, effect, magnitude, chance, is_primary
                 FROM skill_effects ORDER BY id",
            )?
            .query_map([], skill_effect_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Dataset::from_raw(RawDataset {
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

    /// Get a species with its stats by id.
    pub fn get_species(&self, species_id: SpeciesId) -> Result<Option<Species>> {
        let conn = self.connection()?;
        let species = conn
            .query_row(
                "SELECT id, name, type_id, base_sp FROM species WHERE id = ?",
                params![species_id],
                species_from_row,
            )
            .optional()?;

        match species {
            Some(mut species) => {
                species.stats = load_stats(&conn, species.id)?;
                Ok(Some(species))
            }
            None => Ok(None),
        }
    }

    /// Get a species by exact name.
    pub fn get_species_by_name(&self, name: &str) -> Result<Option<Species>> {
        let conn = self.connection()?;
        let species_id: Option<SpeciesId> = conn
            .query_row(
                "SELECT id FROM species WHERE name = ?",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        match species_id {
            Some(id) => self.get_species(id),
            None => Ok(None),
        }
    }

    pub fn type_name(&self, type_id: TypeId) -> Result<Option<String>> {
        let conn = self.connection()?;
        let name = conn
            .query_row(
                "SELECT name FROM types WHERE id = ?",
                params![type_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Species of the named type, ordered by id.
    pub fn species_of_type(&self, type_name: &str) -> Result<Vec<Species>> {
        let conn = self.connection()?;
        let mut species = conn
            .prepare(
                "SELECT s.id, s.name, s.type_id, s.base_sp
                 FROM species s
                 JOIN types t ON t.id = s.type_id
                 WHERE t.name = ?
                 ORDER BY s.id",
            )?
            .query_map(params![type_name], species_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for s in &mut species {
            s.stats = load_stats(&conn, s.id)?;
        }
        Ok(species)
    }

    /// Skills, optionally restricted to one type name, ordered by id.
    pub fn skills(&self, type_name: Option<&str>) -> Result<Vec<Skill>> {
        let conn = self.connection()?;
        let skills = match type_name {
            Some(name) => conn
                .prepare(
                    "SELECT k.id, k.name, k.type_id, k.power, k.accuracy
                     FROM skills k
                     JOIN types t ON t.id = k.type_id
                     WHERE t.name = ?
                     ORDER BY k.id",
                )?
                .query_map(params![name], skill_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => conn
                .prepare("SELECT id, name, type_id, power, accuracy FROM skills ORDER BY id")?
                .query_map([], skill_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(skills)
    }

    pub fn skill_effects(&self, skill_id: SkillId) -> Result<Vec<SkillEffect>> {
        let conn = self.connection()?;
        let effects = conn
            .prepare(
                "SELECT skill_id, effect, magnitude, chance, is_primary
                 FROM skill_effects WHERE skill_id = ? ORDER BY id",
            )?
            .query_map(params![skill_id], skill_effect_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(effects)
    }

    /// Row count per table.
    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        let conn = self.connection()?;
        TABLES
            .iter()
            .map(|&table| -> Result<(&'static str, i64)> {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;
                Ok((table, count))
            })
            .collect()
    }
}

fn species_from_row(row: &Row<'_>) -> rusqlite::Result<Species> {
    Ok(Species {
        id: row.get(0)?,
        name: row.get(1)?,
        type_id: row.get(2)?,
        base_sp: row.get(3)?,
        stats: BTreeMap::new(),
    })
}

fn skill_from_row(row: &Row<'_>) -> rusqlite::Result<Skill> {
    Ok(Skill {
        id: row.get(0)?,
        name: row.get(1)?,
        type_id: row.get(2)?,
        power: row.get(3)?,
        accuracy: row.get(4)?,
    })
}

fn skill_effect_from_row(row: &Row<'_>) -> rusqlite::Result<SkillEffect> {
    Ok(SkillEffect {
        skill_id: row.get(0)?,
        effect: row.get(1)?,
        magnitude: row.get(2)?,
        chance: row.get(3)?,
        is_primary: row.get(4)?,
    })
}

fn load_stats(conn: &Connection, species_id: SpeciesId) -> Result<BTreeMap<StatKind, i32>> {
    let rows = conn
        .prepare("SELECT stat, value FROM species_stats WHERE species_id = ?")?
        .query_map(params![species_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(stat, value)| -> Result<(StatKind, i32)> { Ok((stat.parse::<StatKind>()?, value)) })
        .collect()
}

fn load_all_stats(conn: &Connection) -> Result<HashMap<SpeciesId, BTreeMap<StatKind, i32>>> {
    let rows = conn
        .prepare("SELECT species_id, stat, value FROM species_stats")?
        .query_map([], |row| {
            Ok((
                row.get::<_, SpeciesId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut stats: HashMap<SpeciesId, BTreeMap<StatKind, i32>> = HashMap::new();
    for (species_id, stat, value) in rows {
        let kind = stat.parse::<StatKind>().map_err(|_| {
            CorodexError::Validation(format!("Species {} has unknown stat '{}'", species_id, stat))
        })?;
        stats.entry(species_id).or_default().insert(kind, value);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::bear_dataset;

    fn seeded() -> (tempfile::TempDir, Database, Dataset) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("corodex.sqlite")).unwrap();
        let dataset = Dataset::from_raw(bear_dataset()).unwrap();
        db.replace_dataset(&dataset).unwrap();
        (dir, db, dataset)
    }

    #[test]
    fn test_migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn test_dataset_round_trips_through_database() {
        let (_dir, db, dataset) = seeded();
        let loaded = db.load_dataset().unwrap();
        assert_eq!(loaded, dataset);
    }

    #[test]
    fn test_replace_dataset_is_repeatable() {
        let (_dir, db, dataset) = seeded();
        db.replace_dataset(&dataset).unwrap();
        let counts: HashMap<_, _> = db.table_counts().unwrap().into_iter().collect();
        assert_eq!(counts["species"], 5);
        assert_eq!(counts["species_stats"], 25);
        assert_eq!(counts["evolutions"], 5);
        assert_eq!(counts["species_traits"], 4);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let (dir, db, _) = seeded();
        drop(db);
        let reopened = Database::new(&dir.path().join("corodex.sqlite")).unwrap();
        assert!(reopened.get_species(3).unwrap().is_some());
    }

    #[test]
    fn test_species_queries() {
        let (_dir, db, _) = seeded();

        let aroara = db.get_species(2).unwrap().unwrap();
        assert_eq!(aroara.name, "Aroara");
        assert_eq!(aroara.stat(StatKind::Speed), Some(10));
        assert!(db.get_species(404).unwrap().is_none());

        let bear = db.get_species_by_name("Bearealis").unwrap().unwrap();
        assert_eq!(bear.id, 3);
        assert!(db.get_species_by_name("bearealis").unwrap().is_none());

        let ice: Vec<_> = db.species_of_type("Ice").unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ice, vec![1, 2, 3]);
    }

    #[test]
    fn test_type_name_lookup() {
        let (_dir, db, _) = seeded();
        let bear = db.get_species(3).unwrap().unwrap();
        assert_eq!(db.type_name(bear.type_id).unwrap().as_deref(), Some("Ice"));
        assert_eq!(db.type_name(99).unwrap(), None);
    }

    #[test]
    fn test_skill_queries() {
        let (_dir, db, _) = seeded();
        assert_eq!(db.skills(None).unwrap().len(), 1);
        assert_eq!(db.skills(Some("Fire")).unwrap().len(), 1);
        assert!(db.skills(Some("Ice")).unwrap().is_empty());

        let effects = db.skill_effects(100).unwrap();
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].effect, "burn");
        assert!(!effects[0].is_primary);
    }

    #[test]
    fn test_invalid_dataset_is_not_stored() {
        let (_dir, db, mut dataset) = seeded();
        dataset.species_traits[0].probability = 2.0;
        assert!(db.replace_dataset(&dataset).is_err());
        // Previous contents survive.
        assert_eq!(db.load_dataset().unwrap().species_traits[0].probability, 0.3);
    }
}
