//! Trait tier ("plus") table.
//!
//! The table maps a chain length to the tier of each position in the chain.
//! It can be replaced by a TOML file, for example:
//! ```toml
//! [[shapes]]
//! length = 3
//! tiers = [2, 1, 0]
//! ```

use crate::chains::{Chain, ChainIndex, ChainPosition};
use crate::error::{CorodexError, Result};
use crate::models::SpeciesId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Tiers for every position of a chain of one length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierShape {
    pub length: usize,
    pub tiers: Vec<u8>,
}

/// On-disk form of the tier table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierTableConfig {
    #[serde(default)]
    pub shapes: Vec<TierShape>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    shapes: BTreeMap<usize, Vec<u8>>,
}

impl Default for TierTable {
    fn default() -> Self {
        let shapes = BTreeMap::from([(1, vec![0]), (2, vec![2, 0]), (3, vec![2, 1, 0])]);
        Self { shapes }
    }
}

impl TierTable {
    pub fn from_shapes(shapes: Vec<TierShape>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for shape in shapes {
            if shape.length == 0 {
                return Err(CorodexError::Config(
                    "Tier shape length must be at least 1".to_string(),
                ));
            }
            if shape.tiers.len() != shape.length {
                return Err(CorodexError::Config(format!(
                    "Tier shape for length {} lists {} tiers",
                    shape.length,
                    shape.tiers.len()
                )));
            }
            if table.insert(shape.length, shape.tiers).is_some() {
                return Err(CorodexError::Config(format!(
                    "Tier shape for length {} is defined twice",
                    shape.length
                )));
            }
        }
        Ok(Self { shapes: table })
    }

    /// Load a tier table from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CorodexError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read tier table from {:?}: {}", path, e),
            ))
        })?;

        Self::from_str(&content)
    }

    /// Parse a tier table from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: TierTableConfig = toml::from_str(content).map_err(|e| {
            CorodexError::Config(format!("Failed to parse tier table TOML: {}", e))
        })?;
        Self::from_shapes(config.shapes)
    }

    pub fn to_config(&self) -> TierTableConfig {
        TierTableConfig {
            shapes: self
                .shapes
                .iter()
                .map(|(&length, tiers)| TierShape {
                    length,
                    tiers: tiers.clone(),
                })
                .collect(),
        }
    }

    /// Chain lengths the table knows about.
    pub fn lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.shapes.keys().copied()
    }

    /// Tier for a 1-based `position` in a chain of `length` rooted at `root`.
    pub fn tier(&self, length: usize, position: usize, root: SpeciesId) -> Result<u8> {
        self.shapes
            .get(&length)
            .and_then(|tiers| position.checked_sub(1).and_then(|idx| tiers.get(idx)))
            .copied()
            .ok_or(CorodexError::UnsupportedChainShape { length, root })
    }

    pub fn tier_for(&self, position: &ChainPosition) -> Result<u8> {
        self.tier(position.length, position.position, position.root)
    }

    /// Chains whose length has no row in the table.
    pub fn unsupported_chains<'a>(&self, index: &'a ChainIndex) -> Vec<&'a Chain> {
        index
            .chains()
            .iter()
            .filter(|chain| !self.shapes.contains_key(&chain.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::build_chains;
    use crate::models::EvolutionLink;

    #[test]
    fn test_default_table_matches_observed_shapes() {
        let table = TierTable::default();
        assert_eq!(table.tier(1, 1, 1).unwrap(), 0);
        assert_eq!(table.tier(2, 1, 1).unwrap(), 2);
        assert_eq!(table.tier(2, 2, 1).unwrap(), 0);
        assert_eq!(table.tier(3, 1, 1).unwrap(), 2);
        assert_eq!(table.tier(3, 2, 1).unwrap(), 1);
        assert_eq!(table.tier(3, 3, 1).unwrap(), 0);
    }

    #[test]
    fn test_unknown_length_is_reported() {
        let table = TierTable::default();
        match table.tier(4, 1, 77) {
            Err(CorodexError::UnsupportedChainShape { length, root }) => {
                assert_eq!(length, 4);
                assert_eq!(root, 77);
            }
            other => panic!("expected UnsupportedChainShape, got {:?}", other),
        }
        assert!(table.tier(3, 0, 1).is_err());
        assert!(table.tier(3, 4, 1).is_err());
    }

    #[test]
    fn test_parse_tier_table_toml() {
        let toml = r#"
[[shapes]]
length = 1
tiers = [0]

[[shapes]]
length = 4
tiers = [3, 2, 1, 0]
"#;

        let table = TierTable::from_str(toml).unwrap();
        assert_eq!(table.lengths().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(table.tier(4, 2, 1).unwrap(), 2);
        assert!(table.tier(3, 1, 1).is_err());
    }

    #[test]
    fn test_mismatched_shape_is_config_error() {
        let toml = r#"
[[shapes]]
length = 2
tiers = [2, 1, 0]
"#;
        assert!(matches!(
            TierTable::from_str(toml),
            Err(CorodexError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_shape_is_config_error() {
        let shapes = vec![
            TierShape { length: 1, tiers: vec![0] },
            TierShape { length: 1, tiers: vec![1] },
        ];
        assert!(TierTable::from_shapes(shapes).is_err());
    }

    #[test]
    fn test_config_round_trip_keeps_default_table() {
        let table = TierTable::default();
        let rebuilt = TierTable::from_shapes(table.to_config().shapes).unwrap();
        assert_eq!(table, rebuilt);
    }

    #[test]
    fn test_unsupported_chains_are_listed() {
        let links = vec![
            EvolutionLink { species_id: 1, previous: None, next: Some(2), condition: None },
            EvolutionLink { species_id: 2, previous: Some(1), next: Some(3), condition: None },
            EvolutionLink { species_id: 3, previous: Some(2), next: Some(4), condition: None },
            EvolutionLink { species_id: 4, previous: Some(3), next: None, condition: None },
            EvolutionLink::single(5),
        ];
        let index = build_chains(&links).unwrap();
        let unsupported = TierTable::default().unsupported_chains(&index);
        assert_eq!(unsupported.len(), 1);
        assert_eq!(unsupported[0].root, 1);
    }
}
