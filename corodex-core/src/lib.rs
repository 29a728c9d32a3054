//! Core library for the Coromon reference database.

pub mod chains;
pub mod database;
pub mod dataset;
pub mod effectiveness;
pub mod error;
pub mod file_utils;
pub mod models;
pub mod parsers;
pub mod report;
pub mod resolver;
pub mod tiers;

pub use chains::{ChainIndex, ChainPosition, EvolutionLine, build_chains};
pub use dataset::Dataset;
pub use error::{CorodexError, Result};
pub use report::{Report, Resolver};
pub use resolver::{SpeciesResolution, TraitList, TraitsIndex, resolve_species};
pub use tiers::TierTable;
