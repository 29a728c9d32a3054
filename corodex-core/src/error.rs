use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorodexError {
    /// Evolution links contain a cycle, a branch, or an inconsistent pair.
    #[error("Malformed evolution chain: {reason} (species {species:?})")]
    MalformedChain { reason: String, species: Vec<i32> },

    /// No tier row exists for a chain of this length.
    #[error("Unsupported chain shape: no tier table entry for chain length {length} (root species {root})")]
    UnsupportedChainShape { length: usize, root: i32 },

    #[error("Unknown species: {0}")]
    UnknownSpecies(i32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CorodexError {
    pub(crate) fn malformed(reason: impl Into<String>, species: Vec<i32>) -> Self {
        CorodexError::MalformedChain {
            reason: reason.into(),
            species,
        }
    }
}

pub type Result<T> = std::result::Result<T, CorodexError>;
