//! File utility functions.

use crate::error::{CorodexError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find files with the given extension directly inside `dir`, sorted by path.
pub fn find_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(CorodexError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory not found: {}", dir.display()),
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Some(ext) = entry.path().extension() {
                if ext == extension {
                    files.push(entry.path().to_path_buf());
                }
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Decode seed file bytes: UTF-8 first, Windows-1252 for legacy exports.
pub fn decode_seed_bytes(bytes: &[u8]) -> Result<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.trim_start_matches('\u{feff}').to_string());
    }

    let (text, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if had_errors {
        return Err(CorodexError::Parse(
            "Seed file is neither UTF-8 nor Windows-1252".to_string(),
        ));
    }
    tracing::debug!("Decoded seed file as Windows-1252");
    Ok(text.into_owned())
}

pub fn read_seed_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    decode_seed_bytes(&bytes)
        .map_err(|e| CorodexError::Parse(format!("{}: {}", path.display(), e)))
}
