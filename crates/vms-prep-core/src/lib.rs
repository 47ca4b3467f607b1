// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

pub mod backoff;
pub mod cache;
pub mod config;
pub mod coords;
pub mod distance;
pub mod missing;
pub mod schedule;
pub mod subfleet;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VmsError {
    #[error(
        "Airport {code} is missing from {system_of_record} but {found_in} knows it \
         at ({latitude}, {longitude}). Add it to {system_of_record} and append this \
         line to the override table, then re-run:\n    {remediation}"
    )]
    MissingFromSystemOfRecord {
        code: String,
        system_of_record: String,
        found_in: String,
        latitude: f64,
        longitude: f64,
        remediation: String,
    },
    #[error(
        "Airport {code} could not be resolved by any coordinate source (tried: {}). \
         Enter its coordinates manually in the override table as `{code},<latitude>,<longitude>`",
        .tried.join(", ")
    )]
    AirportNotFound { code: String, tried: Vec<String> },
    #[error(
        "Cannot compute distance {from} -> {to} (codes tried: {}): {}",
        .attempted.join(", "),
        .failures.join("; ")
    )]
    UnresolvedRoute {
        from: String,
        to: String,
        attempted: Vec<String>,
        failures: Vec<String>,
    },
    #[error("Cannot look up {code}: {service} is unavailable ({reason})")]
    SourceUnavailable {
        service: String,
        code: String,
        reason: String,
    },
    #[error("Unusable response from {service}: {reason}")]
    Payload { service: String, reason: String },
    #[error("Invalid pair file line {line} ({content:?}): expected ICAO-IATA,ICAO-IATA")]
    PairFile { line: usize, content: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl VmsError {
    /// True for errors that demand an operator fix before the run may continue.
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            VmsError::MissingFromSystemOfRecord { .. }
                | VmsError::AirportNotFound { .. }
                | VmsError::UnresolvedRoute { .. }
        )
    }
}

/// Replaces `path` with `contents` through a temporary sibling file and a rename,
/// so readers only ever see the old or the new file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), VmsError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Trims and uppercases an airport code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
