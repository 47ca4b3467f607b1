// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::coords::AirportCoordinate;
use crate::VmsError;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Found,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingAirportRecord {
    pub icao: String,
    pub first_seen: DateTime<Utc>,
    pub found_in: Option<String>,
    pub status: LookupStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Codes the primary coordinate source did not know, keyed by uppercase code.
///
/// The first record for a code wins; later reports of the same code, in this
/// run or any later one, leave the file untouched.
#[derive(Debug, Clone)]
pub struct MissingAirportLog {
    path: PathBuf,
    records: BTreeMap<String, MissingAirportRecord>,
}

impl MissingAirportLog {
    pub fn load<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let records = if path.exists() {
            std::fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str(&content).ok())
                .unwrap_or_else(|| {
                    warn!(
                        "Missing-airport log is unreadable; starting empty. log_path={}",
                        path.display()
                    );
                    BTreeMap::new()
                })
        } else {
            BTreeMap::new()
        };
        Self { path, records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, code: &str) -> Option<&MissingAirportRecord> {
        self.records.get(&crate::normalize_code(code))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records that `code` was found in `source` instead of the primary source.
    /// Returns false when the code was already logged.
    pub fn record_found(
        &mut self,
        code: &str,
        source: &str,
        coordinate: &AirportCoordinate,
    ) -> Result<bool, VmsError> {
        self.record(
            code,
            Some(source.to_string()),
            LookupStatus::Found,
            Some(coordinate),
        )
    }

    pub fn record_not_found(&mut self, code: &str) -> Result<bool, VmsError> {
        self.record(code, None, LookupStatus::NotFound, None)
    }

    fn record(
        &mut self,
        code: &str,
        found_in: Option<String>,
        status: LookupStatus,
        coordinate: Option<&AirportCoordinate>,
    ) -> Result<bool, VmsError> {
        let code = crate::normalize_code(code);
        if self.records.contains_key(&code) {
            return Ok(false);
        }

        info!(
            "Logging airport missing from primary source. code={} status={:?} found_in={}",
            code,
            status,
            found_in.as_deref().unwrap_or("-")
        );
        self.records.insert(
            code.clone(),
            MissingAirportRecord {
                icao: code,
                first_seen: Utc::now(),
                found_in,
                status,
                latitude: coordinate.map(|c| c.latitude),
                longitude: coordinate.map(|c| c.longitude),
            },
        );

        let content = serde_json::to_string_pretty(&self.records)?;
        crate::write_atomic(&self.path, content.as_bytes())?;
        Ok(true)
    }
}
