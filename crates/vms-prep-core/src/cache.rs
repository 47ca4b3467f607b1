// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::VmsError;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const KEY_SEPARATOR: char = '-';

/// Builds the order-independent cache key for a pair of airport codes.
/// `cache_key("muha", "HAV") == cache_key("HAV", "MUHA") == "HAV-MUHA"`.
pub fn cache_key(a: &str, b: &str) -> String {
    let a = crate::normalize_code(a);
    let b = crate::normalize_code(b);
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}{}{}", lo, KEY_SEPARATOR, hi)
}

/// Nautical-mile distances between airport pairs, written through to a JSON file.
///
/// The file is a flat object with sorted keys so it stays readable in diffs.
/// Entries never expire; deleting the file is the only reset.
#[derive(Debug, Clone)]
pub struct DistanceCache {
    path: PathBuf,
    entries: BTreeMap<String, u32>,
}

impl DistanceCache {
    /// Loads the cache at `path`. A missing file yields an empty cache, and so
    /// does an unreadable or malformed one (its contents are discarded).
    pub fn load<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let entries = if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<BTreeMap<String, u32>>(&content) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(
                            "Distance cache is corrupt; starting empty. cache_path={} error={}",
                            path.display(),
                            e
                        );
                        BTreeMap::new()
                    }
                },
                Err(e) => {
                    warn!(
                        "Distance cache is unreadable; starting empty. cache_path={} error={}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        debug!(
            "Loaded distance cache. cache_path={} entries={}",
            path.display(),
            entries.len()
        );
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<u32> {
        self.entries.get(&cache_key(a, b)).copied()
    }

    /// Stores a distance and rewrites the backing file before returning.
    pub fn put(&mut self, a: &str, b: &str, nautical_miles: u32) -> Result<(), VmsError> {
        let key = cache_key(a, b);
        self.entries.insert(key.clone(), nautical_miles);
        self.save()?;
        debug!("Distance cached. key={} nm={}", key, nautical_miles);
        Ok(())
    }

    fn save(&self) -> Result<(), VmsError> {
        let content = serde_json::to_string_pretty(&self.entries)?;
        crate::write_atomic(&self.path, content.as_bytes())
    }
}
