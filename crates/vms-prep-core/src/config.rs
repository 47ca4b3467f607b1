// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::backoff::{BackoffPolicy, RequestBudget};
use crate::cache::DistanceCache;
use crate::coords::sources::{
    http_client, BulkAirportDatabase, JsonApiSource, OverrideTable, UnconfiguredSource,
    BULK_DATABASE_URL,
};
use crate::coords::{CoordinateResolver, CoordinateSource};
use crate::distance::{AirportGapClient, DistanceProvider, AIRPORT_GAP_DISTANCE_URL};
use crate::missing::MissingAirportLog;
use crate::VmsError;
use log::info;
use std::path::{Path, PathBuf};

/// `{code}` in every airport URL template is the ICAO code.
pub const COMMUNITY_AIRPORT_URL: &str =
    "https://aviationweather.gov/api/data/airport?ids={code}&format=json";
pub const AIRPORTDB_URL: &str = "https://airportdb.io/api/v1/airport/{code}";

/// Endpoints, credentials and file locations for one run. Nothing here is
/// read from the environment; the caller fills it in.
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub distance_url: String,
    pub airport_gap_token: Option<String>,
    pub community_url: String,
    pub phpvms_url: Option<String>,
    pub phpvms_api_key: Option<String>,
    pub airportdb_url: String,
    pub airportdb_token: Option<String>,
    pub bulk_database_url: String,
    pub backoff: BackoffPolicy,
    pub budget: RequestBudget,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            distance_url: AIRPORT_GAP_DISTANCE_URL.to_string(),
            airport_gap_token: None,
            community_url: COMMUNITY_AIRPORT_URL.to_string(),
            phpvms_url: None,
            phpvms_api_key: None,
            airportdb_url: AIRPORTDB_URL.to_string(),
            airportdb_token: None,
            bulk_database_url: BULK_DATABASE_URL.to_string(),
            backoff: BackoffPolicy::default(),
            budget: RequestBudget::default(),
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("org", "vms-prep", "vms-prep")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Settings {
    pub fn with_data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("distance_cache.json")
    }

    pub fn missing_log_path(&self) -> PathBuf {
        self.data_dir.join("missing_airports.json")
    }

    pub fn override_path(&self) -> PathBuf {
        self.data_dir.join("airport_overrides.csv")
    }

    pub fn bulk_database_path(&self) -> PathBuf {
        self.data_dir.join("airports.json")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Community API, then phpVMS, then the override table, the bulk snapshot
    /// and (with a token) the paid service. Without a phpVMS URL the resolver
    /// is still built; lookups that get as far as phpVMS fail then.
    pub fn build_resolver(&self) -> Result<CoordinateResolver, VmsError> {
        let client = http_client()?;

        let system_of_record: Box<dyn CoordinateSource> = match non_empty(&self.phpvms_url) {
            Some(url) => Box::new(JsonApiSource::phpvms(
                client.clone(),
                url,
                non_empty(&self.phpvms_api_key),
            )),
            None => Box::new(UnconfiguredSource::new(
                "phpvms",
                "phpVMS API URL is required (PHPVMS_API_URL)",
            )),
        };

        let mut resolver = CoordinateResolver::new(
            Box::new(JsonApiSource::community(client.clone(), &self.community_url)),
            system_of_record,
            OverrideTable::load(&self.override_path())?,
            MissingAirportLog::load(self.missing_log_path()),
        )
        .with_fallback(Box::new(BulkAirportDatabase::new(
            self.bulk_database_path(),
            &self.bulk_database_url,
            client.clone(),
        )));

        if let Some(token) = non_empty(&self.airportdb_token) {
            resolver = resolver.with_fallback(Box::new(JsonApiSource::airportdb(
                client,
                &self.airportdb_url,
                token,
            )));
        }
        Ok(resolver)
    }

    /// The direct distance API is only wired in when a token is configured.
    pub fn build_provider(&self) -> Result<DistanceProvider, VmsError> {
        let resolver = self.build_resolver()?;
        let cache = DistanceCache::load(self.cache_path());
        info!(
            "Distance cache ready. path={} entries={}",
            cache.path().display(),
            cache.len()
        );

        let mut provider = DistanceProvider::new(cache, resolver)
            .with_backoff(self.backoff)
            .with_budget(self.budget.clone());

        match non_empty(&self.airport_gap_token) {
            Some(token) => {
                provider = provider.with_api(Box::new(AirportGapClient::new(
                    http_client()?,
                    &self.distance_url,
                    token,
                )));
            }
            None => info!("No distance API token; using geodesic distances only"),
        }
        Ok(provider)
    }
}
