// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use super::{AirportCoordinate, CoordinateSource};
use crate::VmsError;
use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const OVERRIDE_TABLE: &str = "override_table";
pub const BULK_DATABASE: &str = "bulk_database";

pub const BULK_DATABASE_URL: &str =
    "https://raw.githubusercontent.com/mwgg/Airports/master/airports.json";

pub fn http_client() -> Result<Client, VmsError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("vms-prep/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

// --- Manual override table ---

/// Operator-maintained coordinates, read from `icao,latitude,longitude[,name]`.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: HashMap<String, AirportCoordinate>,
}

impl OverrideTable {
    /// A missing file is an empty table. Rows with unusable coordinates are skipped.
    pub fn load(path: &Path) -> Result<Self, VmsError> {
        if !path.exists() {
            debug!("No override table. path={}", path.display());
            return Ok(Self::default());
        }

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)?;

        let mut entries = HashMap::new();
        for (i, record) in rdr.records().enumerate() {
            let row = i + 2;
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        "Skipping override row. path={} row={} error={}",
                        path.display(),
                        row,
                        e
                    );
                    continue;
                }
            };
            // Columns by position: the trailing name is optional
            let parsed = match (record.get(0), record.get(1), record.get(2)) {
                (Some(icao), Some(lat), Some(lon)) => lat
                    .parse::<f64>()
                    .ok()
                    .zip(lon.parse::<f64>().ok())
                    .map(|(lat, lon)| (icao, lat, lon)),
                _ => None,
            };
            let Some((icao, lat, lon)) = parsed else {
                warn!(
                    "Skipping override row; expected icao,latitude,longitude. path={} row={}",
                    path.display(),
                    row
                );
                continue;
            };
            match AirportCoordinate::new(icao, lat, lon) {
                Some(coord) => {
                    entries.insert(coord.code.clone(), coord);
                }
                None => warn!(
                    "Override coordinates out of range. code={} lat={} lon={}",
                    icao, lat, lon
                ),
            }
        }

        debug!(
            "Loaded override table. path={} entries={}",
            path.display(),
            entries.len()
        );
        Ok(Self { entries })
    }

    pub fn from_entries<I: IntoIterator<Item = AirportCoordinate>>(entries: I) -> Self {
        Self {
            entries: entries.into_iter().map(|c| (c.code.clone(), c)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The CSV line an operator appends to register `coord`.
    pub fn remediation_line(coord: &AirportCoordinate) -> String {
        format!("{},{},{}", coord.code, coord.latitude, coord.longitude)
    }
}

impl CoordinateSource for OverrideTable {
    fn name(&self) -> &str {
        OVERRIDE_TABLE
    }

    fn resolve(&self, code: &str) -> Result<Option<AirportCoordinate>, VmsError> {
        Ok(self.entries.get(&crate::normalize_code(code)).cloned())
    }
}

// --- JSON HTTP APIs ---

/// A coordinate lookup over HTTP: `url_template` contains `{code}`, which is
/// replaced by the ICAO code, and the answer carries latitude/longitude at the
/// given JSON pointers.
pub struct JsonApiSource {
    name: String,
    client: Client,
    url_template: String,
    lat_pointer: String,
    lon_pointer: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
}

impl JsonApiSource {
    pub fn new(
        name: &str,
        client: Client,
        url_template: &str,
        lat_pointer: &str,
        lon_pointer: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            client,
            url_template: url_template.to_string(),
            lat_pointer: lat_pointer.to_string(),
            lon_pointer: lon_pointer.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Community airport API keyed by ICAO code (aviationweather.gov airport
    /// data). The answer is a JSON array; an unknown code gives an empty one.
    pub fn community(client: Client, url_template: &str) -> Self {
        Self::new("community", client, url_template, "/0/lat", "/0/lon")
    }

    /// phpVMS instance acting as the system of record.
    pub fn phpvms(client: Client, base_url: &str, api_key: Option<&str>) -> Self {
        let template = format!("{}/api/airports/{{code}}", base_url.trim_end_matches('/'));
        let source = Self::new("phpvms", client, &template, "/data/lat", "/data/lon");
        match api_key {
            Some(key) => source.with_header("X-API-Key", key),
            None => source,
        }
    }

    /// Paid lookup service, only built when a token is configured.
    pub fn airportdb(client: Client, url_template: &str, token: &str) -> Self {
        Self::new(
            "airportdb",
            client,
            url_template,
            "/latitude_deg",
            "/longitude_deg",
        )
        .with_query("apiToken", token)
    }

    pub fn url_for(&self, code: &str) -> String {
        self.url_template.replace("{code}", code)
    }
}

/// Reads a coordinate that may be encoded as a number or a numeric string.
fn coordinate_at(body: &serde_json::Value, pointer: &str) -> Option<f64> {
    match body.pointer(pointer)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn coordinate_from_body(
    code: &str,
    body: &serde_json::Value,
    lat_pointer: &str,
    lon_pointer: &str,
) -> Option<AirportCoordinate> {
    AirportCoordinate::from_parts(
        code,
        coordinate_at(body, lat_pointer),
        coordinate_at(body, lon_pointer),
    )
}

impl CoordinateSource for JsonApiSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, code: &str) -> Result<Option<AirportCoordinate>, VmsError> {
        let mut request = self.client.get(self.url_for(code)).query(&self.query);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send()?;
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT
        ) {
            return Ok(None);
        }
        let text = response.error_for_status()?.text()?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let body: serde_json::Value = serde_json::from_str(&text)?;

        let coord = coordinate_from_body(code, &body, &self.lat_pointer, &self.lon_pointer);
        if coord.is_none() {
            debug!(
                "Response without usable coordinates. source={} code={}",
                self.name, code
            );
        }
        Ok(coord)
    }
}

/// Placeholder for a source whose settings are missing. Lookups fail with a
/// configuration error, so a run only needs the setting once it reaches this
/// source.
pub struct UnconfiguredSource {
    name: String,
    hint: String,
}

impl UnconfiguredSource {
    pub fn new(name: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            hint: hint.to_string(),
        }
    }
}

impl CoordinateSource for UnconfiguredSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self, _code: &str) -> Result<Option<AirportCoordinate>, VmsError> {
        Err(VmsError::Config(self.hint.clone()))
    }
}

// --- Bulk local database ---

#[derive(Debug, Deserialize)]
struct BulkEntry {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

/// Large ICAO-keyed airport snapshot, downloaded once into the data directory
/// and parsed on first use. If it cannot be fetched or parsed the source stays
/// disabled for the rest of the run.
pub struct BulkAirportDatabase {
    path: PathBuf,
    url: Option<String>,
    client: Option<Client>,
    entries: OnceCell<Option<HashMap<String, AirportCoordinate>>>,
}

impl BulkAirportDatabase {
    pub fn new(path: PathBuf, url: &str, client: Client) -> Self {
        Self {
            path,
            url: Some(url.to_string()),
            client: Some(client),
            entries: OnceCell::new(),
        }
    }

    /// Uses an existing snapshot only; never downloads.
    pub fn offline(path: PathBuf) -> Self {
        Self {
            path,
            url: None,
            client: None,
            entries: OnceCell::new(),
        }
    }

    fn entries(&self) -> Option<&HashMap<String, AirportCoordinate>> {
        self.entries
            .get_or_init(|| match self.open() {
                Ok(entries) => Some(entries),
                Err(e) => {
                    warn!(
                        "Bulk airport database unavailable; skipping it this run. path={} error={}",
                        self.path.display(),
                        e
                    );
                    None
                }
            })
            .as_ref()
    }

    fn open(&self) -> Result<HashMap<String, AirportCoordinate>, VmsError> {
        if !self.path.exists() {
            self.download()?;
        }
        let content = std::fs::read_to_string(&self.path)?;
        let entries = parse_bulk_database(&content)?;
        debug!(
            "Loaded bulk airport database. path={} entries={}",
            self.path.display(),
            entries.len()
        );
        Ok(entries)
    }

    fn download(&self) -> Result<(), VmsError> {
        let (Some(url), Some(client)) = (&self.url, &self.client) else {
            return Err(VmsError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "snapshot missing and downloads are disabled",
            )));
        };

        info!(
            "Downloading bulk airport database. url={} path={}",
            url,
            self.path.display()
        );
        let bytes = client.get(url).send()?.error_for_status()?.bytes()?;
        // Validate before persisting so a bad download is retried next run
        parse_bulk_database(std::str::from_utf8(&bytes).map_err(|e| VmsError::Payload {
            service: BULK_DATABASE.to_string(),
            reason: e.to_string(),
        })?)?;
        crate::write_atomic(&self.path, &bytes)?;
        info!(
            "Bulk airport database saved. path={} bytes={}",
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }
}

pub(crate) fn parse_bulk_database(
    content: &str,
) -> Result<HashMap<String, AirportCoordinate>, VmsError> {
    let raw: HashMap<String, BulkEntry> = serde_json::from_str(content)?;
    Ok(raw
        .into_iter()
        .filter_map(|(code, entry)| {
            AirportCoordinate::from_parts(&code, entry.lat, entry.lon).map(|c| (c.code.clone(), c))
        })
        .collect())
}

impl CoordinateSource for BulkAirportDatabase {
    fn name(&self) -> &str {
        BULK_DATABASE
    }

    fn resolve(&self, code: &str) -> Result<Option<AirportCoordinate>, VmsError> {
        Ok(self
            .entries()
            .and_then(|entries| entries.get(&crate::normalize_code(code)))
            .cloned())
    }
}
