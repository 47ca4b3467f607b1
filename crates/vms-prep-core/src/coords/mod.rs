// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

pub mod sources;

use crate::missing::MissingAirportLog;
use crate::VmsError;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sources::OverrideTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportCoordinate {
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl AirportCoordinate {
    /// Returns `None` for non-finite or out-of-range coordinates.
    pub fn new(code: &str, latitude: f64, longitude: f64) -> Option<Self> {
        let usable = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        usable.then(|| Self {
            code: crate::normalize_code(code),
            latitude,
            longitude,
        })
    }

    /// Both halves are required; a record with only one of them is unusable.
    pub fn from_parts(code: &str, latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Self::new(code, lat, lon),
            _ => None,
        }
    }
}

/// Anything that can map an airport code to coordinates.
///
/// `Ok(None)` means the source has no usable record for the code. `Err` means
/// the source itself failed; the resolver treats both as a miss.
pub trait CoordinateSource {
    fn name(&self) -> &str;
    fn resolve(&self, code: &str) -> Result<Option<AirportCoordinate>, VmsError>;
}

fn query(source: &dyn CoordinateSource, code: &str) -> Option<AirportCoordinate> {
    match source.resolve(code) {
        Ok(hit) => {
            debug!(
                "Coordinate lookup. source={} code={} hit={}",
                source.name(),
                code,
                hit.is_some()
            );
            hit
        }
        Err(e) => {
            warn!(
                "Coordinate source failed; treating as not found. source={} code={} error={}",
                source.name(),
                code,
                e
            );
            None
        }
    }
}

/// Tiered airport coordinate lookup.
///
/// 1. The primary source is authoritative: a hit there returns immediately.
/// 2. Otherwise the system of record is asked. A hit there returns, with the
///    override table's coordinates taking precedence when it has the code.
/// 3. Otherwise the override table and the diagnostic sources are searched in
///    order. Any hit is logged and turned into an error, because the airport
///    has to be added to the system of record before schedules can use it.
///
/// A system of record that errors stops resolution with
/// [`VmsError::SourceUnavailable`]; every other source that errors counts as
/// a miss.
pub struct CoordinateResolver {
    primary: Box<dyn CoordinateSource>,
    system_of_record: Box<dyn CoordinateSource>,
    overrides: OverrideTable,
    fallbacks: Vec<Box<dyn CoordinateSource>>,
    missing: MissingAirportLog,
}

impl CoordinateResolver {
    pub fn new(
        primary: Box<dyn CoordinateSource>,
        system_of_record: Box<dyn CoordinateSource>,
        overrides: OverrideTable,
        missing: MissingAirportLog,
    ) -> Self {
        Self {
            primary,
            system_of_record,
            overrides,
            fallbacks: Vec::new(),
            missing,
        }
    }

    /// Appends a diagnostic source, consulted after the override table.
    pub fn with_fallback(mut self, source: Box<dyn CoordinateSource>) -> Self {
        self.fallbacks.push(source);
        self
    }

    pub fn missing_log(&self) -> &MissingAirportLog {
        &self.missing
    }

    /// Names of every source in lookup order.
    pub fn source_names(&self) -> Vec<String> {
        let mut names = vec![
            self.primary.name().to_string(),
            self.system_of_record.name().to_string(),
            self.overrides.name().to_string(),
        ];
        names.extend(self.fallbacks.iter().map(|s| s.name().to_string()));
        names
    }

    pub fn resolve(&mut self, code: &str) -> Result<AirportCoordinate, VmsError> {
        let code = crate::normalize_code(code);

        // Only a definite primary miss is recorded in the missing log
        let primary_answered = match self.primary.resolve(&code) {
            Ok(Some(coord)) => return Ok(coord),
            Ok(None) => true,
            Err(e) => {
                warn!(
                    "Primary source failed; skipping missing log. source={} code={} error={}",
                    self.primary.name(),
                    code,
                    e
                );
                false
            }
        };

        let record = self.system_of_record.resolve(&code).map_err(|e| {
            warn!(
                "System of record failed. source={} code={} error={}",
                self.system_of_record.name(),
                code,
                e
            );
            VmsError::SourceUnavailable {
                service: self.system_of_record.name().to_string(),
                code: code.clone(),
                reason: e.to_string(),
            }
        })?;

        if let Some(record) = record {
            let coord = query(&self.overrides, &code).unwrap_or(record);
            if primary_answered {
                self.missing
                    .record_found(&code, self.system_of_record.name(), &coord)?;
            }
            return Ok(coord);
        }

        match self.find_elsewhere(&code) {
            Some((found_in, coord)) => {
                if primary_answered {
                    self.missing.record_found(&code, &found_in, &coord)?;
                }
                info!(
                    "Airport found outside the system of record. code={} found_in={}",
                    code, found_in
                );
                Err(VmsError::MissingFromSystemOfRecord {
                    remediation: OverrideTable::remediation_line(&coord),
                    system_of_record: self.system_of_record.name().to_string(),
                    code,
                    found_in,
                    latitude: coord.latitude,
                    longitude: coord.longitude,
                })
            }
            None => {
                if primary_answered {
                    self.missing.record_not_found(&code)?;
                }
                Err(VmsError::AirportNotFound {
                    code,
                    tried: self.source_names(),
                })
            }
        }
    }

    fn find_elsewhere(&self, code: &str) -> Option<(String, AirportCoordinate)> {
        if let Some(coord) = query(&self.overrides, code) {
            return Some((self.overrides.name().to_string(), coord));
        }
        self.fallbacks.iter().find_map(|source| {
            query(source.as_ref(), code).map(|coord| (source.name().to_string(), coord))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::missing::LookupStatus;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use tempfile::tempdir;

    struct FakeSource {
        name: &'static str,
        known: HashMap<String, (f64, f64)>,
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl FakeSource {
        fn boxed(name: &'static str, known: &[(&str, f64, f64)]) -> (Box<Self>, Rc<Cell<usize>>) {
            let calls = Rc::new(Cell::new(0));
            let source = Box::new(Self {
                name,
                known: known
                    .iter()
                    .map(|(c, lat, lon)| (c.to_string(), (*lat, *lon)))
                    .collect(),
                calls: Rc::clone(&calls),
                fail: false,
            });
            (source, calls)
        }
    }

    impl CoordinateSource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        fn resolve(&self, code: &str) -> Result<Option<AirportCoordinate>, VmsError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(VmsError::Payload {
                    service: self.name.to_string(),
                    reason: "boom".to_string(),
                });
            }
            Ok(self
                .known
                .get(code)
                .and_then(|(lat, lon)| AirportCoordinate::new(code, *lat, *lon)))
        }
    }

    fn resolver_with(
        dir: &std::path::Path,
        primary: &[(&str, f64, f64)],
        sor: &[(&str, f64, f64)],
        overrides: &[(&str, f64, f64)],
        bulk: &[(&str, f64, f64)],
    ) -> (CoordinateResolver, Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let (primary, primary_calls) = FakeSource::boxed("community", primary);
        let (sor, sor_calls) = FakeSource::boxed("phpvms", sor);
        let (bulk, _) = FakeSource::boxed("bulk_database", bulk);
        let overrides = OverrideTable::from_entries(
            overrides
                .iter()
                .filter_map(|(c, lat, lon)| AirportCoordinate::new(c, *lat, *lon)),
        );
        let missing = MissingAirportLog::load(dir.join("missing_airports.json"));
        let resolver =
            CoordinateResolver::new(primary, sor, overrides, missing).with_fallback(bulk);
        (resolver, primary_calls, sor_calls)
    }

    #[test]
    fn test_primary_hit_is_authoritative() {
        let dir = tempdir().unwrap();
        let (mut resolver, _, sor_calls) = resolver_with(
            dir.path(),
            &[("MUHA", 22.989, -82.409)],
            &[("MUHA", 1.0, 1.0)],
            &[("MUHA", 2.0, 2.0)],
            &[],
        );

        let coord = resolver.resolve("muha").unwrap();
        assert_eq!(coord.latitude, 22.989);
        assert_eq!(sor_calls.get(), 0);
        assert!(resolver.missing_log().is_empty());
    }

    #[test]
    fn test_system_of_record_refined_by_override() {
        let dir = tempdir().unwrap();
        let (mut resolver, _, _) = resolver_with(
            dir.path(),
            &[],
            &[("MUCL", 21.0, -81.0), ("MUCM", 21.4, -77.8)],
            &[("MUCL", 21.6165, -81.546)],
            &[],
        );

        let refined = resolver.resolve("MUCL").unwrap();
        assert_eq!(refined.latitude, 21.6165);

        let plain = resolver.resolve("MUCM").unwrap();
        assert_eq!(plain.latitude, 21.4);

        let record = resolver.missing_log().get("MUCL").unwrap();
        assert_eq!(record.status, LookupStatus::Found);
        assert_eq!(record.found_in.as_deref(), Some("phpvms"));
    }

    #[test]
    fn test_found_elsewhere_is_an_error_with_remediation() {
        let dir = tempdir().unwrap();
        let (mut resolver, _, _) =
            resolver_with(dir.path(), &[], &[], &[], &[("MUVR", 23.034, -81.435)]);

        let err = resolver.resolve("MUVR").unwrap_err();
        match &err {
            VmsError::MissingFromSystemOfRecord {
                code,
                found_in,
                remediation,
                ..
            } => {
                assert_eq!(code, "MUVR");
                assert_eq!(found_in, "bulk_database");
                assert_eq!(remediation, "MUVR,23.034,-81.435");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.needs_operator());

        let record = resolver.missing_log().get("MUVR").unwrap();
        assert_eq!(record.found_in.as_deref(), Some("bulk_database"));
        assert_eq!(record.latitude, Some(23.034));
    }

    #[test]
    fn test_override_only_airport_still_fails() {
        let dir = tempdir().unwrap();
        let (mut resolver, _, _) =
            resolver_with(dir.path(), &[], &[], &[("MUNB", 20.69, -75.53)], &[]);

        match resolver.resolve("MUNB").unwrap_err() {
            VmsError::MissingFromSystemOfRecord { found_in, .. } => {
                assert_eq!(found_in, "override_table")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_not_found_anywhere() {
        let dir = tempdir().unwrap();
        let (mut resolver, primary_calls, _) = resolver_with(dir.path(), &[], &[], &[], &[]);

        match resolver.resolve("ZZZZ").unwrap_err() {
            VmsError::AirportNotFound { code, tried } => {
                assert_eq!(code, "ZZZZ");
                assert_eq!(
                    tried,
                    vec!["community", "phpvms", "override_table", "bulk_database"]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Second miss does not add a second record
        assert!(resolver.resolve("ZZZZ").is_err());
        assert_eq!(resolver.missing_log().len(), 1);
        assert_eq!(primary_calls.get(), 2);
    }

    #[test]
    fn test_failing_fallback_counts_as_miss() {
        let dir = tempdir().unwrap();
        let (primary, _) = FakeSource::boxed("community", &[]);
        let (sor, _) = FakeSource::boxed("phpvms", &[]);
        let mut broken = FakeSource::boxed("airportdb", &[("MUHA", 1.0, 1.0)]).0;
        broken.fail = true;
        let (bulk, _) = FakeSource::boxed("bulk_database", &[("MUHA", 22.989, -82.409)]);
        let missing = MissingAirportLog::load(dir.path().join("missing.json"));
        let mut resolver = CoordinateResolver::new(primary, sor, OverrideTable::default(), missing)
            .with_fallback(broken)
            .with_fallback(bulk);

        match resolver.resolve("MUHA").unwrap_err() {
            VmsError::MissingFromSystemOfRecord { found_in, .. } => {
                assert_eq!(found_in, "bulk_database")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_system_of_record_outage_stops_lookup() {
        let dir = tempdir().unwrap();
        let (primary, _) = FakeSource::boxed("community", &[]);
        let mut broken_sor = FakeSource::boxed("phpvms", &[("MUHA", 1.0, 1.0)]).0;
        broken_sor.fail = true;
        let overrides =
            OverrideTable::from_entries(AirportCoordinate::new("MUHA", 22.989, -82.409));
        let missing = MissingAirportLog::load(dir.path().join("missing.json"));
        let mut resolver = CoordinateResolver::new(primary, broken_sor, overrides, missing);

        let err = resolver.resolve("MUHA").unwrap_err();
        match &err {
            VmsError::SourceUnavailable { service, code, .. } => {
                assert_eq!(service, "phpvms");
                assert_eq!(code, "MUHA");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.needs_operator());
        assert!(resolver.missing_log().is_empty());
        assert!(!dir.path().join("missing.json").exists());
    }

    #[test]
    fn test_unconfigured_system_of_record_fails_only_when_reached() {
        let dir = tempdir().unwrap();
        let (primary, _) = FakeSource::boxed("community", &[("MUHA", 22.989, -82.409)]);
        let sor = Box::new(sources::UnconfiguredSource::new(
            "phpvms",
            "phpVMS API URL is required (PHPVMS_API_URL)",
        ));
        let missing = MissingAirportLog::load(dir.path().join("missing.json"));
        let mut resolver =
            CoordinateResolver::new(primary, sor, OverrideTable::default(), missing);

        assert_eq!(resolver.resolve("MUHA").unwrap().latitude, 22.989);
        match resolver.resolve("MUVR").unwrap_err() {
            VmsError::SourceUnavailable { service, reason, .. } => {
                assert_eq!(service, "phpvms");
                assert!(reason.contains("PHPVMS_API_URL"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(resolver.missing_log().is_empty());
    }

    #[test]
    fn test_primary_outage_leaves_missing_log_alone() {
        let dir = tempdir().unwrap();
        let mut broken_primary = FakeSource::boxed("community", &[]).0;
        broken_primary.fail = true;
        let (sor, _) = FakeSource::boxed("phpvms", &[("MUHA", 22.989, -82.409)]);
        let missing = MissingAirportLog::load(dir.path().join("missing.json"));
        let mut resolver =
            CoordinateResolver::new(broken_primary, sor, OverrideTable::default(), missing);

        assert_eq!(resolver.resolve("MUHA").unwrap().latitude, 22.989);
        assert!(matches!(
            resolver.resolve("ZZZZ"),
            Err(VmsError::AirportNotFound { .. })
        ));
        assert!(resolver.missing_log().is_empty());
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(AirportCoordinate::new("X", 91.0, 0.0).is_none());
        assert!(AirportCoordinate::new("X", 0.0, -181.0).is_none());
        assert!(AirportCoordinate::new("X", f64::NAN, 0.0).is_none());
        assert!(AirportCoordinate::from_parts("X", Some(1.0), None).is_none());
        assert_eq!(
            AirportCoordinate::from_parts(" kjfk", Some(40.6), Some(-73.8))
                .unwrap()
                .code,
            "KJFK"
        );
    }
}
