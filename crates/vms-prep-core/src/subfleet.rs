// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::schedule::FlightRecord;
use log::{info, warn};
use std::collections::HashMap;

/// Schedules below this flight number are not imported.
pub const MIN_FLIGHT_NUMBER: u32 = 100;

const CRN_PASSENGER: &[&str] = &[
    "B734", "B733", "SH36", "SH33", "TRIS", "BN2P", "GA8", "MI8", "AN2", "C172", "B789", "B78X",
    "B762", "BCS1", "BCS3", "A306", "SU95", "C208", "B736", "A20N", "A21N", "A310", "A319", "A320",
    "A321", "A332", "A333", "A346", "A359", "A388", "AN24", "AN26", "AT45", "AT46", "AT75", "AT76",
    "B38M", "B712", "B732", "B735", "B737", "B738", "B739", "B744", "B752", "B753", "B763", "B764",
    "B77L", "B77W", "B788", "C25C", "DH8D", "E110", "E140", "E145", "E175", "E190", "E195", "IL18",
    "IL96", "KODI", "L410", "PC12", "TBM9", "YK40",
];

const CRN_FREIGHTER: &[&str] = &[
    "SH36F", "SH33F", "A124", "AT76F", "E190F", "A225", "A30F", "B48F", "B74F", "B75F", "B76F",
    "B77F", "MD1F",
];

// ICAO type designator, range in nm
const AIRCRAFT_RANGES: &[(&str, u32)] = &[
    ("SH36F", 800),
    ("SH33F", 600),
    ("B734", 2060),
    ("B733", 2255),
    ("SH36", 800),
    ("SH33", 600),
    ("TRIS", 620),
    ("BN2P", 620),
    ("GA8", 730),
    ("MI8", 335),
    ("AN2", 450),
    ("A124", 3200),
    ("AT76F", 1000),
    ("E190F", 2300),
    ("C172", 600),
    ("B789", 7600),
    ("B78X", 6300),
    ("B762", 3900),
    ("BCS1", 3400),
    ("BCS3", 3300),
    ("A306", 4000),
    ("SU95", 2700),
    ("C208", 1000),
    ("B736", 3600),
    ("A225", 3900),
    ("A20N", 3500),
    ("A21N", 4000),
    ("A30F", 4200),
    ("A310", 5150),
    ("A319", 3700),
    ("A320", 3300),
    ("A321", 2300),
    ("A332", 7250),
    ("A333", 6350),
    ("A346", 7900),
    ("A359", 8100),
    ("A388", 8000),
    ("AN24", 1000),
    ("AN26", 1100),
    ("AT45", 850),
    ("AT46", 800),
    ("AT75", 825),
    ("AT76", 950),
    ("B38M", 3550),
    ("B48F", 4200),
    ("B712", 2060),
    ("B732", 2300),
    ("B735", 1600),
    ("B737", 3350),
    ("B738", 3400),
    ("B739", 3200),
    ("B744", 7260),
    ("B74F", 4970),
    ("B752", 3900),
    ("B753", 3800),
    ("B75F", 3600),
    ("B763", 6000),
    ("B764", 6000),
    ("B76F", 3255),
    ("B77F", 8555),
    ("B77L", 8555),
    ("B77W", 7370),
    ("B788", 7355),
    ("C25C", 2165),
    ("DH8D", 1100),
    ("E110", 1200),
    ("E140", 1600),
    ("E145", 1550),
    ("E175", 2000),
    ("E190", 2400),
    ("E195", 2200),
    ("IL18", 2200),
    ("IL96", 6000),
    ("KODI", 1132),
    ("L410", 800),
    ("MD1F", 3800),
    ("PC12", 1845),
    ("TBM9", 1730),
    ("YK40", 1000),
];

/// Aircraft ranges and the fleet flown for each flight type.
#[derive(Debug, Clone, Default)]
pub struct FleetTable {
    ranges: HashMap<String, u32>,
    fleets: HashMap<String, Vec<String>>,
}

impl FleetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fleet of the CRN virtual airline.
    pub fn crn() -> Self {
        let mut table = Self::new();
        for (icao, range) in AIRCRAFT_RANGES {
            table = table.with_range(icao, *range);
        }
        table
            .with_fleet("J", CRN_PASSENGER)
            .with_fleet("F", CRN_FREIGHTER)
    }

    pub fn with_range(mut self, icao: &str, range_nm: u32) -> Self {
        self.ranges.insert(icao.to_string(), range_nm);
        self
    }

    pub fn with_fleet(mut self, flight_type: &str, aircraft: &[&str]) -> Self {
        self.fleets.insert(
            flight_type.to_string(),
            aircraft.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn range(&self, icao: &str) -> Option<u32> {
        self.ranges.get(icao).copied()
    }

    /// Aircraft of `flight_type` whose range is strictly greater than
    /// `distance_nm`, in fleet order. `None` for an unknown flight type.
    pub fn eligible(&self, flight_type: &str, distance_nm: u32) -> Option<Vec<&str>> {
        let fleet = self.fleets.get(flight_type)?;
        Some(
            fleet
                .iter()
                .filter(|icao| match self.range(icao) {
                    Some(range) => range > distance_nm,
                    None => {
                        warn!("No range for aircraft type; skipping. aircraft={}", icao);
                        false
                    }
                })
                .map(String::as_str)
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubfleetReport {
    pub assigned: usize,
    pub removed: Vec<String>,
    pub unknown_types: usize,
}

fn numeric_flight_number(flight_number: &str) -> u32 {
    flight_number
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

/// Fills the `subfleets` column and drops rows whose numeric flight number is
/// below [`MIN_FLIGHT_NUMBER`].
pub fn assign_subfleets(records: &mut Vec<FlightRecord>, table: &FleetTable) -> SubfleetReport {
    let mut report = SubfleetReport::default();
    let before = records.len();

    records.retain(|record| {
        let keep = numeric_flight_number(&record.flight_number) >= MIN_FLIGHT_NUMBER;
        if !keep {
            report.removed.push(record.flight_number.clone());
        }
        keep
    });

    for record in records.iter_mut() {
        match table.eligible(&record.flight_type, record.distance) {
            Some(aircraft) => {
                record.subfleets = aircraft.join(";");
                report.assigned += 1;
            }
            None => {
                warn!(
                    "Unknown flight type; leaving subfleets empty. flight={} type={}",
                    record.flight_number, record.flight_type
                );
                record.subfleets.clear();
                report.unknown_types += 1;
            }
        }
    }

    info!(
        "Assigned subfleets. rows={} assigned={} removed={}",
        before,
        report.assigned,
        report.removed.len()
    );
    report
}
