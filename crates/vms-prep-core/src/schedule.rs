// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::VmsError;
use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_AIRLINE: &str = "CRN";
pub const START_FLIGHT_NUMBER: u32 = 1000;
pub const AVERAGE_SPEED_KTS: f64 = 300.0;
const ALL_WEEK: &str = "1234567";
const TIME_FMT: &str = "%H:%M";

static PAIR_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirportRef {
    pub icao: String,
    pub iata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePair {
    pub origin: AirportRef,
    pub destination: AirportRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightType {
    Passenger,
    Cargo,
}

impl FlightType {
    pub fn code(&self) -> &'static str {
        match self {
            FlightType::Passenger => "J",
            FlightType::Cargo => "F",
        }
    }
}

/// One row of a phpVMS flights import. Field order is the import column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlightRecord {
    pub airline: String,
    pub flight_number: String,
    pub route_code: String,
    pub callsign: String,
    pub route_leg: String,
    pub dpt_airport: String,
    pub arr_airport: String,
    pub alt_airport: String,
    pub days: String,
    pub dpt_time: String,
    pub arr_time: String,
    pub level: String,
    pub distance: u32,
    pub flight_time: u32,
    pub flight_type: String,
    pub load_factor: String,
    pub load_factor_variance: String,
    pub pilot_pay: String,
    pub route: String,
    pub notes: String,
    pub start_date: String,
    pub end_date: String,
    pub active: String,
    pub subfleets: String,
    pub fares: String,
    pub fields: String,
    pub event_id: String,
    pub user_id: String,
}

/// Parses `ICAO-IATA,ICAO-IATA` lines. The IATA half may be empty.
pub fn parse_pairs<R: BufRead>(reader: R) -> Result<Vec<RoutePair>, VmsError> {
    let re = PAIR_RE.get_or_init(|| {
        Regex::new(
            r"^\s*([A-Za-z0-9]{2,4})-([A-Za-z0-9]{0,3})\s*,\s*([A-Za-z0-9]{2,4})-([A-Za-z0-9]{0,3})\s*$",
        )
        .unwrap()
    });

    let airport = |icao: &str, iata: &str| AirportRef {
        icao: crate::normalize_code(icao),
        iata: Some(crate::normalize_code(iata)).filter(|s| !s.is_empty()),
    };

    let mut pairs = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let cap = re.captures(&line).ok_or_else(|| VmsError::PairFile {
            line: i + 1,
            content: line.clone(),
        })?;
        pairs.push(RoutePair {
            origin: airport(&cap[1], &cap[2]),
            destination: airport(&cap[3], &cap[4]),
        });
    }
    Ok(pairs)
}

pub fn parse_pair_file<P: AsRef<Path>>(path: P) -> Result<Vec<RoutePair>, VmsError> {
    let file = File::open(path)?;
    parse_pairs(BufReader::new(file))
}

/// Random departure between 05:00 and 22:45 on a quarter hour, plus the
/// arrival and the block time in minutes at the average cruise speed.
pub fn flight_times<R: Rng>(rng: &mut R, distance_nm: u32) -> (String, String, u32) {
    let hour = rng.gen_range(5..=22);
    let minute = *[0, 15, 30, 45].choose(rng).unwrap_or(&0);
    let departure = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();

    let minutes = distance_nm as f64 / AVERAGE_SPEED_KTS * 60.0;
    let arrival = departure + TimeDelta::seconds((minutes * 60.0) as i64);

    (
        departure.format(TIME_FMT).to_string(),
        arrival.format(TIME_FMT).to_string(),
        minutes as u32,
    )
}

/// Turns resolved airport pairs into round-trip passenger and cargo rows with
/// consecutive flight numbers.
pub struct ScheduleGenerator<R: Rng> {
    airline: String,
    route_code: String,
    next_flight_number: u32,
    rng: R,
}

impl<R: Rng> ScheduleGenerator<R> {
    pub fn new(airline: &str, route_code: &str, start_flight_number: u32, rng: R) -> Self {
        Self {
            airline: airline.to_string(),
            route_code: route_code.to_string(),
            next_flight_number: start_flight_number,
            rng,
        }
    }

    pub fn next_flight_number(&self) -> u32 {
        self.next_flight_number
    }

    fn record(
        &mut self,
        from: &str,
        to: &str,
        distance: u32,
        flight_type: FlightType,
    ) -> FlightRecord {
        let (dpt_time, arr_time, flight_time) = flight_times(&mut self.rng, distance);
        let record = FlightRecord {
            airline: self.airline.clone(),
            flight_number: self.next_flight_number.to_string(),
            route_code: self.route_code.clone(),
            dpt_airport: from.to_string(),
            arr_airport: to.to_string(),
            days: ALL_WEEK.to_string(),
            dpt_time,
            arr_time,
            distance,
            flight_time,
            flight_type: flight_type.code().to_string(),
            active: "1".to_string(),
            ..Default::default()
        };
        self.next_flight_number += 1;
        record
    }

    /// Passenger out and back, then cargo out and back.
    pub fn round_trip(&mut self, pair: &RoutePair, distance: u32) -> Vec<FlightRecord> {
        let (a, b) = (&pair.origin.icao, &pair.destination.icao);
        let mut rows = Vec::with_capacity(4);
        for flight_type in [FlightType::Passenger, FlightType::Cargo] {
            rows.push(self.record(a, b, distance, flight_type));
            rows.push(self.record(b, a, distance, flight_type));
        }
        rows
    }

    /// Stops at the first pair whose distance cannot be resolved.
    pub fn generate<F>(
        &mut self,
        pairs: &[RoutePair],
        mut distance_of: F,
    ) -> Result<Vec<FlightRecord>, VmsError>
    where
        F: FnMut(&RoutePair) -> Result<u32, VmsError>,
    {
        let mut records = Vec::with_capacity(pairs.len() * 4);
        for pair in pairs {
            let distance = distance_of(pair)?;
            records.extend(self.round_trip(pair, distance));
        }
        info!(
            "Generated schedule rows. pairs={} rows={}",
            pairs.len(),
            records.len()
        );
        Ok(records)
    }
}

pub fn write_records<P: AsRef<Path>>(path: P, records: &[FlightRecord]) -> Result<(), VmsError> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut wtr = csv::Writer::from_path(path)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<FlightRecord>, VmsError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let records = rdr.deserialize().collect::<Result<Vec<FlightRecord>, _>>()?;
    Ok(records)
}

/// File locations for one generation run of `<BASE>_<ROUTE>`.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
    prefix: String,
    timestamp: String,
}

impl RunLayout {
    pub fn new<P: Into<PathBuf>>(root: P, base: &str, route: &str, at: DateTime<Local>) -> Self {
        Self {
            root: root.into(),
            prefix: format!(
                "{}_{}",
                crate::normalize_code(base),
                crate::normalize_code(route)
            ),
            timestamp: at.format("%Y%m%d-%H%M%S").to_string(),
        }
    }

    pub fn route_dir(&self) -> PathBuf {
        self.root.join(&self.prefix)
    }

    pub fn pair_file(&self) -> PathBuf {
        self.route_dir().join("airports.txt")
    }

    pub fn run_dir(&self) -> PathBuf {
        self.route_dir().join(&self.timestamp)
    }

    fn generated_name(&self) -> String {
        format!(
            "{}_{}_generated_phpvms_flights.csv",
            self.prefix, self.timestamp
        )
    }

    pub fn generated_csv(&self) -> PathBuf {
        self.run_dir().join(self.generated_name())
    }

    pub fn exported_csv(&self) -> PathBuf {
        self.exported_path(&self.generated_name())
    }

    /// Where the subfleet-annotated copy of `file_name` goes.
    pub fn exported_path(&self, file_name: &str) -> PathBuf {
        self.run_dir().join(format!("exported_{}", file_name))
    }
}
