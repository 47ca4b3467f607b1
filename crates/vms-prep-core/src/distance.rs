// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::backoff::{BackoffPolicy, RequestBudget, Sleeper, ThreadSleeper};
use crate::cache::{cache_key, DistanceCache};
use crate::coords::{AirportCoordinate, CoordinateResolver};
use crate::VmsError;
use geo::{Distance, Geodesic, Point};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;

pub const METERS_PER_NAUTICAL_MILE: f64 = 1852.0;
pub const AIRPORT_GAP_DISTANCE_URL: &str = "https://airportgap.com/api/airports/distance";

/// Outcome of one direct distance request.
#[derive(Debug, Clone, PartialEq)]
pub enum DistanceResponse {
    Distance(f64),
    Throttled,
    Failed { status: u16, body: String },
}

/// A service that returns the distance between two short (IATA) codes.
pub trait DistanceApi {
    fn fetch(&self, from: &str, to: &str) -> Result<DistanceResponse, VmsError>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DistancePayload {
    Envelope { data: DistanceData },
    Flat { nautical_miles: f64 },
}

#[derive(Debug, Deserialize)]
struct DistanceData {
    attributes: DistanceAttributes,
}

#[derive(Debug, Deserialize)]
struct DistanceAttributes {
    nautical_miles: f64,
}

impl DistancePayload {
    fn nautical_miles(&self) -> f64 {
        match self {
            DistancePayload::Envelope { data } => data.attributes.nautical_miles,
            DistancePayload::Flat { nautical_miles } => *nautical_miles,
        }
    }
}

pub(crate) fn parse_distance_body(body: &str) -> Result<f64, VmsError> {
    let payload: DistancePayload = serde_json::from_str(body)?;
    Ok(payload.nautical_miles())
}

/// AirportGap distance endpoint.
pub struct AirportGapClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl AirportGapClient {
    pub fn new(client: Client, endpoint: &str, token: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            token: token.to_string(),
        }
    }
}

impl DistanceApi for AirportGapClient {
    fn fetch(&self, from: &str, to: &str) -> Result<DistanceResponse, VmsError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer token={}", self.token))
            .form(&[("from", from), ("to", to)])
            .send()?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(DistanceResponse::Throttled);
        }
        let body = response.text()?;
        if status != StatusCode::OK {
            return Ok(DistanceResponse::Failed {
                status: status.as_u16(),
                body,
            });
        }
        Ok(DistanceResponse::Distance(parse_distance_body(&body)?))
    }
}

/// Ellipsoidal (WGS-84) distance in nautical miles.
pub fn geodesic_nm(a: &AirportCoordinate, b: &AirportCoordinate) -> f64 {
    let p1 = Point::new(a.longitude, a.latitude);
    let p2 = Point::new(b.longitude, b.latitude);
    Geodesic.distance(p1, p2) / METERS_PER_NAUTICAL_MILE
}

/// Resolves route distances: cache first, then the direct API when both short
/// codes are known, then the geodesic distance between resolved coordinates.
/// Every computed value is written back to the cache.
pub struct DistanceProvider {
    cache: DistanceCache,
    api: Option<Box<dyn DistanceApi>>,
    resolver: CoordinateResolver,
    backoff: BackoffPolicy,
    budget: RequestBudget,
    sleeper: Box<dyn Sleeper>,
}

fn short_code(code: Option<&str>) -> Option<String> {
    code.map(crate::normalize_code).filter(|c| !c.is_empty())
}

impl DistanceProvider {
    pub fn new(cache: DistanceCache, resolver: CoordinateResolver) -> Self {
        Self {
            cache,
            api: None,
            resolver,
            backoff: BackoffPolicy::default(),
            budget: RequestBudget::default(),
            sleeper: Box::new(ThreadSleeper),
        }
    }

    pub fn with_api(mut self, api: Box<dyn DistanceApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_budget(mut self, budget: RequestBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn cache(&self) -> &DistanceCache {
        &self.cache
    }

    pub fn resolver(&self) -> &CoordinateResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut CoordinateResolver {
        &mut self.resolver
    }

    /// Distance in whole nautical miles (truncated) between two airports.
    pub fn distance(
        &mut self,
        icao_a: &str,
        icao_b: &str,
        short_a: Option<&str>,
        short_b: Option<&str>,
    ) -> Result<u32, VmsError> {
        let shorts = match (short_code(short_a), short_code(short_b)) {
            (Some(a), Some(b)) => Some((a, b)),
            _ => None,
        };

        if let Some((a, b)) = &shorts {
            if let Some(nm) = self.cache.get(a, b) {
                debug!("Distance cache hit. key={} nm={}", cache_key(a, b), nm);
                return Ok(nm);
            }
        }
        if let Some(nm) = self.cache.get(icao_a, icao_b) {
            debug!(
                "Distance cache hit. key={} nm={}",
                cache_key(icao_a, icao_b),
                nm
            );
            return Ok(nm);
        }

        if let Some((a, b)) = &shorts {
            if let Some(nm) = self.fetch_direct(a, b) {
                self.cache.put(a, b, nm)?;
                return Ok(nm);
            }
        }

        let nm = self.geodesic(icao_a, icao_b, short_a, short_b)?;
        match &shorts {
            Some((a, b)) => self.cache.put(a, b, nm)?,
            None => self.cache.put(icao_a, icao_b, nm)?,
        }
        Ok(nm)
    }

    /// `None` means "use the geodesic fallback": no API configured, throttling
    /// outlasted the backoff, or the API failed.
    fn fetch_direct(&mut self, from: &str, to: &str) -> Option<u32> {
        let api = self.api.as_ref()?;
        let mut backoff = self.backoff.start();

        loop {
            self.budget.acquire(self.sleeper.as_ref());
            match api.fetch(from, to) {
                Ok(DistanceResponse::Distance(nm)) => {
                    debug!("Direct distance. from={} to={} nm={}", from, to, nm);
                    return Some(nm.max(0.0) as u32);
                }
                Ok(DistanceResponse::Throttled) => match backoff.on_throttled() {
                    Some(wait) => {
                        info!(
                            "Distance API rate limit hit; waiting {}s. from={} to={}",
                            wait.as_secs(),
                            from,
                            to
                        );
                        self.sleeper.sleep(wait);
                    }
                    None => {
                        warn!(
                            "Distance API still throttling after {}s; using geodesic fallback. \
                             from={} to={}",
                            backoff.total_waited().as_secs(),
                            from,
                            to
                        );
                        return None;
                    }
                },
                Ok(DistanceResponse::Failed { status, body }) => {
                    warn!(
                        "Distance API failed; using geodesic fallback. \
                         from={} to={} status={} body={}",
                        from, to, status, body
                    );
                    return None;
                }
                Err(e) => {
                    warn!(
                        "Distance API unreachable; using geodesic fallback. from={} to={} error={}",
                        from, to, e
                    );
                    return None;
                }
            }
        }
    }

    fn geodesic(
        &mut self,
        icao_a: &str,
        icao_b: &str,
        short_a: Option<&str>,
        short_b: Option<&str>,
    ) -> Result<u32, VmsError> {
        let from = self.resolver.resolve(icao_a);
        let to = self.resolver.resolve(icao_b);

        match (from, to) {
            (Ok(from), Ok(to)) => {
                let nm = geodesic_nm(&from, &to);
                debug!(
                    "Geodesic distance. from={} to={} nm={:.2}",
                    from.code, to.code, nm
                );
                Ok(nm as u32)
            }
            (from, to) => {
                let describe = |icao: &str, short: Option<&str>| match short_code(short) {
                    Some(s) => format!("{} ({})", crate::normalize_code(icao), s),
                    None => crate::normalize_code(icao),
                };
                let failures = [from.err(), to.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect();
                Err(VmsError::UnresolvedRoute {
                    from: crate::normalize_code(icao_a),
                    to: crate::normalize_code(icao_b),
                    attempted: vec![describe(icao_a, short_a), describe(icao_b, short_b)],
                    failures,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(code: &str, lat: f64, lon: f64) -> AirportCoordinate {
        AirportCoordinate::new(code, lat, lon).unwrap()
    }

    #[test]
    fn test_parse_distance_body() {
        let envelope = r#"{"data":{"id":"HAV-MIA","type":"airport_distance","attributes":{"kilometers":368.4,"miles":228.9,"nautical_miles":198.9}}}"#;
        assert_eq!(parse_distance_body(envelope).unwrap(), 198.9);
        assert_eq!(
            parse_distance_body(r#"{"nautical_miles": 90}"#).unwrap(),
            90.0
        );
        assert!(parse_distance_body(r#"{"miles": 90}"#).is_err());
    }

    #[test]
    fn test_geodesic_reference_values() {
        // JFK to LHR is about 2999 nm on WGS-84
        let jfk = coord("KJFK", 40.6398, -73.7789);
        let lhr = coord("EGLL", 51.4706, -0.461941);
        let nm = geodesic_nm(&jfk, &lhr);
        assert!((nm - 2999.0).abs() < 5.0, "got {nm}");

        // One degree of latitude at the equator is 59.7 nm on the ellipsoid
        let a = coord("AAAA", 0.0, 0.0);
        let b = coord("BBBB", 1.0, 0.0);
        assert!((geodesic_nm(&a, &b) - 59.7).abs() < 0.1);

        assert_eq!(geodesic_nm(&jfk, &jfk), 0.0);
        assert!((geodesic_nm(&jfk, &lhr) - geodesic_nm(&lhr, &jfk)).abs() < 1e-6);
    }
}
