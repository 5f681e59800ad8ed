/*
 * Copyright © 2025, United States Government, as represented by the Administrator of
 * the National Aeronautics and Space Administration. All rights reserved.
 *
 * The “ODIN” software is licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License. You may obtain a copy
 * of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

use std::{fmt, sync::Arc};
use serde::{Deserialize,Serialize};
use serde_json::Value;
use strum::{Display,EnumString};
use uom::si::{f64::Velocity, velocity::knot};
use tracing::trace;

/// squawk codes for hijack, radio failure and general emergency
pub const EMERGENCY_SQUAWKS: [&str;3] = ["7500", "7600", "7700"];

/// the top level of a tar1090/readsb `aircraft.json` snapshot. We keep aircraft records as generic
/// JSON values so that a single malformed record does not invalidate the whole document
#[derive(Debug,Clone,Default,Deserialize)]
pub struct RawFeed {
    #[serde(default)]
    pub now: Option<f64>,

    #[serde(default)]
    pub messages: u64,

    #[serde(default)]
    pub aircraft: Vec<Value>,
}

impl RawFeed {
    pub fn from_json (s: &str)->crate::errors::Result<Self> {
        Ok( serde_json::from_str(s)?)
    }

    /// decode and validate all records, dropping the ones that don't qualify
    pub fn reports (&self, feed_name: &Arc<str>)->impl Iterator<Item=AircraftReport> + '_ {
        let feed_name = feed_name.clone();
        self.aircraft.iter().filter_map( move |v| AircraftReport::from_json_value( v, &feed_name))
    }
}

/// alt_baro is either a number (ft) or "ground"
#[derive(Debug,Deserialize)]
#[serde(untagged)]
enum RawAltitude {
    Feet(f64),
    Text(String),
}

/// some feeds send the squawk as a number
#[derive(Debug,Deserialize)]
#[serde(untagged)]
enum RawCode {
    Text(String),
    Number(u64),
}

#[derive(Debug,Deserialize)]
struct RawAircraft {
    hex: Option<String>,
    flight: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    alt_baro: Option<RawAltitude>,
    gs: Option<f64>,
    track: Option<f64>,
    squawk: Option<RawCode>,
    gnd: Option<bool>,

    #[serde(default)]
    mlat: Vec<Value>,

    #[serde(alias="version")]
    adsb_version: Option<Value>,
}

/// where the position of a report came from
#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,Serialize,Deserialize,Display,EnumString)]
pub enum DataSourceKind {
    #[strum(serialize="ADS-B")]
    Adsb,
    #[strum(serialize="MLAT")]
    Mlat,
    #[strum(serialize="other")]
    Other,
}

/// a validated position report as it enters the aircraft table. The identifier is the trimmed,
/// upper case ICAO 24bit address
#[derive(Debug,Clone,PartialEq,Serialize)]
pub struct AircraftReport {
    pub hex: String,
    pub callsign: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub altitude_ft: Option<f64>,
    pub ground_speed_kt: Option<f64>,
    pub track_deg: Option<f64>,
    pub squawk: Option<String>,
    pub on_ground: bool,
    pub source: DataSourceKind,
    pub feed: Arc<str>,
}

impl AircraftReport {
    /// decode a single `aircraft` entry, returning `None` for anything that does not pass validation
    pub fn from_json_value (v: &Value, feed: &Arc<str>)->Option<Self> {
        let raw: RawAircraft = match RawAircraft::deserialize(v) {
            Ok(raw) => raw,
            Err(e) => { trace!("undecodable aircraft record: {e}"); return None }
        };

        let hex = normalize_hex( raw.hex.as_deref()?)?;
        let lat = raw.lat?;
        let lon = raw.lon?;
        if !is_valid_position( lat, lon) {
            return None
        }

        let (altitude_ft, alt_ground) = match raw.alt_baro {
            Some(RawAltitude::Feet(ft)) if ft.is_finite() => (Some(ft), false),
            Some(RawAltitude::Text(s)) => (None, s.trim().eq_ignore_ascii_case("ground")),
            _ => (None, false)
        };
        let on_ground = raw.gnd.unwrap_or(false) || alt_ground;

        let callsign = raw.flight.map( |s| s.trim().to_string()).filter( |s| !s.is_empty());
        let squawk = raw.squawk.map( |c| match c {
            RawCode::Text(s) => s.trim().to_string(),
            RawCode::Number(n) => format!("{n:04}"),
        }).filter( |s| !s.is_empty());

        let source = if !raw.mlat.is_empty() {
            DataSourceKind::Mlat
        } else if raw.adsb_version.as_ref().is_some_and( |v| !v.is_null()) {
            DataSourceKind::Adsb
        } else {
            DataSourceKind::Other
        };

        Some( AircraftReport {
            hex, callsign, lat, lon, altitude_ft,
            ground_speed_kt: raw.gs.filter( |v| v.is_finite()),
            track_deg: raw.track.filter( |v| v.is_finite()),
            squawk, on_ground, source,
            feed: feed.clone(),
        })
    }

    pub fn is_emergency (&self)->bool {
        self.squawk.as_deref().is_some_and( is_emergency_squawk)
    }

    /// we only display reports that have either an altitude or are known to be on the ground
    pub fn has_vertical_state (&self)->bool {
        self.altitude_ft.is_some() || self.on_ground
    }

    pub fn groundspeed (&self)->Option<Velocity> { self.ground_speed_kt.map( |kt| Velocity::new::<knot>(kt)) }

    pub fn display_callsign (&self)->&str { self.callsign.as_deref().unwrap_or("N/A") }
}

impl fmt::Display for AircraftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "Report( hex: {}", self.hex)?;
        if let Some(cs) = &self.callsign { write!( f, ", cs: \"{cs}\"")?; }
        write!( f, ", pos: ({:.4},{:.4})", self.lat, self.lon)?;
        if let Some(alt) = self.altitude_ft { write!( f, ", alt: {alt:.0}")?; }
        if self.on_ground { write!( f, ", gnd")?; }
        if let Some(gs) = self.ground_speed_kt { write!( f, ", spd: {gs:.0}")?; }
        if let Some(trk) = self.track_deg { write!( f, ", trk: {trk:.0}")?; }
        if let Some(sq) = &self.squawk { write!( f, ", sqk: {sq}")?; }
        write!( f, ", src: {}/{})", self.source, self.feed)
    }
}

pub fn is_emergency_squawk (squawk: &str)->bool {
    EMERGENCY_SQUAWKS.contains( &squawk.trim())
}

pub fn is_valid_position (lat: f64, lon: f64)->bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}

/// trimmed upper case identifier, `None` if blank
pub fn normalize_hex (hex: &str)->Option<String> {
    let hex = hex.trim();
    if hex.is_empty() { None } else { Some( hex.to_ascii_uppercase()) }
}
