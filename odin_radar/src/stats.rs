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

use std::{collections::HashSet, fmt, time::Duration};
use chrono::{DateTime,Utc};

use crate::feed::AircraftTable;
use crate::report::DataSourceKind;
use crate::track::{is_military, AircraftSnapshot, TrackEngine};

/// how the current aircraft table splits up by position source
#[derive(Debug,Clone,Copy,Default,PartialEq,Eq)]
pub struct SourceDistribution {
    pub adsb: usize,
    pub mlat: usize,
    pub other: usize,
}

impl SourceDistribution {
    pub fn of (table: &AircraftTable)->Self {
        SourceDistribution {
            adsb: table.count_by_source( DataSourceKind::Adsb),
            mlat: table.count_by_source( DataSourceKind::Mlat),
            other: table.count_by_source( DataSourceKind::Other),
        }
    }

    pub fn total (&self)->usize { self.adsb + self.mlat + self.other }
}

/// session statistics, accumulated over all applied fetch cycles
#[derive(Debug,Clone)]
pub struct SessionStats {
    pub started: DateTime<Utc>,
    unique: HashSet<String>,
    pub messages: u64,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub in_table: usize,
    pub dropped_records: u64,
    pub military: usize,
    pub distribution: SourceDistribution,
    pub tracked: usize,
    pub peak_concurrent: usize,
}

impl SessionStats {
    pub fn new ()->Self {
        SessionStats {
            started: Utc::now(),
            unique: HashSet::new(),
            messages: 0,
            cycles: 0,
            failed_cycles: 0,
            in_table: 0,
            dropped_records: 0,
            military: 0,
            distribution: SourceDistribution::default(),
            tracked: 0,
            peak_concurrent: 0,
        }
    }

    /// account for a freshly applied aircraft table
    pub fn record_table (&mut self, table: &AircraftTable) {
        self.cycles += 1;
        self.messages = table.messages();
        self.in_table = table.len();
        self.dropped_records += table.dropped() as u64;
        self.distribution = SourceDistribution::of( table);
        self.military = table.iter().filter( |r| is_military( &r.hex)).count();

        for r in table.iter() {
            if !self.unique.contains( &r.hex) {
                self.unique.insert( r.hex.clone());
            }
        }
    }

    pub fn record_failed_cycle (&mut self) {
        self.cycles += 1;
        self.failed_cycles += 1;
    }

    pub fn record_tracking (&mut self, engine: &TrackEngine) {
        self.tracked = engine.len();
        self.peak_concurrent = self.peak_concurrent.max( engine.peak_concurrent());
    }

    pub fn unique_aircraft (&self)->usize { self.unique.len() }

    pub fn session_duration (&self)->Duration {
        (Utc::now() - self.started).to_std().unwrap_or_default()
    }

    pub fn uptime_minutes (&self)->f64 { self.session_duration().as_secs_f64() / 60.0 }
}

impl Default for SessionStats {
    fn default()->Self { SessionStats::new() }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "tracked: {} (peak {}), table: {}, unique: {}, mil: {}, msgs: {}, adsb/mlat/other: {}/{}/{}, cycles: {} ({} failed)",
            self.tracked, self.peak_concurrent, self.in_table, self.unique.len(), self.military, self.messages,
            self.distribution.adsb, self.distribution.mlat, self.distribution.other, self.cycles, self.failed_cycles)
    }
}

/* #region displayed aircraft metrics ************************************************************************/

/// the aircraft that holds an extreme value (closest, fastest ..) together with that value
#[derive(Debug,Clone,PartialEq)]
pub struct MetricLeader {
    pub name: String,
    pub value: f64,
    pub unit: &'static str,
    pub decimals: usize,
}

impl MetricLeader {
    fn of (ac: &AircraftSnapshot, value: f64, unit: &'static str, decimals: usize)->Self {
        let name = ac.callsign.clone().unwrap_or_else( || ac.hex.clone());
        MetricLeader { name, value, unit, decimals }
    }
}

impl fmt::Display for MetricLeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "{} ({:.*} {})", self.name, self.decimals, self.value, self.unit)
    }
}

/// aggregates over the currently displayed aircraft. Averages and leaders are `None` if there is
/// nothing to aggregate
#[derive(Debug,Clone,Default,PartialEq)]
pub struct ScopeMetrics {
    pub displayed: usize,
    pub ground: usize,
    pub airborne: usize,
    pub emergencies: usize,
    pub military: usize,
    pub civilian: usize,
    pub unique_squawks: usize,
    pub avg_altitude_ft: Option<f64>,
    pub avg_speed_kt: Option<f64>,
    pub closest: Option<MetricLeader>,
    pub fastest: Option<MetricLeader>,
    pub highest: Option<MetricLeader>,
    pub lowest: Option<MetricLeader>,
}

impl ScopeMetrics {
    pub fn of (aircraft: &[AircraftSnapshot])->Self {
        let mut m = ScopeMetrics { displayed: aircraft.len(), ..ScopeMetrics::default() };
        let mut squawks: HashSet<&str> = HashSet::new();
        let (mut alt_sum, mut alt_n) = (0.0, 0usize);
        let (mut gs_sum, mut gs_n) = (0.0, 0usize);

        let mut closest: Option<(&AircraftSnapshot,f64)> = None;
        let mut fastest: Option<(&AircraftSnapshot,f64)> = None;
        let mut highest: Option<(&AircraftSnapshot,f64)> = None;
        let mut lowest: Option<(&AircraftSnapshot,f64)> = None;

        for ac in aircraft {
            if ac.military { m.military += 1 } else { m.civilian += 1 }
            if ac.emergency { m.emergencies += 1 }
            if let Some(sq) = &ac.squawk { squawks.insert( sq.as_str()); }

            if ac.on_ground {
                m.ground += 1;
            } else {
                m.airborne += 1;
                if let Some(alt) = ac.altitude_ft {
                    alt_sum += alt;
                    alt_n += 1;
                    if highest.is_none_or( |(_,h)| alt > h) { highest = Some((ac,alt)) }
                    if lowest.is_none_or( |(_,l)| alt < l) { lowest = Some((ac,alt)) }
                }
            }

            if let Some(gs) = ac.ground_speed_kt.filter( |gs| *gs > 0.0) {
                gs_sum += gs;
                gs_n += 1;
                if fastest.is_none_or( |(_,f)| gs > f) { fastest = Some((ac,gs)) }
            }

            if closest.is_none_or( |(_,d)| ac.distance_nm < d) { closest = Some((ac,ac.distance_nm)) }
        }

        m.unique_squawks = squawks.len();
        m.avg_altitude_ft = (alt_n > 0).then( || alt_sum / alt_n as f64);
        m.avg_speed_kt = (gs_n > 0).then( || gs_sum / gs_n as f64);
        m.closest = closest.map( |(ac,v)| MetricLeader::of( ac, v, "nm", 1));
        m.fastest = fastest.map( |(ac,v)| MetricLeader::of( ac, v, "kt", 0));
        m.highest = highest.map( |(ac,v)| MetricLeader::of( ac, v, "ft", 0));
        m.lowest = lowest.map( |(ac,v)| MetricLeader::of( ac, v, "ft", 0));
        m
    }
}

/// display an optional metric, "N/A" if there is none
pub fn or_na<T: fmt::Display> (v: &Option<T>)->String {
    match v {
        Some(v) => v.to_string(),
        None => "N/A".to_string()
    }
}

/* #endregion displayed aircraft metrics */
