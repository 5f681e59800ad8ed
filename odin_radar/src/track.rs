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

//! the sweep synchronized aircraft state. Aircraft only change their displayed state when the
//! simulated sweep line passes over them, in between they keep their last illuminated position

use std::{collections::{HashMap,VecDeque}, fmt, sync::Arc, time::{Duration,Instant}};
use serde::{Deserialize,Serialize};
use strum::{Display,EnumString};
use tracing::{debug,trace,warn};

use crate::errors::{op_failed,Result};
use crate::feed::AircraftTable;
use crate::geo::{normalize_360, DistanceCache, HomeReferenceFrame, ScreenPos};
use crate::report::{AircraftReport, DataSourceKind};
use crate::sweep::SweepInterval;

pub const DEFAULT_MAX_TRAIL_LENGTH: usize = 100;
pub const DEFAULT_TIMEOUT_FACTOR: f64 = 3.0;
pub const DEFAULT_TRAIL_POOL_SIZE: usize = 100;

/// ICAO address blocks allocated to US military aircraft
const MILITARY_BLOCKS: [(u32,u32);2] = [(0xADF7C0, 0xADFFFF), (0xAE0000, 0xAE7FFF)];

pub fn is_military (hex: &str)->bool {
    match u32::from_str_radix( hex.trim(), 16) {
        Ok(addr) => MILITARY_BLOCKS.iter().any( |(lo,hi)| addr >= *lo && addr <= *hi),
        Err(_) => false
    }
}

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,Default,Serialize,Deserialize,Display,EnumString)]
pub enum DisplayFilter {
    #[default]
    All,
    Military,
    Civilian,
}

impl DisplayFilter {
    pub fn accepts (&self, hex: &str)->bool {
        match self {
            DisplayFilter::All => true,
            DisplayFilter::Military => is_military(hex),
            DisplayFilter::Civilian => !is_military(hex),
        }
    }

    pub fn next (self)->Self {
        match self {
            DisplayFilter::All => DisplayFilter::Military,
            DisplayFilter::Military => DisplayFilter::Civilian,
            DisplayFilter::Civilian => DisplayFilter::All,
        }
    }
}

/// sweep line angle (screen angle) at which an aircraft with the given compass bearing is illuminated
#[inline]
pub fn sweep_angle_for_bearing (bearing: f64)->f64 { normalize_360( bearing - 90.0) }

/// geographic position captured at illumination time. Screen coordinates are derived when rendering
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct TrailPoint {
    pub lat: f64,
    pub lon: f64,
    pub time: Instant,
}

/// free list of trail buffers so that aircraft churn does not re-allocate trail storage
#[derive(Debug)]
pub struct TrailPool {
    free: Vec<VecDeque<TrailPoint>>,
    max_free: usize,
    reused: usize,
}

impl TrailPool {
    pub fn new (max_free: usize)->Self {
        TrailPool { free: Vec::with_capacity(max_free), max_free, reused: 0 }
    }

    pub fn acquire (&mut self, capacity: usize)->VecDeque<TrailPoint> {
        if let Some(mut trail) = self.free.pop() {
            trail.clear();
            trail.reserve( capacity);
            self.reused += 1;
            trail
        } else {
            VecDeque::with_capacity( capacity)
        }
    }

    pub fn release (&mut self, mut trail: VecDeque<TrailPoint>) {
        if self.free.len() < self.max_free {
            trail.clear();
            self.free.push( trail);
        }
    }

    /// number of buffers ready for reuse
    pub fn available (&self)->usize { self.free.len() }

    /// how many acquisitions were served from the free list
    pub fn reused (&self)->usize { self.reused }
}

impl Default for TrailPool {
    fn default()->Self { TrailPool::new( DEFAULT_TRAIL_POOL_SIZE) }
}

/// bounded FIFO push, the oldest points are evicted first
fn push_to_trail (trail: &mut VecDeque<TrailPoint>, p: TrailPoint, max_len: usize) {
    if max_len == 0 {
        trail.clear();
        return
    }
    while trail.len() >= max_len {
        trail.pop_front();
    }
    trail.push_back(p);
}

/// engine owned state of an aircraft that has been illuminated at least once
#[derive(Debug)]
pub struct TrackedAircraft {
    pub report: AircraftReport, // as of last illumination
    pub trail: VecDeque<TrailPoint>,
    pub first_seen: Instant,
    pub last_illuminated: Instant,
    pub bearing: f64, // compass bearing from home at last illumination
    pub distance_nm: f64,
}

impl TrackedAircraft {
    fn new (report: AircraftReport, trail: VecDeque<TrailPoint>, bearing: f64, distance_nm: f64, now: Instant)->Self {
        TrackedAircraft { report, trail, first_seen: now, last_illuminated: now, bearing, distance_nm }
    }

    fn illuminate (&mut self, report: &AircraftReport, bearing: f64, distance_nm: f64, point: TrailPoint, max_trail_len: usize) {
        self.report.clone_from( report);
        self.bearing = bearing;
        self.distance_nm = distance_nm;
        self.last_illuminated = point.time;
        push_to_trail( &mut self.trail, point, max_trail_len);
    }

    pub fn hex (&self)->&str { self.report.hex.as_str() }

    pub fn since_illuminated (&self, now: Instant)->Duration { now.saturating_duration_since( self.last_illuminated) }

    /// screen position of the last illuminated location under the *current* home frame
    pub fn screen_pos (&self, home: &HomeReferenceFrame)->Option<ScreenPos> {
        home.to_screen( self.report.lat, self.report.lon)
    }

    pub fn sweep_angle (&self)->f64 { sweep_angle_for_bearing( self.bearing) }

    pub fn is_military (&self)->bool { is_military( &self.report.hex) }
}

impl fmt::Display for TrackedAircraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "Tracked( {}, brg: {:.1}, dist: {:.1}nm, trail: {})", self.report, self.bearing, self.distance_nm, self.trail.len())
    }
}

/// per frame engine parameters
#[derive(Debug,Clone,PartialEq)]
pub struct TrackConfig {
    pub filter: DisplayFilter,
    pub max_trail_len: usize,
    pub timeout: Duration, // sweep period * timeout factor
}

impl TrackConfig {
    pub fn new (filter: DisplayFilter, max_trail_len: usize, sweep_period: Duration, timeout_factor: f64)->Self {
        let timeout = sweep_period.mul_f64( timeout_factor.max(0.0));
        TrackConfig { filter, max_trail_len, timeout }
    }
}

/// what happened during one engine update
#[derive(Debug,Clone,Copy,Default,PartialEq,Eq)]
pub struct FrameUpdate {
    pub illuminated: usize,
    pub created: usize,
    pub filtered: usize,
    pub off_scope: usize,
    pub expired: usize,
    pub failed: usize,
}

enum Disposition {
    Illuminated { created: bool },
    NotSwept,
    Filtered,
    OffScope,
}

/// list row for an aircraft as shown outside of the scope (aircraft list, statistics)
#[derive(Debug,Clone,PartialEq)]
pub struct AircraftSnapshot {
    pub hex: String,
    pub callsign: Option<String>,
    pub altitude_ft: Option<f64>,
    pub ground_speed_kt: Option<f64>,
    pub track_deg: Option<f64>,
    pub squawk: Option<String>,
    pub on_ground: bool,
    pub source: DataSourceKind,
    pub feed: Arc<str>,
    pub distance_nm: f64,
    pub bearing: f64,
    pub trail_len: usize,
    pub since_illuminated: Duration,
    pub military: bool,
    pub emergency: bool,
}

pub struct TrackEngine {
    tracked: HashMap<String,TrackedAircraft>,
    pool: TrailPool,
    distances: DistanceCache,
    peak_concurrent: usize,
}

impl TrackEngine {
    pub fn new ()->Self {
        TrackEngine {
            tracked: HashMap::new(),
            pool: TrailPool::default(),
            distances: DistanceCache::default(),
            peak_concurrent: 0,
        }
    }

    pub fn with_pool (pool: TrailPool)->Self {
        TrackEngine { pool, ..TrackEngine::new() }
    }

    pub fn get (&self, hex: &str)->Option<&TrackedAircraft> { self.tracked.get(hex) }
    pub fn contains (&self, hex: &str)->bool { self.tracked.contains_key(hex) }
    pub fn iter (&self)->impl Iterator<Item=&TrackedAircraft> { self.tracked.values() }
    pub fn len (&self)->usize { self.tracked.len() }
    pub fn is_empty (&self)->bool { self.tracked.is_empty() }
    pub fn pool (&self)->&TrailPool { &self.pool }

    /// maximum number of simultaneously tracked aircraft, monotonic within a session
    pub fn peak_concurrent (&self)->usize { self.peak_concurrent }

    /// run the illumination step for the current sweep interval, then purge stale aircraft
    pub fn update (&mut self, table: &AircraftTable, sweep: &SweepInterval, home: &HomeReferenceFrame, config: &TrackConfig, now: Instant)->FrameUpdate {
        let mut upd = FrameUpdate::default();

        for report in table.iter() {
            match self.process_report( report, sweep, home, config, now) {
                Ok(Disposition::Illuminated{created}) => {
                    upd.illuminated += 1;
                    if created { upd.created += 1 }
                }
                Ok(Disposition::NotSwept) => {}
                Ok(Disposition::Filtered) => upd.filtered += 1,
                Ok(Disposition::OffScope) => upd.off_scope += 1,
                Err(e) => {
                    warn!("skipping aircraft {}: {}", report.hex, e);
                    upd.failed += 1;
                }
            }
        }

        upd.expired = self.expire_stale( config.timeout, now);
        self.peak_concurrent = self.peak_concurrent.max( self.tracked.len());

        if upd.created > 0 || upd.expired > 0 {
            trace!("tracking {} aircraft (+{} -{})", self.tracked.len(), upd.created, upd.expired);
        }
        upd
    }

    fn process_report (&mut self, report: &AircraftReport, sweep: &SweepInterval, home: &HomeReferenceFrame, config: &TrackConfig, now: Instant)->Result<Disposition> {
        if !config.filter.accepts( &report.hex) || !report.has_vertical_state() {
            self.remove( &report.hex);
            return Ok(Disposition::Filtered)
        }

        let bearing = home.bearing_to( report.lat, report.lon);
        if !bearing.is_finite() {
            return Err( op_failed!("no bearing for position {},{}", report.lat, report.lon))
        }

        // tracked aircraft are illuminated at the bearing they were last seen at
        let sweep_bearing = self.tracked.get( &report.hex).map( |ac| ac.bearing).unwrap_or( bearing);
        if !sweep.contains( sweep_angle_for_bearing( sweep_bearing)) {
            return Ok(Disposition::NotSwept)
        }

        let Some(pos) = home.to_screen_cached( &mut self.distances, report.lat, report.lon) else {
            if self.remove( &report.hex) { debug!("{} left the scope", report.hex) }
            return Ok(Disposition::OffScope)
        };
        if !(pos.x.is_finite() && pos.y.is_finite()) {
            return Err( op_failed!("invalid screen position for {},{}", report.lat, report.lon))
        }

        let point = TrailPoint { lat: report.lat, lon: report.lon, time: now };

        if let Some(ac) = self.tracked.get_mut( &report.hex) {
            ac.illuminate( report, bearing, pos.dist_nm, point, config.max_trail_len);
            Ok(Disposition::Illuminated{ created: false })

        } else {
            let trail = self.pool.acquire( config.max_trail_len);
            let mut ac = TrackedAircraft::new( report.clone(), trail, bearing, pos.dist_nm, now);
            push_to_trail( &mut ac.trail, point, config.max_trail_len);
            self.tracked.insert( report.hex.clone(), ac);
            Ok(Disposition::Illuminated{ created: true })
        }
    }

    /// remove aircraft that have not been illuminated for longer than `timeout`
    pub fn expire_stale (&mut self, timeout: Duration, now: Instant)->usize {
        let stale: Vec<String> = self.tracked.values()
            .filter( |ac| ac.since_illuminated(now) > timeout)
            .map( |ac| ac.report.hex.clone())
            .collect();

        for hex in &stale {
            self.remove( hex);
        }
        stale.len()
    }

    /// drop everything that does not project into the current scope (e.g. after zooming in or moving home)
    pub fn drop_out_of_range (&mut self, home: &HomeReferenceFrame)->usize {
        let out: Vec<String> = self.tracked.values()
            .filter( |ac| ac.screen_pos(home).is_none())
            .map( |ac| ac.report.hex.clone())
            .collect();

        for hex in &out {
            self.remove( hex);
        }
        out.len()
    }

    /// drop everything the filter does not accept, e.g. after the filter was changed
    pub fn apply_filter (&mut self, filter: DisplayFilter)->usize {
        let rejected: Vec<String> = self.tracked.keys().filter( |hex| !filter.accepts(hex)).cloned().collect();
        for hex in &rejected {
            self.remove( hex);
        }
        rejected.len()
    }

    /// shorten existing trails if the maximum length was reduced
    pub fn truncate_trails (&mut self, max_len: usize) {
        for ac in self.tracked.values_mut() {
            while ac.trail.len() > max_len {
                ac.trail.pop_front();
            }
        }
    }

    pub fn remove (&mut self, hex: &str)->bool {
        if let Some(ac) = self.tracked.remove(hex) {
            self.pool.release( ac.trail);
            true
        } else {
            false
        }
    }

    pub fn clear (&mut self) {
        let hexes: Vec<String> = self.tracked.keys().cloned().collect();
        for hex in &hexes {
            self.remove( hex);
        }
        self.distances.clear();
    }

    /// list rows sorted by distance from home
    pub fn snapshot (&self, now: Instant)->Vec<AircraftSnapshot> {
        let mut list: Vec<AircraftSnapshot> = self.tracked.values().map( |ac| {
            let r = &ac.report;
            AircraftSnapshot {
                hex: r.hex.clone(),
                callsign: r.callsign.clone(),
                altitude_ft: r.altitude_ft,
                ground_speed_kt: r.ground_speed_kt,
                track_deg: r.track_deg,
                squawk: r.squawk.clone(),
                on_ground: r.on_ground,
                source: r.source,
                feed: r.feed.clone(),
                distance_nm: ac.distance_nm,
                bearing: ac.bearing,
                trail_len: ac.trail.len(),
                since_illuminated: ac.since_illuminated(now),
                military: ac.is_military(),
                emergency: r.is_emergency(),
            }
        }).collect();

        list.sort_by( |a,b| a.distance_nm.total_cmp( &b.distance_nm).then_with( || a.hex.cmp( &b.hex)));
        list
    }

    /// the next aircraft (by distance) after `current`, wrapping around
    pub fn next_after (&self, current: Option<&str>)->Option<String> {
        let mut order: Vec<(&str,f64)> = self.tracked.values().map( |ac| (ac.hex(), ac.distance_nm)).collect();
        if order.is_empty() { return None }
        order.sort_by( |a,b| a.1.total_cmp( &b.1).then_with( || a.0.cmp( b.0)));

        let idx = match current.and_then( |hex| order.iter().position( |(h,_)| *h == hex)) {
            Some(i) => (i + 1) % order.len(),
            None => 0
        };
        Some( order[idx].0.to_string())
    }
}

impl Default for TrackEngine {
    fn default()->Self { TrackEngine::new() }
}
