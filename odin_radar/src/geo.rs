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

//! spherical earth geodesy for a home-centered radar scope. All distances are in nautical miles,
//! all angles in degrees. Screen coordinates have their origin in the upper left corner with y
//! growing downwards, bearing 0° points up

use std::collections::{HashMap,VecDeque};
use std::time::Duration;
use serde::{Deserialize,Serialize};
use uom::si::{f64::Velocity, velocity::knot};

/// mean earth radius in nautical miles
pub const EARTH_RADIUS_NM: f64 = 3440.065;

pub const DEFAULT_DISTANCE_CACHE_CAPACITY: usize = 1000;

/// scope radius is reduced by this (pixel) padding so that cardinal labels fit
pub const DEFAULT_SCOPE_PADDING: f64 = 40.0;

#[inline]
pub fn normalize_360 (d: f64)->f64 {
    let x = d % 360.0;
    let x = if x < 0.0 { 360.0 + x } else { x };
    if x >= 360.0 { 0.0 } else { x }
}

#[inline]
pub fn normalize_180 (d: f64)->f64 {
    let x = normalize_360(d);
    if x > 180.0 { x - 360.0 } else { x }
}

/// great circle distance (haversine)
pub fn distance_nm (lat1: f64, lon1: f64, lat2: f64, lon2: f64)->f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().atan2( (1.0 - a).clamp(0.0, 1.0).sqrt());

    EARTH_RADIUS_NM * c
}

/// initial great circle bearing from point 1 to point 2 in [0,360)
pub fn bearing_deg (lat1: f64, lon1: f64, lat2: f64, lon2: f64)->f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let y = dlon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();

    normalize_360( y.atan2(x).to_degrees())
}

/// dead reckoning along a great circle: where will an object at (lat,lon) be after `minutes` if it keeps
/// moving with `speed_kt` along `track_deg`
pub fn project (lat: f64, lon: f64, track_deg: f64, speed_kt: f64, minutes: f64)->(f64,f64) {
    let dist_nm = speed_kt / 60.0 * minutes;
    let delta = dist_nm / EARTH_RADIUS_NM;

    let phi1 = lat.to_radians();
    let lambda1 = lon.to_radians();
    let theta = track_deg.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).clamp(-1.0, 1.0).asin();
    let lambda2 = lambda1 + (theta.sin() * delta.sin() * phi1.cos()).atan2( delta.cos() - phi1.sin() * phi2.sin());

    (phi2.to_degrees(), normalize_180( lambda2.to_degrees()))
}

/// [project] for typed speed and elapsed time
pub fn dead_reckon (lat: f64, lon: f64, track_deg: f64, speed: Velocity, dt: Duration)->(f64,f64) {
    project( lat, lon, track_deg, speed.get::<knot>(), dt.as_secs_f64() / 60.0)
}

/// a projected scope position together with the distance from home it was computed for
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct ScreenPos {
    pub x: f64,
    pub y: f64,
    pub dist_nm: f64,
}

/// geographic to screen mapping: linear distance scale, bearing 0° is up. Returns `None` if the
/// point is farther away from home than `max_range_nm`
pub fn to_screen (home_lat: f64, home_lon: f64, lat: f64, lon: f64,
                  max_range_nm: f64, center_x: f64, center_y: f64, pixel_radius: f64)->Option<ScreenPos> {
    let dist_nm = distance_nm( home_lat, home_lon, lat, lon);
    let bearing = bearing_deg( home_lat, home_lon, lat, lon);
    polar_to_screen( dist_nm, bearing, max_range_nm, center_x, center_y, pixel_radius)
}

fn polar_to_screen (dist_nm: f64, bearing: f64, max_range_nm: f64, center_x: f64, center_y: f64, pixel_radius: f64)->Option<ScreenPos> {
    if !(dist_nm <= max_range_nm) { // also catches NaN
        return None
    }

    let angle = (bearing - 90.0).to_radians();
    let dist_px = if max_range_nm > 0.0 { dist_nm / max_range_nm * pixel_radius } else { 0.0 };

    Some( ScreenPos { x: center_x + dist_px * angle.cos(), y: center_y + dist_px * angle.sin(), dist_nm })
}

/// pixel dimensions of the display surface
#[derive(Debug,Clone,Copy,PartialEq,Serialize,Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new (width: f64, height: f64)->Self { Viewport { width, height } }

    pub fn center (&self)->(f64,f64) { (self.width / 2.0, self.height / 2.0) }

    pub fn scope_radius (&self, padding: f64)->f64 {
        let (cx,cy) = self.center();
        (cx.min(cy) - padding).max(0.0)
    }
}

impl Default for Viewport {
    fn default()->Self { Viewport::new( 800.0, 800.0) }
}

/// the scope geometry everything else is projected into: home location, max range and the
/// screen center/radius derived from the current viewport
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct HomeReferenceFrame {
    pub lat: f64,
    pub lon: f64,
    pub max_range_nm: f64,
    pub center_x: f64,
    pub center_y: f64,
    pub pixel_radius: f64,
}

impl HomeReferenceFrame {
    pub fn new (lat: f64, lon: f64, max_range_nm: f64)->Self {
        HomeReferenceFrame { lat, lon, max_range_nm, center_x: 0.0, center_y: 0.0, pixel_radius: 0.0 }
    }

    pub fn with_viewport (mut self, viewport: &Viewport, padding: f64)->Self {
        self.set_viewport( viewport, padding);
        self
    }

    pub fn set_viewport (&mut self, viewport: &Viewport, padding: f64) {
        let (cx,cy) = viewport.center();
        self.center_x = cx;
        self.center_y = cy;
        self.pixel_radius = viewport.scope_radius( padding);
    }

    pub fn set_home (&mut self, lat: f64, lon: f64) {
        self.lat = lat;
        self.lon = lon;
    }

    pub fn set_max_range (&mut self, max_range_nm: f64) {
        self.max_range_nm = max_range_nm;
    }

    /// pixels per nautical mile
    pub fn scale (&self)->f64 {
        if self.max_range_nm > 0.0 { self.pixel_radius / self.max_range_nm } else { 0.0 }
    }

    pub fn distance_to (&self, lat: f64, lon: f64)->f64 { distance_nm( self.lat, self.lon, lat, lon) }

    pub fn bearing_to (&self, lat: f64, lon: f64)->f64 { bearing_deg( self.lat, self.lon, lat, lon) }

    pub fn to_screen (&self, lat: f64, lon: f64)->Option<ScreenPos> {
        to_screen( self.lat, self.lon, lat, lon, self.max_range_nm, self.center_x, self.center_y, self.pixel_radius)
    }

    pub fn to_screen_cached (&self, cache: &mut DistanceCache, lat: f64, lon: f64)->Option<ScreenPos> {
        let dist_nm = cache.distance_nm( self.lat, self.lon, lat, lon);
        let bearing = self.bearing_to( lat, lon);
        polar_to_screen( dist_nm, bearing, self.max_range_nm, self.center_x, self.center_y, self.pixel_radius)
    }

    /// inverse of the distance scale: how far from home (in nm) is a scope pixel position
    pub fn screen_distance_nm (&self, x: f64, y: f64)->f64 {
        if self.pixel_radius > 0.0 {
            (x - self.center_x).hypot( y - self.center_y) / self.pixel_radius * self.max_range_nm
        } else {
            0.0
        }
    }

    /// screen point at a given bearing and pixel distance from the scope center (rings, ticks, labels)
    pub fn polar_point (&self, bearing: f64, dist_px: f64)->(f64,f64) {
        let angle = (bearing - 90.0).to_radians();
        (self.center_x + dist_px * angle.cos(), self.center_y + dist_px * angle.sin())
    }
}

/// bounded memo of haversine distances. Keys are the four coordinates rounded to 1e-4 degrees
/// (about 11m), oldest entries are evicted first
#[derive(Debug)]
pub struct DistanceCache {
    entries: HashMap<[i64;4],f64>,
    order: VecDeque<[i64;4]>,
    capacity: usize,
}

impl DistanceCache {
    pub fn new (capacity: usize)->Self {
        DistanceCache { entries: HashMap::with_capacity(capacity), order: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn distance_nm (&mut self, lat1: f64, lon1: f64, lat2: f64, lon2: f64)->f64 {
        let key = [cache_coord(lat1), cache_coord(lon1), cache_coord(lat2), cache_coord(lon2)];
        if let Some(d) = self.entries.get(&key) {
            return *d
        }

        let d = distance_nm( lat1, lon1, lat2, lon2);
        if self.capacity > 0 {
            while self.order.len() >= self.capacity {
                if let Some(k) = self.order.pop_front() { self.entries.remove(&k); } else { break }
            }
            self.entries.insert( key, d);
            self.order.push_back( key);
        }
        d
    }

    pub fn len (&self)->usize { self.entries.len() }
    pub fn is_empty (&self)->bool { self.entries.is_empty() }
    pub fn capacity (&self)->usize { self.capacity }

    pub fn clear (&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl Default for DistanceCache {
    fn default()->Self { DistanceCache::new( DEFAULT_DISTANCE_CACHE_CAPACITY) }
}

#[inline]
fn cache_coord (deg: f64)->i64 { (deg * 10_000.0).round() as i64 }
