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

use std::{fs, path::{Path,PathBuf}, time::Duration};
use serde::{Deserialize,Serialize};
use tracing::info;

use crate::errors::{config_error, Result};
use crate::feed::{sanitize_url, FeedSource, RetryPolicy};
use crate::geo::{HomeReferenceFrame, DEFAULT_SCOPE_PADDING};
use crate::render::{RenderOptions, ScopePalette};
use crate::track::{DisplayFilter, TrackConfig};

/// the radar scope configuration, normally loaded from a RON file. Every field has a default so that
/// config files only need to contain what differs
#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub home_lat: f64,
    pub home_lon: f64,

    pub range_nm: f64,
    pub min_range_nm: f64,
    pub max_range_nm: f64,
    pub range_step_nm: f64,

    pub sources: Vec<FeedSource>,
    pub fetch_interval: Duration,
    pub fetch_timeout: Duration,
    pub max_retry_attempts: u32,
    pub initial_retry_delay: Duration,

    pub sweep_period: Duration,
    pub aircraft_timeout_factor: f64,

    pub frame_interval: Duration, // minimum time between frames
    pub render_floor: Duration, // render at least this often even if nothing changed
    pub ui_update_interval: Duration, // aircraft list and statistics refresh

    pub max_trail_length: usize,
    pub trail_fade: Duration,
    pub trail_width: f64,

    pub filter: DisplayFilter,
    pub paused: bool,
    pub show_vectors: bool,
    pub vector_minutes: f64,
    pub show_airports: bool,
    pub show_navaids: bool,
    pub show_runways: bool,
    pub show_labels: bool,

    pub scope_padding: f64,
    pub alert_duration: Duration,
    pub overlay_file: Option<PathBuf>,
    pub palette: ScopePalette,
}

impl Default for RadarConfig {
    fn default()->Self {
        RadarConfig {
            home_lat: 0.0,
            home_lon: 0.0,

            range_nm: 50.0,
            min_range_nm: 5.0,
            max_range_nm: 500.0,
            range_step_nm: 5.0,

            sources: vec![ FeedSource::new( "http://localhost/tar1090/data/aircraft.json", "local")],
            fetch_interval: Duration::from_millis(1000),
            fetch_timeout: crate::feed::DEFAULT_FETCH_TIMEOUT,
            max_retry_attempts: crate::feed::DEFAULT_MAX_ATTEMPTS,
            initial_retry_delay: crate::feed::DEFAULT_INITIAL_RETRY_DELAY,

            sweep_period: crate::sweep::DEFAULT_SWEEP_PERIOD,
            aircraft_timeout_factor: crate::track::DEFAULT_TIMEOUT_FACTOR,

            frame_interval: Duration::from_millis(16),
            render_floor: Duration::from_millis(100),
            ui_update_interval: Duration::from_millis(700),

            max_trail_length: crate::track::DEFAULT_MAX_TRAIL_LENGTH,
            trail_fade: crate::render::DEFAULT_TRAIL_FADE,
            trail_width: crate::render::DEFAULT_TRAIL_WIDTH,

            filter: DisplayFilter::All,
            paused: false,
            show_vectors: true,
            vector_minutes: crate::render::DEFAULT_VECTOR_MINUTES,
            show_airports: true,
            show_navaids: false,
            show_runways: true,
            show_labels: true,

            scope_padding: DEFAULT_SCOPE_PADDING,
            alert_duration: crate::alerts::DEFAULT_ALERT_DURATION,
            overlay_file: None,
            palette: ScopePalette::default(),
        }
    }
}

impl RadarConfig {
    pub fn from_ron_str (s: &str)->Result<Self> {
        let mut config: RadarConfig = ron::from_str(s)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// clean up values we can fix without bothering the user
    pub fn normalize (&mut self) {
        for src in self.sources.iter_mut() {
            src.url = sanitize_url( &src.url);
        }
        self.range_nm = self.clamp_range( self.range_nm);
    }

    pub fn validate (&self)->Result<()> {
        if !(self.home_lat.abs() <= 90.0 && self.home_lon.abs() <= 180.0) {
            return Err( config_error!("home position out of range: {},{}", self.home_lat, self.home_lon))
        }
        if !(self.min_range_nm > 0.0 && self.min_range_nm <= self.max_range_nm) {
            return Err( config_error!("invalid range bounds [{},{}]", self.min_range_nm, self.max_range_nm))
        }
        if !(self.range_step_nm > 0.0) {
            return Err( config_error!("range step has to be positive"))
        }
        if self.aircraft_timeout_factor < 0.0 || !self.aircraft_timeout_factor.is_finite() {
            return Err( config_error!("invalid aircraft timeout factor {}", self.aircraft_timeout_factor))
        }
        if self.fetch_interval.is_zero() || self.frame_interval.is_zero() {
            return Err( config_error!("fetch and frame intervals have to be non-zero"))
        }
        Ok(())
    }

    pub fn clamp_range (&self, range_nm: f64)->f64 {
        if range_nm.is_finite() { range_nm.clamp( self.min_range_nm, self.max_range_nm) } else { self.min_range_nm }
    }

    /// time after which an aircraft that was not illuminated is removed
    pub fn aircraft_timeout (&self)->Duration {
        self.sweep_period.mul_f64( self.aircraft_timeout_factor)
    }

    pub fn retry_policy (&self)->RetryPolicy {
        RetryPolicy { request_timeout: self.fetch_timeout, max_attempts: self.max_retry_attempts, initial_delay: self.initial_retry_delay }
    }

    pub fn home_frame (&self)->HomeReferenceFrame {
        HomeReferenceFrame::new( self.home_lat, self.home_lon, self.range_nm)
    }

    pub fn track_config (&self)->TrackConfig {
        TrackConfig::new( self.filter, self.max_trail_length, self.sweep_period, self.aircraft_timeout_factor)
    }

    pub fn render_options (&self)->RenderOptions {
        RenderOptions {
            show_vectors: self.show_vectors,
            show_airports: self.show_airports,
            show_navaids: self.show_navaids,
            show_runways: self.show_runways,
            show_labels: self.show_labels,
            trail_fade: self.trail_fade,
            trail_width: self.trail_width,
            vector_minutes: self.vector_minutes,
            sweep_period: self.sweep_period,
            palette: self.palette.clone(),
            ..RenderOptions::default()
        }
    }
}

pub fn load_config<P: AsRef<Path>> (path: P)->Result<RadarConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string( path)?;
    let config = RadarConfig::from_ron_str( &contents)?;
    info!("loaded config {:?} with {} sources", path, config.sources.len());
    Ok(config)
}
