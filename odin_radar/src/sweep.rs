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

use std::time::{Duration,Instant};
use tracing::debug;

use crate::geo::normalize_360;

pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_millis(3800);

/// the angular interval a sweep line covered during one frame. The interval is half open
/// (from,to], wraps through 360° if `to < from` and is empty if both are equal
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct SweepInterval {
    pub from: f64,
    pub to: f64,
    pub full: bool,
}

impl SweepInterval {
    pub fn new (from: f64, to: f64)->Self {
        SweepInterval { from: normalize_360(from), to: normalize_360(to), full: false }
    }

    pub fn empty (angle: f64)->Self { SweepInterval::new( angle, angle) }

    pub fn full_circle (to: f64)->Self {
        SweepInterval { from: normalize_360(to), to: normalize_360(to), full: true }
    }

    pub fn is_empty (&self)->bool { !self.full && self.from == self.to }

    pub fn contains (&self, angle: f64)->bool {
        if self.full { return true }

        let a = normalize_360(angle);
        if self.to > self.from {
            a > self.from && a <= self.to
        } else if self.to < self.from {
            a > self.from || a <= self.to
        } else {
            false
        }
    }

    /// covered arc in degrees
    pub fn extent (&self)->f64 {
        if self.full { 360.0 } else { normalize_360( self.to - self.from) }
    }
}

/// a sweep line rotating at a fixed angular rate (one revolution per `period`). The angle is
/// advanced by the elapsed time between `advance` calls, which makes illumination independent
/// of the frame rate
#[derive(Debug,Clone)]
pub struct SweepSimulator {
    period: Duration,
    angle: f64,
    prev_angle: f64,
    paused: bool,
    last_advance: Option<Instant>,
}

impl SweepSimulator {
    pub fn new (period: Duration)->Self {
        SweepSimulator { period, angle: 0.0, prev_angle: 0.0, paused: false, last_advance: None }
    }

    pub fn with_angle (mut self, angle: f64)->Self {
        self.angle = normalize_360(angle);
        self.prev_angle = self.angle;
        self
    }

    pub fn angle (&self)->f64 { self.angle }
    pub fn prev_angle (&self)->f64 { self.prev_angle }
    pub fn period (&self)->Duration { self.period }
    pub fn is_paused (&self)->bool { self.paused }

    pub fn set_period (&mut self, period: Duration) {
        debug!("sweep period set to {:?}", period);
        self.period = period;
    }

    /// pausing freezes the angle. The time spent paused does not count towards the next advance
    pub fn set_paused (&mut self, paused: bool) {
        if paused != self.paused {
            self.paused = paused;
            self.last_advance = None;
            self.prev_angle = self.angle;
        }
    }

    /// degrees per second
    pub fn angular_rate (&self)->f64 {
        let secs = self.period.as_secs_f64();
        if secs > 0.0 { 360.0 / secs } else { f64::INFINITY }
    }

    /// move the sweep line to `now` and return the interval it covered since the last advance
    pub fn advance (&mut self, now: Instant)->SweepInterval {
        self.prev_angle = self.angle;

        if self.paused {
            return SweepInterval::empty( self.angle)
        }

        let dt = match self.last_advance {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO
        };
        self.last_advance = Some(now);

        if self.period.is_zero() {
            return SweepInterval::full_circle( self.angle)
        }

        let delta = dt.as_secs_f64() * self.angular_rate();
        self.angle = normalize_360( self.angle + delta);

        if delta >= 360.0 {
            SweepInterval::full_circle( self.angle)
        } else {
            SweepInterval::new( self.prev_angle, self.angle)
        }
    }
}

impl Default for SweepSimulator {
    fn default()->Self { SweepSimulator::new( DEFAULT_SWEEP_PERIOD) }
}
