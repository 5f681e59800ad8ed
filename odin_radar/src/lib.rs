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

//! a radar scope for live ADS-B feeds: aircraft positions are polled from tar1090/readsb style
//! `aircraft.json` endpoints and shown on a simulated rotating sweep display. Aircraft positions
//! only update when the sweep line passes over them
//!
//! component order is geo → report/feed → sweep → track → render, all driven by the [scheduler]

pub mod errors;
pub mod geo;
pub mod report;
pub mod feed;
pub mod alerts;
pub mod sweep;
pub mod track;
pub mod stats;
pub mod overlay;
pub mod render;
pub mod config;
pub mod scheduler;

#[cfg(feature="tui")]
pub mod tui;

pub use errors::{OdinRadarError, Result};
pub use config::{load_config, RadarConfig};
pub use geo::{HomeReferenceFrame, ScreenPos, Viewport};
pub use report::{AircraftReport, DataSourceKind};
pub use feed::{AircraftTable, FeedClient, FeedCycle, FeedIngestor, FeedSource, FeedStatus, HttpFeedClient};
pub use sweep::{SweepInterval, SweepSimulator};
pub use track::{DisplayFilter, TrackEngine, TrackedAircraft};
pub use render::{DisplayList, ScopeRenderer, Shape};
pub use scheduler::{FrameScheduler, RadarState, ScopeCommand, ScopeDisplay, ScopeView, SchedulerHandle};
