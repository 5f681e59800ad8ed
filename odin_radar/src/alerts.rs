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

use std::{collections::HashMap, fmt, time::{Duration,Instant}};
use tracing::{info,warn};

use crate::feed::AircraftTable;

pub const DEFAULT_ALERT_DURATION: Duration = Duration::from_secs(6);

/// a newly detected emergency squawk
#[derive(Debug,Clone,PartialEq,Eq)]
pub struct EmergencyAlert {
    pub hex: String,
    pub squawk: String,
    pub callsign: Option<String>,
}

impl fmt::Display for EmergencyAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!( f, "EMERGENCY {} squawk {}", self.callsign.as_deref().unwrap_or( self.hex.as_str()), self.squawk)
    }
}

/// keeps track of which aircraft already raised an alert. An aircraft can only raise a new alert
/// after its previous one has expired
pub struct EmergencyMonitor {
    active: HashMap<String,(EmergencyAlert,Instant)>,
    alert_duration: Duration,
}

impl EmergencyMonitor {
    pub fn new (alert_duration: Duration)->Self {
        EmergencyMonitor { active: HashMap::new(), alert_duration }
    }

    /// check a new aircraft table, returning alerts for aircraft that are not already alerted
    pub fn observe (&mut self, table: &AircraftTable, now: Instant)->Vec<EmergencyAlert> {
        self.expire( now);

        let mut alerts = Vec::new();
        for report in table.emergencies() {
            if !self.active.contains_key( &report.hex) {
                let alert = EmergencyAlert {
                    hex: report.hex.clone(),
                    squawk: report.squawk.clone().unwrap_or_default(),
                    callsign: report.callsign.clone(),
                };
                warn!("{alert}");
                self.active.insert( report.hex.clone(), (alert.clone(), now));
                alerts.push( alert);
            }
        }
        alerts
    }

    pub fn expire (&mut self, now: Instant) {
        let alert_duration = self.alert_duration;
        self.active.retain( |hex, (_,t)| {
            let keep = now.saturating_duration_since(*t) < alert_duration;
            if !keep { info!("emergency alert for {hex} expired") }
            keep
        });
    }

    pub fn is_active (&self, hex: &str)->bool { self.active.contains_key(hex) }

    pub fn active_alerts (&self)->impl Iterator<Item=&EmergencyAlert> {
        self.active.values().map( |(alert,_)| alert)
    }

    pub fn len (&self)->usize { self.active.len() }
    pub fn is_empty (&self)->bool { self.active.is_empty() }
}

impl Default for EmergencyMonitor {
    fn default()->Self { EmergencyMonitor::new( DEFAULT_ALERT_DURATION) }
}
