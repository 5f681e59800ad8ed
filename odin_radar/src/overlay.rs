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

//! static aeronautical reference data drawn as scope background. Rows are already parsed, we only
//! load them from a RON document and answer range queries

use std::{fs, path::Path};
use serde::{Deserialize,Serialize};
use tracing::info;

use crate::errors::Result;
use crate::geo::DistanceCache;

/// maximum number of airports or navaids shown on the scope
pub const MAX_OVERLAY_ITEMS: usize = 50;
pub const MIN_RUNWAY_LENGTH_FT: f64 = 3000.0;

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct Airport {
    pub icao: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String, // large_airport, medium_airport, ..
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct Navaid {
    pub ident: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String, // VOR, VORTAC, NDB, ..
    #[serde(default)]
    pub frequency_khz: Option<f64>,
    pub lat: f64,
    pub lon: f64,
}

impl Navaid {
    pub fn is_vor (&self)->bool {
        matches!( self.kind.to_ascii_uppercase().as_str(), "VOR" | "VORTAC" | "VOR-DME")
    }
}

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
pub struct Runway {
    pub airport_ident: String,
    #[serde(default)]
    pub length_ft: f64,
    #[serde(default)]
    pub closed: bool,
    pub lat1: f64,
    pub lon1: f64,
    pub lat2: f64,
    pub lon2: f64,
}

impl Runway {
    pub fn is_displayable (&self)->bool {
        !self.closed && self.length_ft >= MIN_RUNWAY_LENGTH_FT
    }
}

#[derive(Debug,Clone,Default,PartialEq,Serialize,Deserialize)]
pub struct OverlayData {
    #[serde(default)]
    pub airports: Vec<Airport>,
    #[serde(default)]
    pub navaids: Vec<Navaid>,
    #[serde(default)]
    pub runways: Vec<Runway>,
}

impl OverlayData {
    pub fn from_ron_str (s: &str)->Result<Self> {
        Ok( ron::from_str(s)?)
    }

    pub fn load<P: AsRef<Path>> (path: P)->Result<Self> {
        let contents = fs::read_to_string( path.as_ref())?;
        let data = Self::from_ron_str( &contents)?;
        info!("loaded {} airports, {} navaids, {} runways from {:?}",
              data.airports.len(), data.navaids.len(), data.runways.len(), path.as_ref());
        Ok(data)
    }

    pub fn is_empty (&self)->bool {
        self.airports.is_empty() && self.navaids.is_empty() && self.runways.is_empty()
    }

    /// the closest `MAX_OVERLAY_ITEMS` airports within range
    pub fn airports_in_range (&self, lat: f64, lon: f64, range_nm: f64, cache: &mut DistanceCache)->Vec<&Airport> {
        closest_in_range( &self.airports, |a| (a.lat, a.lon), lat, lon, range_nm, cache)
    }

    /// the closest `MAX_OVERLAY_ITEMS` navaids within range
    pub fn navaids_in_range (&self, lat: f64, lon: f64, range_nm: f64, cache: &mut DistanceCache)->Vec<&Navaid> {
        closest_in_range( &self.navaids, |n| (n.lat, n.lon), lat, lon, range_nm, cache)
    }

    /// displayable runways of an airport
    pub fn runways_for_airport<'a> (&'a self, icao: &'a str)->impl Iterator<Item=&'a Runway> + 'a {
        self.runways.iter().filter( move |r| r.airport_ident == icao && r.is_displayable())
    }
}

fn closest_in_range<'a,T,F> (items: &'a [T], pos: F, lat: f64, lon: f64, range_nm: f64, cache: &mut DistanceCache)->Vec<&'a T>
    where F: Fn(&T)->(f64,f64)
{
    let mut list: Vec<(f64,&T)> = items.iter()
        .map( |it| { let (ilat,ilon) = pos(it); (cache.distance_nm( lat, lon, ilat, ilon), it) })
        .filter( |(d,_)| *d <= range_nm)
        .collect();

    list.sort_by( |a,b| a.0.total_cmp( &b.0));
    list.into_iter().take( MAX_OVERLAY_ITEMS).map( |(_,it)| it).collect()
}
