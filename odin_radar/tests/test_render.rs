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

#![allow(unused)]

use std::{sync::Arc, time::{Duration,Instant}};
use serde_json::json;
use odin_radar::{
    feed::AircraftTable,
    geo::{project, DistanceCache, HomeReferenceFrame, Viewport, DEFAULT_SCOPE_PADDING},
    overlay::*,
    render::*,
    report::AircraftReport,
    sweep::SweepInterval,
    track::{DisplayFilter, TrackConfig, TrackEngine},
};

// run with "cargo test --test test_render -- --nocapture"

const JFK: (f64,f64) = (40.6413, -73.7781);

fn sample_overlay ()->OverlayData {
    OverlayData::load( concat!( env!("CARGO_MANIFEST_DIR"), "/configs/overlay_sample.ron")).expect("sample overlay")
}

fn home (range_nm: f64)->HomeReferenceFrame {
    HomeReferenceFrame::new( JFK.0, JFK.1, range_nm).with_viewport( &Viewport::default(), DEFAULT_SCOPE_PADDING)
}

fn frame<'a> (home: &'a HomeReferenceFrame, engine: &'a TrackEngine, overlay: &'a OverlayData, options: &'a RenderOptions, now: Instant)->ScopeFrame<'a> {
    ScopeFrame { home, viewport: Viewport::default(), engine, overlay, options, sweep_angle: 0.0, selected: None, blink_on: true, now }
}

fn tracked_engine (reports: Vec<serde_json::Value>, times: &[Instant])->TrackEngine {
    let feed: Arc<str> = Arc::from("test");
    let table = AircraftTable::from_reports( reports.iter().filter_map( |v| AircraftReport::from_json_value( v, &feed)));
    let cfg = TrackConfig::new( DisplayFilter::All, 10, Duration::from_secs(1000), 3.0);
    let home = home(50.0);

    let mut engine = TrackEngine::new();
    for t in times {
        engine.update( &table, &SweepInterval::full_circle(0.0), &home, &cfg, *t);
    }
    engine
}

#[test]
fn test_empty_scope () {
    let home = home(50.0);
    let engine = TrackEngine::new();
    let overlay = OverlayData::default();
    let options = RenderOptions::default();
    let mut renderer = ScopeRenderer::new();
    let mut list = DisplayList::new();

    let summary = renderer.render( &frame( &home, &engine, &overlay, &options, Instant::now()), &mut list);
    println!("{} shapes: {summary:?}", list.len());

    assert!( summary.background_rebuilt);
    assert_eq!( summary.aircraft, 0);
    assert!( matches!( list.shapes()[0], Shape::Fill{..}));

    let texts: Vec<&str> = list.texts().collect();
    for label in ["12.5nm", "25nm", "37.5nm", "50nm", "N", "E", "S", "W", "30", "330"] {
        assert!( texts.contains( &label), "missing label {label}");
    }
    assert!( !texts.contains( &"90")); // cardinals are labeled by letter

    let rings = list.iter().filter( |s| matches!( s, Shape::Circle{filled: false, ..})).count();
    assert_eq!( rings, RANGE_RINGS);

    // the sweep is drawn last
    let n = list.len();
    assert!( list.shapes()[n - SWEEP_TRAIL_LINES..].iter().all( |s| matches!( s, Shape::Line{..})));
}

#[test]
fn test_format_range () {
    assert_eq!( format_range( 50.0), "50nm");
    assert_eq!( format_range( 12.5), "12.5nm");
    assert_eq!( format_range( 250.0), "250nm");
}

#[test]
fn test_background_cache () {
    let mut home = home(50.0);
    let engine = TrackEngine::new();
    let overlay = sample_overlay();
    let mut options = RenderOptions::default();
    let mut renderer = ScopeRenderer::new();
    let mut list = DisplayList::new();
    let now = Instant::now();

    let s1 = renderer.render( &frame( &home, &engine, &overlay, &options, now), &mut list);
    let first = list.clone();
    let s2 = renderer.render( &frame( &home, &engine, &overlay, &options, now), &mut list);
    assert!( s1.background_rebuilt && !s2.background_rebuilt);
    assert_eq!( renderer.background_builds(), 1);
    assert_eq!( first, list);

    home.set_max_range( 25.0);
    assert!( renderer.render( &frame( &home, &engine, &overlay, &options, now), &mut list).background_rebuilt);

    options.show_navaids = true;
    assert!( renderer.render( &frame( &home, &engine, &overlay, &options, now), &mut list).background_rebuilt);

    // dynamic options do not invalidate the background
    options.show_labels = false;
    assert!( !renderer.render( &frame( &home, &engine, &overlay, &options, now), &mut list).background_rebuilt);

    renderer.invalidate_background();
    renderer.render( &frame( &home, &engine, &overlay, &options, now), &mut list);
    assert_eq!( renderer.background_builds(), 4);
}

#[test]
fn test_overlay_rendering () {
    let home = home(50.0);
    let engine = TrackEngine::new();
    let overlay = sample_overlay();
    let mut options = RenderOptions::default();
    let mut renderer = ScopeRenderer::new();
    let mut list = DisplayList::new();

    renderer.render( &frame( &home, &engine, &overlay, &options, Instant::now()), &mut list);
    let texts: Vec<&str> = list.texts().collect();
    assert!( texts.contains( &"KJFK") && texts.contains( &"KLGA") && texts.contains( &"KEWR"));
    assert!( !texts.contains( &"KPHL")); // out of range
    assert!( !texts.contains( &"CRI")); // navaids are off by default

    options.show_navaids = true;
    renderer.render( &frame( &home, &engine, &overlay, &options, Instant::now()), &mut list);
    let texts: Vec<&str> = list.texts().collect();
    assert!( texts.contains( &"CRI") && texts.contains( &"OGY"));
    assert_eq!( list.iter().filter( |s| matches!( s, Shape::Polygon{..})).count(), 2); // VOR hexagons

    assert_eq!( overlay.runways_for_airport( "KLGA").count(), 1); // short runway is not shown
}

#[test]
fn test_overlay_item_limit () {
    let mut overlay = OverlayData::default();
    for i in 0..80 {
        let (lat,lon) = project( JFK.0, JFK.1, (i * 37) as f64, 60.0, 1.0 + i as f64 * 0.5);
        overlay.airports.push( Airport { icao: format!("X{i:03}"), name: String::new(), kind: "small_airport".into(), lat, lon });
    }

    let mut cache = DistanceCache::default();
    let near = overlay.airports_in_range( JFK.0, JFK.1, 100.0, &mut cache);
    assert_eq!( near.len(), MAX_OVERLAY_ITEMS);
    assert_eq!( near[0].icao, "X000");
    assert_eq!( near[49].icao, "X049");

    let near = overlay.airports_in_range( JFK.0, JFK.1, 10.2, &mut cache);
    assert_eq!( near.len(), 19); // 1.0 ..= 10.0 in 0.5 steps
}

#[test]
fn test_aircraft_labels () {
    let t0 = Instant::now();
    let (lat,lon) = project( JFK.0, JFK.1, 45.0, 60.0, 20.0);
    let (glat,glon) = project( JFK.0, JFK.1, 200.0, 60.0, 2.0);
    let engine = tracked_engine( vec![
        json!({ "hex": "a1b2c3", "flight": "DAL42", "lat": lat, "lon": lon, "alt_baro": 12000, "gs": 250.4, "track": 45.0, "version": 2 }),
        json!({ "hex": "a1b2c4", "lat": glat, "lon": glon, "alt_baro": "ground", "squawk": "1200" }),
    ], &[t0]);

    let home = home(50.0);
    let overlay = OverlayData::default();
    let mut options = RenderOptions::default();
    let mut renderer = ScopeRenderer::new();
    let mut list = DisplayList::new();

    let summary = renderer.render( &frame( &home, &engine, &overlay, &options, t0), &mut list);
    assert_eq!( summary.aircraft, 2);

    let texts: Vec<&str> = list.texts().collect();
    println!("{texts:?}");
    assert!( texts.contains( &"DAL42"));
    assert!( texts.contains( &"12000ft | 250kt"));
    assert!( texts.contains( &"HDG 45° | SQK ????"));
    assert!( texts.contains( &"N/A"));
    assert!( texts.contains( &"GNDft | ???kt"));
    assert!( texts.contains( &"HDG ???° | SQK 1200"));

    // ground traffic is a square
    assert_eq!( list.iter().filter( |s| matches!( s, Shape::Rect{..})).count(), 1);

    options.show_labels = false;
    renderer.render( &frame( &home, &engine, &overlay, &options, t0), &mut list);
    assert!( !list.texts().any( |t| t == "DAL42"));
}

#[test]
fn test_velocity_vectors () {
    let t0 = Instant::now();
    let (lat,lon) = project( JFK.0, JFK.1, 0.0, 60.0, 10.0);
    let (slat,slon) = project( JFK.0, JFK.1, 180.0, 60.0, 10.0);
    let engine = tracked_engine( vec![
        json!({ "hex": "a00001", "lat": lat, "lon": lon, "alt_baro": 9000, "gs": 300.0, "track": 0.0 }),
        json!({ "hex": "a00002", "lat": slat, "lon": slon, "alt_baro": 9000, "gs": 0.0, "track": 0.0 }),
    ], &[t0]);

    let home = home(50.0);
    let overlay = OverlayData::default();
    let mut options = RenderOptions::default();
    let mut renderer = ScopeRenderer::new();
    let mut list = DisplayList::new();

    let moving = home.to_screen( lat, lon).unwrap();
    let stationary = home.to_screen( slat, slon).unwrap();
    let (elat,elon) = project( lat, lon, 0.0, 300.0, options.vector_minutes); // 10nm further north
    let end = home.to_screen( elat, elon).unwrap();

    let vectors_from = |list: &DisplayList, x: f64, y: f64|->Vec<(f64,f64)> {
        list.iter().filter_map( |s| match s {
            Shape::Line { from, to, stroke } if stroke.dashed && (from.0 - x).abs() < 1e-3 && (from.1 - y).abs() < 1e-3 => Some(*to),
            _ => None
        }).collect()
    };

    renderer.render( &frame( &home, &engine, &overlay, &options, t0), &mut list);
    let v = vectors_from( &list, moving.x, moving.y);
    println!("vector from ({:.1},{:.1}) to {v:?}", moving.x, moving.y);
    assert_eq!( v.len(), 1);
    assert!( (v[0].0 - end.x).abs() < 1e-3 && (v[0].1 - end.y).abs() < 1e-3);
    assert!( vectors_from( &list, stationary.x, stationary.y).is_empty());

    options.show_vectors = false;
    renderer.render( &frame( &home, &engine, &overlay, &options, t0), &mut list);
    assert!( vectors_from( &list, moving.x, moving.y).is_empty());
}

#[test]
fn test_trail_fade () {
    let t0 = Instant::now();
    let t1 = t0 + Duration::from_secs(10);
    let (lat,lon) = project( JFK.0, JFK.1, 90.0, 60.0, 30.0);

    // same report twice gives a two point trail (one segment)
    let engine = tracked_engine( vec![
        json!({ "hex": "a00001", "lat": lat, "lon": lon, "alt_baro": 5000, "gs": 200.0, "track": 90.0 }),
    ], &[t0, t1]);
    assert_eq!( engine.get( "A00001").unwrap().trail.len(), 2);

    let home = home(50.0);
    let overlay = OverlayData::default();
    let options = RenderOptions { trail_fade: Duration::from_secs(300), ..RenderOptions::default() };
    let mut renderer = ScopeRenderer::new();
    let mut list = DisplayList::new();

    assert_eq!( renderer.render( &frame( &home, &engine, &overlay, &options, t1), &mut list).trail_segments, 1);

    // fully faded segments are not drawn, the aircraft still is
    let summary = renderer.render( &frame( &home, &engine, &overlay, &options, t1 + Duration::from_secs(301)), &mut list);
    assert_eq!( summary.trail_segments, 0);
    assert_eq!( summary.aircraft, 1);
}

#[test]
fn test_colors () {
    assert_eq!( Rgb::from_hex( "#00ff00"), Some( Rgb(0, 255, 0)));
    assert_eq!( Rgb::from_hex( "0a0a0a"), Some( Rgb(10, 10, 10)));
    assert_eq!( Rgb::from_hex( "#xyz"), None);
    assert_eq!( Rgb(200, 100, 0).blend( Rgb(0, 0, 0), 0.5), Rgb(100, 50, 0));

    assert!( AircraftCategory::Emergency > AircraftCategory::Selected);
    assert!( AircraftCategory::Selected > AircraftCategory::Mlat);
    assert!( AircraftCategory::Other < AircraftCategory::Adsb);
}
