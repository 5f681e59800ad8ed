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

//! scope rendering into a backend independent display list. The static part of the scope (range rings,
//! ticks, overlays) only changes with geometry or display options and is cached

use std::time::{Duration,Instant};
use serde::{Deserialize,Serialize};
use tracing::trace;
use uom::si::velocity::knot;

use crate::geo::{dead_reckon, DistanceCache, HomeReferenceFrame, Viewport};
use crate::overlay::OverlayData;
use crate::track::{TrackEngine, TrackedAircraft};
use crate::report::DataSourceKind;

pub const RANGE_RINGS: usize = 4;
pub const SWEEP_TRAIL_LINES: usize = 10;
pub const DEFAULT_MAX_AIRCRAFT_PER_FRAME: usize = 1000;
pub const DEFAULT_SYMBOL_SIZE: f64 = 3.0;
pub const DEFAULT_HEADING_LINE_LENGTH: f64 = 10.0;
pub const DEFAULT_VECTOR_MINUTES: f64 = 2.0;
pub const DEFAULT_TRAIL_WIDTH: f64 = 1.5;
pub const DEFAULT_TRAIL_FADE: Duration = Duration::from_secs(300);

const AIRPORT_SYMBOL_SIZE: f64 = 6.0;
const NAVAID_SYMBOL_SIZE: f64 = 4.0;
const LABEL_OFFSET: f64 = 15.0;

/* #region colors and shapes ******************************************************************************/

#[derive(Debug,Clone,Copy,PartialEq,Eq,Hash,Serialize,Deserialize)]
pub struct Rgb (pub u8, pub u8, pub u8);

impl Rgb {
    /// parse "#RRGGBB" (the '#' is optional)
    pub fn from_hex (s: &str)->Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix('#').unwrap_or(s);
        if s.len() != 6 { return None }
        let v = u32::from_str_radix( s, 16).ok()?;
        Some( Rgb( (v >> 16) as u8, (v >> 8) as u8, v as u8))
    }

    /// alpha composite over an opaque background
    pub fn blend (self, bg: Rgb, alpha: f64)->Rgb {
        let a = alpha.clamp(0.0, 1.0);
        let mix = |c: u8, b: u8| (c as f64 * a + b as f64 * (1.0 - a)).round() as u8;
        Rgb( mix(self.0, bg.0), mix(self.1, bg.1), mix(self.2, bg.2))
    }
}

/// scope colors. The default is the classic green phosphor look
#[derive(Debug,Clone,PartialEq,Eq,Hash,Serialize,Deserialize)]
#[serde(default)]
pub struct ScopePalette {
    pub background: Rgb,
    pub grid: Rgb,
    pub sweep: Rgb,
    pub selected: Rgb,
    pub emergency: Rgb,
    pub ground: Rgb,
    pub text: Rgb,
    pub mlat: Rgb,
    pub adsb: Rgb,
    pub other: Rgb,
    pub airport: Rgb,
    pub navaid: Rgb,
    pub runway: Rgb,
}

impl Default for ScopePalette {
    fn default()->Self {
        ScopePalette {
            background: Rgb(0x00,0x12,0x00),
            grid: Rgb(0x00,0x33,0x00),
            sweep: Rgb(0x00,0xFF,0x00),
            selected: Rgb(0xCC,0xFF,0xCC),
            emergency: Rgb(0xFF,0x66,0x66),
            ground: Rgb(0x00,0xB3,0x00),
            text: Rgb(0xC8,0xFF,0xC8),
            mlat: Rgb(0xFF,0xFF,0x00),
            adsb: Rgb(0x00,0xFF,0x00),
            other: Rgb(0x00,0xAA,0xAA),
            airport: Rgb(0x88,0x88,0xFF),
            navaid: Rgb(0xFF,0xAA,0x88),
            runway: Rgb(0x66,0x66,0xAA),
        }
    }
}

#[derive(Debug,Clone,Copy,PartialEq)]
pub struct Stroke {
    pub color: Rgb,
    pub alpha: f64,
    pub width: f64,
    pub dashed: bool,
}

impl Stroke {
    pub fn new (color: Rgb)->Self { Stroke { color, alpha: 1.0, width: 1.0, dashed: false } }
    pub fn alpha (mut self, alpha: f64)->Self { self.alpha = alpha; self }
    pub fn width (mut self, width: f64)->Self { self.width = width; self }
    pub fn dashed (mut self)->Self { self.dashed = true; self }
}

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum TextAlign { Left, Center, Right }

#[derive(Debug,Clone,Copy,PartialEq,Eq)]
pub enum FontSize { Small, Normal, Large }

/// the backend independent drawing primitives, in screen (pixel) coordinates
#[derive(Debug,Clone,PartialEq)]
pub enum Shape {
    Fill { color: Rgb },
    Line { from: (f64,f64), to: (f64,f64), stroke: Stroke },
    Circle { center: (f64,f64), radius: f64, stroke: Stroke, filled: bool },
    Rect { x: f64, y: f64, width: f64, height: f64, stroke: Stroke, filled: bool },
    Polygon { points: Vec<(f64,f64)>, stroke: Stroke, filled: bool },
    Text { pos: (f64,f64), text: String, color: Rgb, alpha: f64, align: TextAlign, size: FontSize },
}

#[derive(Debug,Clone,Default,PartialEq)]
pub struct DisplayList {
    shapes: Vec<Shape>,
}

impl DisplayList {
    pub fn new ()->Self { DisplayList::default() }
    pub fn with_capacity (n: usize)->Self { DisplayList { shapes: Vec::with_capacity(n) } }

    pub fn push (&mut self, shape: Shape) { self.shapes.push(shape) }
    pub fn extend_from (&mut self, other: &DisplayList) { self.shapes.extend_from_slice( &other.shapes) }
    pub fn clear (&mut self) { self.shapes.clear() }

    pub fn iter (&self)->impl Iterator<Item=&Shape> { self.shapes.iter() }
    pub fn shapes (&self)->&[Shape] { self.shapes.as_slice() }
    pub fn len (&self)->usize { self.shapes.len() }
    pub fn is_empty (&self)->bool { self.shapes.is_empty() }

    pub fn texts (&self)->impl Iterator<Item=&str> {
        self.shapes.iter().filter_map( |s| if let Shape::Text{text,..} = s { Some(text.as_str()) } else { None })
    }

    fn line (&mut self, from: (f64,f64), to: (f64,f64), stroke: Stroke) {
        self.shapes.push( Shape::Line { from, to, stroke })
    }

    fn text (&mut self, pos: (f64,f64), text: impl Into<String>, color: Rgb, alpha: f64, align: TextAlign, size: FontSize) {
        self.shapes.push( Shape::Text { pos, text: text.into(), color, alpha, align, size })
    }
}

/* #endregion colors and shapes */

/// render category of an aircraft, determines its color and draw order
#[derive(Debug,Clone,Copy,PartialEq,Eq,PartialOrd,Ord)]
pub enum AircraftCategory {
    Other,
    Adsb,
    Mlat,
    Selected,
    Emergency,
}

impl AircraftCategory {
    /// emergencies blink, in their off phase they are drawn in their normal category
    pub fn of (ac: &TrackedAircraft, selected: Option<&str>, blink_on: bool)->Self {
        if ac.report.is_emergency() && blink_on {
            AircraftCategory::Emergency
        } else if selected == Some( ac.hex()) {
            AircraftCategory::Selected
        } else {
            match ac.report.source {
                DataSourceKind::Mlat => AircraftCategory::Mlat,
                DataSourceKind::Adsb => AircraftCategory::Adsb,
                DataSourceKind::Other => AircraftCategory::Other,
            }
        }
    }

    pub fn color (&self, palette: &ScopePalette)->Rgb {
        match self {
            AircraftCategory::Emergency => palette.emergency,
            AircraftCategory::Selected => palette.selected,
            AircraftCategory::Mlat => palette.mlat,
            AircraftCategory::Adsb => palette.adsb,
            AircraftCategory::Other => palette.other,
        }
    }
}

#[derive(Debug,Clone,PartialEq)]
pub struct RenderOptions {
    pub show_vectors: bool,
    pub show_airports: bool,
    pub show_navaids: bool,
    pub show_runways: bool,
    pub show_labels: bool,
    pub trail_fade: Duration,
    pub trail_width: f64,
    pub vector_minutes: f64,
    pub sweep_period: Duration,
    pub symbol_size: f64,
    pub heading_line_length: f64,
    pub max_aircraft: usize,
    pub palette: ScopePalette,
}

impl Default for RenderOptions {
    fn default()->Self {
        RenderOptions {
            show_vectors: true,
            show_airports: true,
            show_navaids: false,
            show_runways: true,
            show_labels: true,
            trail_fade: DEFAULT_TRAIL_FADE,
            trail_width: DEFAULT_TRAIL_WIDTH,
            vector_minutes: DEFAULT_VECTOR_MINUTES,
            sweep_period: crate::sweep::DEFAULT_SWEEP_PERIOD,
            symbol_size: DEFAULT_SYMBOL_SIZE,
            heading_line_length: DEFAULT_HEADING_LINE_LENGTH,
            max_aircraft: DEFAULT_MAX_AIRCRAFT_PER_FRAME,
            palette: ScopePalette::default(),
        }
    }
}

/// everything the renderer reads for one frame
pub struct ScopeFrame<'a> {
    pub home: &'a HomeReferenceFrame,
    pub viewport: Viewport,
    pub engine: &'a TrackEngine,
    pub overlay: &'a OverlayData,
    pub options: &'a RenderOptions,
    pub sweep_angle: f64,
    pub selected: Option<&'a str>,
    pub blink_on: bool,
    pub now: Instant,
}

#[derive(Debug,Clone,Copy,Default,PartialEq,Eq)]
pub struct RenderSummary {
    pub aircraft: usize,
    pub trail_segments: usize,
    pub background_rebuilt: bool,
}

/// identifies the inputs of the static background. f64 values are compared by bits
#[derive(Debug,Clone,PartialEq,Eq)]
struct BackgroundKey {
    geometry: [u64;6],
    viewport: [u64;2],
    overlay_items: [usize;3],
    show: [bool;3],
    palette: ScopePalette,
}

impl BackgroundKey {
    fn new (frame: &ScopeFrame)->Self {
        let h = frame.home;
        let o = frame.options;
        BackgroundKey {
            geometry: [h.lat.to_bits(), h.lon.to_bits(), h.max_range_nm.to_bits(), h.center_x.to_bits(), h.center_y.to_bits(), h.pixel_radius.to_bits()],
            viewport: [frame.viewport.width.to_bits(), frame.viewport.height.to_bits()],
            overlay_items: [frame.overlay.airports.len(), frame.overlay.navaids.len(), frame.overlay.runways.len()],
            show: [o.show_airports, o.show_navaids, o.show_runways],
            palette: o.palette.clone(),
        }
    }
}

pub struct ScopeRenderer {
    background: Option<(BackgroundKey,DisplayList)>,
    background_builds: usize,
    distances: DistanceCache,
}

impl ScopeRenderer {
    pub fn new ()->Self {
        ScopeRenderer { background: None, background_builds: 0, distances: DistanceCache::default() }
    }

    /// how often the static background had to be rebuilt so far
    pub fn background_builds (&self)->usize { self.background_builds }

    pub fn invalidate_background (&mut self) { self.background = None }

    /// render a complete frame into `out` (which is cleared first)
    pub fn render (&mut self, frame: &ScopeFrame, out: &mut DisplayList)->RenderSummary {
        let mut summary = RenderSummary::default();
        out.clear();

        let key = BackgroundKey::new( frame);
        let cached = matches!( &self.background, Some((k,_)) if *k == key);
        if !cached {
            let mut bg = DisplayList::with_capacity(256);
            self.draw_static_scope( frame, &mut bg);
            self.background = Some( (key, bg));
            self.background_builds += 1;
            summary.background_rebuilt = true;
            trace!("rebuilt static scope background");
        }
        if let Some((_,bg)) = &self.background {
            out.extend_from( bg);
        }

        self.draw_aircraft( frame, out, &mut summary);
        self.draw_sweep( frame, out);

        summary
    }

    /* #region static scope */

    fn draw_static_scope (&mut self, frame: &ScopeFrame, out: &mut DisplayList) {
        let palette = &frame.options.palette;
        out.push( Shape::Fill { color: palette.background });

        self.draw_overlays( frame, out);
        draw_range_rings( frame.home, palette, out);
        draw_crosshairs_and_ticks( frame.home, palette, out);
        draw_cardinal_directions( frame.home, palette, out);
    }

    fn draw_overlays (&mut self, frame: &ScopeFrame, out: &mut DisplayList) {
        let home = frame.home;
        let options = frame.options;
        let palette = &options.palette;

        if options.show_airports {
            for airport in frame.overlay.airports_in_range( home.lat, home.lon, home.max_range_nm, &mut self.distances) {
                let Some(pos) = home.to_screen( airport.lat, airport.lon) else { continue };

                out.push( Shape::Circle {
                    center: (pos.x, pos.y), radius: AIRPORT_SYMBOL_SIZE,
                    stroke: Stroke::new( palette.airport).width(2.0), filled: false
                });
                out.text( (pos.x, pos.y - 12.0), airport.icao.as_str(), palette.airport, 1.0, TextAlign::Center, FontSize::Small);

                if options.show_runways {
                    for rwy in frame.overlay.runways_for_airport( &airport.icao) {
                        if let (Some(p1),Some(p2)) = (home.to_screen( rwy.lat1, rwy.lon1), home.to_screen( rwy.lat2, rwy.lon2)) {
                            out.line( (p1.x,p1.y), (p2.x,p2.y), Stroke::new( palette.runway).width(2.0));
                        }
                    }
                }
            }
        }

        if options.show_navaids {
            for navaid in frame.overlay.navaids_in_range( home.lat, home.lon, home.max_range_nm, &mut self.distances) {
                let Some(pos) = home.to_screen( navaid.lat, navaid.lon) else { continue };
                let stroke = Stroke::new( palette.navaid);

                if navaid.is_vor() {
                    let points = (0..6).map( |i| {
                        let a = (i as f64) * std::f64::consts::PI / 3.0;
                        (pos.x + NAVAID_SYMBOL_SIZE * a.cos(), pos.y + NAVAID_SYMBOL_SIZE * a.sin())
                    }).collect();
                    out.push( Shape::Polygon { points, stroke, filled: false });
                } else {
                    out.push( Shape::Circle { center: (pos.x, pos.y), radius: NAVAID_SYMBOL_SIZE, stroke, filled: false });
                }
                out.text( (pos.x, pos.y - 10.0), navaid.ident.as_str(), palette.navaid, 1.0, TextAlign::Center, FontSize::Small);
            }
        }
    }

    /* #endregion static scope */

    fn draw_sweep (&self, frame: &ScopeFrame, out: &mut DisplayList) {
        let home = frame.home;
        let color = frame.options.palette.sweep;

        for i in 0..SWEEP_TRAIL_LINES {
            let a = (frame.sweep_angle - i as f64 * 0.2).to_radians();
            let end = (home.center_x + home.pixel_radius * a.cos(), home.center_y + home.pixel_radius * a.sin());
            let alpha = 0.4 - i as f64 * 0.04;
            out.line( (home.center_x, home.center_y), end, Stroke::new(color).alpha(alpha).width(3.0));
        }
    }

    /* #region aircraft */

    fn draw_aircraft (&self, frame: &ScopeFrame, out: &mut DisplayList, summary: &mut RenderSummary) {
        let options = frame.options;
        let period = options.sweep_period.as_secs_f64();

        let mut batch: Vec<(AircraftCategory,f64,&TrackedAircraft)> = frame.engine.iter()
            .take( options.max_aircraft)
            .map( |ac| {
                let since = ac.since_illuminated( frame.now).as_secs_f64();
                let ratio = if period > 0.0 { (since / period).min(1.0) } else { 0.0 };
                let alpha = 1.0 - ratio * 0.5;
                (AircraftCategory::of( ac, frame.selected, frame.blink_on), alpha, ac)
            })
            .collect();

        // higher priority categories end up on top
        batch.sort_by_key( |(cat,_,_)| *cat);

        for (cat,alpha,ac) in &batch {
            let color = cat.color( &options.palette);
            summary.trail_segments += draw_trail( frame, ac, color, *alpha, out);
        }

        for (cat,alpha,ac) in &batch {
            if let Some(pos) = ac.screen_pos( frame.home) {
                let color = if ac.report.on_ground && *cat < AircraftCategory::Selected { options.palette.ground } else { cat.color( &options.palette) };
                draw_symbol( frame, ac, (pos.x, pos.y), color, *alpha, out);
                summary.aircraft += 1;
            }
        }
    }

    /* #endregion aircraft */
}

impl Default for ScopeRenderer {
    fn default()->Self { ScopeRenderer::new() }
}

fn draw_range_rings (home: &HomeReferenceFrame, palette: &ScopePalette, out: &mut DisplayList) {
    for i in 1..=RANGE_RINGS {
        let f = i as f64 / RANGE_RINGS as f64;
        let ring_radius = home.pixel_radius * f;
        let range_nm = home.max_range_nm * f;

        out.push( Shape::Circle {
            center: (home.center_x, home.center_y), radius: ring_radius,
            stroke: Stroke::new( palette.grid), filled: false
        });

        let a = ((i * 45) % 360) as f64;
        let a = a.to_radians();
        let pos = (home.center_x + ring_radius * a.cos() + 8.0, home.center_y + ring_radius * a.sin());
        out.text( pos, format_range(range_nm), palette.text, 0.9, TextAlign::Left, FontSize::Small);
    }
}

pub fn format_range (nm: f64)->String {
    if (nm - nm.round()).abs() < 1e-6 { format!("{:.0}nm", nm) } else { format!("{:.1}nm", nm) }
}

fn draw_crosshairs_and_ticks (home: &HomeReferenceFrame, palette: &ScopePalette, out: &mut DisplayList) {
    let (cx,cy,r) = (home.center_x, home.center_y, home.pixel_radius);
    let grid = Stroke::new( palette.grid);

    out.line( (cx - r, cy), (cx + r, cy), grid);
    out.line( (cx, cy - r), (cx, cy + r), grid);

    for bearing in (0..360).step_by(10) {
        let tick_len = if bearing % 90 == 0 { 12.0 } else if bearing % 30 == 0 { 8.0 } else { 4.0 };
        let b = bearing as f64;
        out.line( home.polar_point( b, r), home.polar_point( b, r + tick_len), grid);

        if bearing % 30 == 0 && bearing % 90 != 0 {
            out.text( home.polar_point( b, r + 20.0), bearing.to_string(), palette.text, 1.0, TextAlign::Center, FontSize::Small);
        }
    }
}

fn draw_cardinal_directions (home: &HomeReferenceFrame, palette: &ScopePalette, out: &mut DisplayList) {
    let r = home.pixel_radius + 25.0;
    for (label,bearing) in [("N",0.0), ("E",90.0), ("S",180.0), ("W",270.0)] {
        out.text( home.polar_point( bearing, r), label, palette.text, 1.0, TextAlign::Center, FontSize::Large);
    }
}

/// trail segments fade out with the age of their newer point. Returns the number of drawn segments
fn draw_trail (frame: &ScopeFrame, ac: &TrackedAircraft, color: Rgb, alpha: f64, out: &mut DisplayList)->usize {
    if ac.trail.len() < 2 { return 0 }

    let options = frame.options;
    let fade_secs = options.trail_fade.as_secs_f64();
    let mut n = 0;

    let screen: Vec<_> = ac.trail.iter().map( |p| (frame.home.to_screen( p.lat, p.lon), p.time)).collect();
    for w in screen.windows(2) {
        let ((Some(p1),_), (Some(p2),t2)) = (w[0], w[1]) else { continue };

        let age = frame.now.saturating_duration_since(t2).as_secs_f64();
        let fade = if fade_secs > 0.0 { (1.0 - age / fade_secs).max(0.0) } else { 0.0 };
        let seg_alpha = alpha * fade;
        if seg_alpha <= 0.01 { continue }

        let width = options.trail_width + fade * options.trail_width * 0.5;
        out.line( (p1.x,p1.y), (p2.x,p2.y), Stroke::new(color).alpha(seg_alpha).width(width));
        n += 1;
    }
    n
}

fn draw_symbol (frame: &ScopeFrame, ac: &TrackedAircraft, (x,y): (f64,f64), color: Rgb, alpha: f64, out: &mut DisplayList) {
    let options = frame.options;
    let r = &ac.report;
    let s = options.symbol_size;
    let stroke = Stroke::new(color).alpha(alpha).width(2.0);

    if r.on_ground {
        out.push( Shape::Rect { x: x - s, y: y - s, width: 2.0 * s, height: 2.0 * s, stroke, filled: true });
    } else if r.altitude_ft.is_some_and( |alt| alt < 1000.0) {
        out.push( Shape::Polygon { points: vec![ (x, y - s), (x - s, y + s), (x + s, y + s)], stroke, filled: true });
    } else {
        out.push( Shape::Circle { center: (x,y), radius: s, stroke, filled: true });
    }

    if !r.on_ground {
        if let Some(trk) = r.track_deg {
            let a = (trk - 90.0).to_radians();
            let (c,sn) = (a.cos(), a.sin());
            out.line( (x + 6.0 * c, y + 6.0 * sn), (x + options.heading_line_length * c, y + options.heading_line_length * sn), stroke);

            if options.show_vectors {
                let dt = Duration::try_from_secs_f64( options.vector_minutes * 60.0);
                if let (Some(gs), Ok(dt)) = (r.groundspeed().filter( |gs| gs.get::<knot>() > 0.0), dt) {
                    let (plat,plon) = dead_reckon( r.lat, r.lon, trk, gs, dt);
                    if let Some(p) = frame.home.to_screen( plat, plon) {
                        out.line( (x,y), (p.x,p.y), Stroke::new(color).alpha( alpha * 0.5).width(1.0).dashed());
                    }
                }
            }
        }
    }

    if options.show_labels {
        draw_labels( frame, ac, (x,y), alpha, out);
    }
}

fn draw_labels (frame: &ScopeFrame, ac: &TrackedAircraft, (x,y): (f64,f64), alpha: f64, out: &mut DisplayList) {
    let r = &ac.report;
    let color = frame.options.palette.text;

    let (align, lx) = if x < frame.viewport.width / 2.0 { (TextAlign::Left, x + LABEL_OFFSET) } else { (TextAlign::Right, x - LABEL_OFFSET) };

    let alt = if r.on_ground { "GND".to_string() } else { r.altitude_ft.map( |a| format!("{a:.0}")).unwrap_or_else( || "???".to_string()) };
    let gs = r.ground_speed_kt.map( |v| format!("{v:.0}")).unwrap_or_else( || "???".to_string());
    let hdg = r.track_deg.map( |v| format!("{v:.0}")).unwrap_or_else( || "???".to_string());
    let sqk = r.squawk.as_deref().unwrap_or("????");

    out.text( (lx, y + 5.0), r.display_callsign(), color, alpha, align, FontSize::Normal);
    out.text( (lx, y + 18.0), format!("{alt}ft | {gs}kt"), color, alpha, align, FontSize::Small);
    out.text( (lx, y + 30.0), format!("HDG {hdg}° | SQK {sqk}"), color, alpha, align, FontSize::Small);
}
