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

//! terminal scope display. The scope is painted into a braille canvas (2x4 dots per cell, which gives
//! roughly square dots), aircraft list and feed status are shown in a side panel

use std::{io, panic};
use futures::StreamExt;
use crossterm::{
    event::{Event as CrosstermEvent, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen}
};
use ratatui::prelude::*;
use ratatui::symbols::Marker;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use ratatui::widgets::canvas::{Canvas, Circle, Context, Line as CanvasLine, Points, Rectangle};
use tokio::select;
use tracing::{debug,warn};

use crate::errors::Result;
use crate::geo::Viewport;
use crate::render::{DisplayList, Rgb, Shape, Stroke, TextAlign};
use crate::scheduler::{ScopeCommand, ScopeDisplay, ScopeView, SchedulerHandle};
use crate::stats::or_na;

/// percentage of the terminal width used for the scope
const SCOPE_SHARE: u16 = 65;
const DASH_LEN: f64 = 5.0;

pub struct TerminalScope<B: Backend> {
    terminal: Terminal<B>,
}

impl<B: Backend> TerminalScope<B> {
    pub fn new (terminal: Terminal<B>)->Self {
        TerminalScope { terminal }
    }
}

fn split_areas (area: Rect)->(Rect,Rect,Rect) {
    let [scope, side] = Layout::horizontal([Constraint::Percentage(SCOPE_SHARE), Constraint::Min(20)]).areas(area);
    let [status, list] = Layout::vertical([Constraint::Length(13), Constraint::Min(3)]).areas(side);
    (scope, status, list)
}

/// braille dot resolution of the scope canvas (inside its border)
fn scope_viewport (area: Rect)->Viewport {
    let (scope,_,_) = split_areas( area);
    let cols = scope.width.saturating_sub(2) as f64;
    let rows = scope.height.saturating_sub(2) as f64;
    Viewport::new( cols * 2.0, rows * 4.0)
}

impl<B: Backend> ScopeDisplay for TerminalScope<B> {
    fn viewport (&self)->Viewport {
        match self.terminal.size() {
            Ok(size) => scope_viewport( Rect::new( 0, 0, size.width, size.height)),
            Err(e) => { warn!("cannot get terminal size: {e}"); Viewport::default() }
        }
    }

    fn present (&mut self, scope: &DisplayList, view: &ScopeView)->Result<()> {
        let bg = view.options.palette.background;
        let text = to_color( view.options.palette.text);

        self.terminal.draw( |frame| {
            let (scope_area, status_area, list_area) = split_areas( frame.area());
            let vp = scope_viewport( frame.area());

            let title = format!(" {}nm {} ", view.range_nm, if view.paused { "PAUSED" } else { "" });
            let canvas = Canvas::default()
                .block( Block::default().borders(Borders::ALL).title(title))
                .marker( Marker::Braille)
                .background_color( to_color(bg))
                .x_bounds([0.0, vp.width])
                .y_bounds([0.0, vp.height])
                .paint( |ctx| {
                    for shape in scope.iter() {
                        paint_shape( ctx, shape, vp.height, bg);
                    }
                });
            frame.render_widget( canvas, scope_area);

            frame.render_widget( status_panel( view, text), status_area);
            frame.render_widget( aircraft_table( view, text), list_area);
        })?;
        Ok(())
    }
}

fn to_color (c: Rgb)->Color { Color::Rgb( c.0, c.1, c.2) }

fn stroke_color (stroke: &Stroke, bg: Rgb)->Color { to_color( stroke.color.blend( bg, stroke.alpha)) }

/// canvas y grows upwards, scope y grows downwards
fn paint_shape (ctx: &mut Context, shape: &Shape, h: f64, bg: Rgb) {
    match shape {
        Shape::Fill{..} => {} // canvas background
        Shape::Line{from,to,stroke} => {
            paint_line( ctx, *from, *to, stroke, h, bg);
        }
        Shape::Circle{center,radius,stroke,filled} => {
            let color = stroke_color( stroke, bg);
            ctx.draw( &Circle { x: center.0, y: h - center.1, radius: *radius, color });
            if *filled {
                ctx.draw( &Points { coords: &[(center.0, h - center.1)], color });
            }
        }
        Shape::Rect{x,y,width,height,stroke,..} => {
            let color = stroke_color( stroke, bg);
            ctx.draw( &Rectangle { x: *x, y: h - (y + height), width: *width, height: *height, color });
        }
        Shape::Polygon{points,stroke,..} => {
            for (i,p) in points.iter().enumerate() {
                let q = points[(i + 1) % points.len()];
                paint_line( ctx, *p, q, stroke, h, bg);
            }
        }
        Shape::Text{pos,text,color,alpha,align,..} => {
            let w = text.chars().count() as f64 * 2.0; // two braille dots per character
            let x = match align {
                TextAlign::Left => pos.0,
                TextAlign::Center => pos.0 - w / 2.0,
                TextAlign::Right => pos.0 - w,
            };
            let style = Style::default().fg( to_color( color.blend( bg, *alpha)));
            ctx.print( x, h - pos.1, Line::styled( text.clone(), style));
        }
    }
}

fn paint_line (ctx: &mut Context, from: (f64,f64), to: (f64,f64), stroke: &Stroke, h: f64, bg: Rgb) {
    let color = stroke_color( stroke, bg);

    if stroke.dashed {
        let (dx,dy) = (to.0 - from.0, to.1 - from.1);
        let len = dx.hypot(dy);
        if len <= 0.0 { return }

        let mut d = 0.0;
        while d < len {
            let d1 = (d + DASH_LEN).min(len);
            let (x1,y1) = (from.0 + dx * d / len, from.1 + dy * d / len);
            let (x2,y2) = (from.0 + dx * d1 / len, from.1 + dy * d1 / len);
            ctx.draw( &CanvasLine::new( x1, h - y1, x2, h - y2, color));
            d += 2.0 * DASH_LEN;
        }
    } else {
        ctx.draw( &CanvasLine::new( from.0, h - from.1, to.0, h - to.1, color));
    }
}

fn status_panel<'a> (view: &'a ScopeView, text: Color)->Paragraph<'a> {
    let stats = view.stats;
    let mut lines = vec![
        Line::from( format!("feed: {}", view.status)),
        Line::from( format!("range: {}nm  filter: {}  sweep: {:.0}°", view.range_nm, view.filter, view.sweep_angle)),
        Line::from( format!("tracked: {} (peak {})  unique: {}", stats.tracked, stats.peak_concurrent, stats.unique_aircraft())),
        Line::from( format!("adsb/mlat/other: {}/{}/{}  msgs: {}", stats.distribution.adsb, stats.distribution.mlat, stats.distribution.other, stats.messages)),
    ];
    lines.extend( metrics_lines( view));
    for alert in view.alerts {
        lines.push( Line::styled( alert.to_string(), Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)));
    }

    Paragraph::new( lines)
        .style( Style::default().fg(text))
        .block( Block::default().borders(Borders::ALL).title(" status "))
}

fn metrics_lines (view: &ScopeView)->Vec<Line<'static>> {
    let m = view.metrics;
    let avg_alt = m.avg_altitude_ft.map( |a| format!("{a:.0}ft"));
    let avg_gs = m.avg_speed_kt.map( |v| format!("{v:.0}kt"));

    vec![
        Line::from( format!("uptime: {:.1}min  ground/air: {}/{}  emerg: {}", view.stats.uptime_minutes(), m.ground, m.airborne, m.emergencies)),
        Line::from( format!("mil/civ: {}/{}  squawks: {}", m.military, m.civilian, m.unique_squawks)),
        Line::from( format!("avg alt: {}  avg gs: {}", or_na( &avg_alt), or_na( &avg_gs))),
        Line::from( format!("closest: {}  fastest: {}", or_na( &m.closest), or_na( &m.fastest))),
        Line::from( format!("highest: {}  lowest: {}", or_na( &m.highest), or_na( &m.lowest))),
    ]
}

fn aircraft_table<'a> (view: &'a ScopeView, text: Color)->Table<'a> {
    let header = Row::new( ["callsign", "hex", "alt", "gs", "nm", "src"]).style( Style::default().add_modifier(Modifier::BOLD));

    let rows = view.aircraft.iter().map( |ac| {
        let alt = if ac.on_ground { "GND".to_string() } else { ac.altitude_ft.map( |a| format!("{a:.0}")).unwrap_or_default() };
        let style = if view.selected == Some( ac.hex.as_str()) {
            Style::default().add_modifier( Modifier::REVERSED)
        } else if ac.emergency {
            Style::default().fg( Color::Red)
        } else {
            Style::default()
        };

        Row::new( vec![
            Cell::from( ac.callsign.clone().unwrap_or_else( || "N/A".to_string())),
            Cell::from( ac.hex.clone()),
            Cell::from( alt),
            Cell::from( ac.ground_speed_kt.map( |v| format!("{v:.0}")).unwrap_or_default()),
            Cell::from( format!("{:.1}", ac.distance_nm)),
            Cell::from( ac.source.to_string()),
        ]).style( style)
    });

    let widths = [Constraint::Length(9), Constraint::Length(7), Constraint::Length(6), Constraint::Length(4), Constraint::Length(6), Constraint::Length(6)];
    Table::new( rows, widths)
        .header( header)
        .style( Style::default().fg(text))
        .block( Block::default().borders(Borders::ALL).title( format!(" aircraft ({}) ", view.aircraft.len())))
}

/* #region terminal input */

#[derive(Debug,Clone,PartialEq)]
pub enum KeyAction {
    Quit,
    Command(ScopeCommand),
}

pub fn key_action (key: &KeyEvent)->Option<KeyAction> {
    if key.kind != KeyEventKind::Press { return None }

    let cmd = match key.code {
        KeyCode::Char('c') if key.modifiers.contains( KeyModifiers::CONTROL) => return Some(KeyAction::Quit),
        KeyCode::Char('q') | KeyCode::Esc => return Some(KeyAction::Quit),
        KeyCode::Char(' ') | KeyCode::Char('p') => ScopeCommand::TogglePause,
        KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Up => ScopeCommand::ZoomIn,
        KeyCode::Char('-') | KeyCode::Down => ScopeCommand::ZoomOut,
        KeyCode::Char('f') => ScopeCommand::CycleFilter,
        KeyCode::Char('v') => ScopeCommand::ToggleVectors,
        KeyCode::Char('a') => ScopeCommand::ToggleAirports,
        KeyCode::Char('n') => ScopeCommand::ToggleNavaids,
        KeyCode::Char('r') => ScopeCommand::ToggleRunways,
        KeyCode::Char('l') => ScopeCommand::ToggleLabels,
        KeyCode::Tab => ScopeCommand::SelectNext,
        KeyCode::Backspace => ScopeCommand::ClearSelection,
        _ => return None
    };
    Some( KeyAction::Command(cmd))
}

/// map terminal events to scope commands until the user quits or the scheduler is shut down
pub async fn forward_terminal_events (handle: SchedulerHandle) {
    let cancel = handle.cancellation_token();
    let mut events = EventStream::new();

    loop {
        select! {
            _ = cancel.cancelled() => break,
            ev = events.next() => match ev {
                Some(Ok(CrosstermEvent::Key(key))) => match key_action( &key) {
                    Some(KeyAction::Quit) => {
                        debug!("quit requested");
                        handle.shutdown();
                        break
                    }
                    Some(KeyAction::Command(cmd)) => {
                        if let Err(e) = handle.send( cmd).await { warn!("{e}") }
                    }
                    None => {}
                }
                Some(Ok(CrosstermEvent::Resize(..))) => {
                    if let Err(e) = handle.send( ScopeCommand::Redraw).await { warn!("{e}") }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!("terminal event error: {e}"),
                None => break
            }
        }
    }
}

/* #endregion terminal input */

/// switch the terminal into raw mode on the alternate screen
pub fn init_terminal ()->io::Result<Terminal<CrosstermBackend<io::Stderr>>> {
    let backend = CrosstermBackend::new( io::stderr());
    let mut terminal = Terminal::new( backend)?;

    terminal::enable_raw_mode()?;
    crossterm::execute!( io::stderr(), EnterAlternateScreen)?;

    let panic_hook = panic::take_hook();
    panic::set_hook( Box::new( move |info| {
        let _ = restore_terminal();
        panic_hook(info);
    }));

    terminal.hide_cursor()?;
    terminal.clear()?;
    Ok(terminal)
}

pub fn restore_terminal ()->io::Result<()> {
    terminal::disable_raw_mode()?;
    crossterm::execute!( io::stderr(), LeaveAlternateScreen)?;
    Ok(())
}
