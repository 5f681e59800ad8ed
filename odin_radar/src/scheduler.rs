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

//! the cooperative frame loop. All scope state lives in an explicit [RadarState] that is owned by the
//! [FrameScheduler] task. Fetch cycles run as separate tasks and report back through a channel

use std::{sync::Arc, time::{Duration,Instant}};
use tokio::{select, sync::mpsc, task::AbortHandle, time::{interval, MissedTickBehavior}};
use tokio_util::sync::CancellationToken;
use tracing::{debug,info,warn};

use crate::alerts::{EmergencyAlert, EmergencyMonitor};
use crate::config::RadarConfig;
use crate::errors::{op_failed, Result};
use crate::feed::{sanitize_url, AircraftTable, FeedClient, FeedCycle, FeedIngestor, FeedSource, FeedStatus};
use crate::geo::{HomeReferenceFrame, Viewport};
use crate::overlay::OverlayData;
use crate::render::{DisplayList, RenderOptions, RenderSummary, ScopeFrame, ScopeRenderer};
use crate::stats::{ScopeMetrics, SessionStats};
use crate::sweep::SweepSimulator;
use crate::track::{AircraftSnapshot, DisplayFilter, FrameUpdate, TrackConfig, TrackEngine};

const COMMAND_QUEUE_LEN: usize = 32;

/// user level scope controls
#[derive(Debug,Clone,PartialEq)]
pub enum ScopeCommand {
    TogglePause,
    SetPaused(bool),
    ZoomIn,
    ZoomOut,
    SetRange(f64),
    CycleFilter,
    SetFilter(DisplayFilter),
    ToggleVectors,
    ToggleAirports,
    ToggleNavaids,
    ToggleRunways,
    ToggleLabels,
    SelectNext,
    ClearSelection,
    SetHome { lat: f64, lon: f64 },
    SetSweepPeriod(Duration),
    SetSources(Vec<FeedSource>),
    Resize(Viewport),
    Redraw,
}

/// the non-scope information a display shows next to the rendered scope
pub struct ScopeView<'a> {
    pub aircraft: &'a [AircraftSnapshot],
    pub status: &'a FeedStatus,
    pub stats: &'a SessionStats,
    pub metrics: &'a ScopeMetrics,
    pub alerts: &'a [EmergencyAlert],
    pub options: &'a RenderOptions,
    pub paused: bool,
    pub range_nm: f64,
    pub filter: DisplayFilter,
    pub selected: Option<&'a str>,
    pub sweep_angle: f64,
}

/// the display surface abstraction
pub trait ScopeDisplay {
    /// current pixel dimensions of the scope drawing area
    fn viewport (&self)->Viewport;

    fn present (&mut self, scope: &DisplayList, view: &ScopeView)->Result<()>;
}

/// the explicit state container all components operate on
pub struct RadarState {
    pub config: RadarConfig,
    pub home: HomeReferenceFrame,
    pub viewport: Viewport,
    pub table: AircraftTable,
    pub sweep: SweepSimulator,
    pub engine: TrackEngine,
    pub stats: SessionStats,
    pub emergencies: EmergencyMonitor,
    pub status: FeedStatus,
    pub overlay: OverlayData,
    pub render_options: RenderOptions,
    pub track_config: TrackConfig,
    pub selected: Option<String>,
    pub needs_redraw: bool,

    epoch: Instant,
    last_render: Option<Instant>,
    last_view_update: Option<Instant>,
    snapshot: Vec<AircraftSnapshot>,
    metrics: ScopeMetrics,
    alerts: Vec<EmergencyAlert>,
    frames: u64,
}

impl RadarState {
    pub fn new (config: RadarConfig, overlay: OverlayData, viewport: Viewport, now: Instant)->Self {
        let home = config.home_frame().with_viewport( &viewport, config.scope_padding);

        let mut sweep = SweepSimulator::new( config.sweep_period);
        sweep.set_paused( config.paused);

        RadarState {
            home,
            viewport,
            table: AircraftTable::new(),
            sweep,
            engine: TrackEngine::new(),
            stats: SessionStats::new(),
            emergencies: EmergencyMonitor::new( config.alert_duration),
            status: FeedStatus::Connecting,
            overlay,
            render_options: config.render_options(),
            track_config: config.track_config(),
            selected: None,
            needs_redraw: true,
            epoch: now,
            last_render: None,
            last_view_update: None,
            snapshot: Vec::new(),
            metrics: ScopeMetrics::default(),
            alerts: Vec::new(),
            frames: 0,
            config,
        }
    }

    pub fn frames_rendered (&self)->u64 { self.frames }

    pub fn set_viewport (&mut self, viewport: Viewport) {
        debug!("viewport changed to {}x{}", viewport.width, viewport.height);
        self.viewport = viewport;
        self.home.set_viewport( &viewport, self.config.scope_padding);
        self.needs_redraw = true;
    }

    pub fn set_range (&mut self, range_nm: f64) {
        let range_nm = self.config.clamp_range( range_nm);
        if range_nm != self.home.max_range_nm {
            info!("scope range set to {range_nm}nm");
            self.config.range_nm = range_nm;
            self.home.set_max_range( range_nm);
            let n = self.engine.drop_out_of_range( &self.home);
            if n > 0 { debug!("{n} aircraft out of range") }
        }
        self.needs_redraw = true;
    }

    /// take over the result of a completed (and not stale) fetch cycle
    pub fn apply_feed_cycle (&mut self, cycle: FeedCycle, now: Instant) {
        if cycle.status != self.status {
            if cycle.status.is_error() { warn!("feed status: {}", cycle.status) } else { info!("feed status: {}", cycle.status) }
        }
        self.status = cycle.status;

        match cycle.table {
            Some(table) => {
                self.stats.record_table( &table);
                let new_alerts = self.emergencies.observe( &table, now);
                if !new_alerts.is_empty() {
                    self.alerts = self.emergencies.active_alerts().cloned().collect();
                }
                self.table = table;
                self.needs_redraw = true;
            }
            None => self.stats.record_failed_cycle() // keep the last good table
        }
    }

    pub fn apply_command (&mut self, cmd: ScopeCommand) {
        debug!("scope command {cmd:?}");
        match cmd {
            ScopeCommand::TogglePause => {
                let paused = !self.sweep.is_paused();
                self.sweep.set_paused( paused);
            }
            ScopeCommand::SetPaused(paused) => self.sweep.set_paused( paused),
            ScopeCommand::ZoomIn => self.set_range( self.home.max_range_nm - self.config.range_step_nm),
            ScopeCommand::ZoomOut => self.set_range( self.home.max_range_nm + self.config.range_step_nm),
            ScopeCommand::SetRange(range_nm) => self.set_range( range_nm),
            ScopeCommand::CycleFilter => self.set_filter( self.track_config.filter.next()),
            ScopeCommand::SetFilter(filter) => self.set_filter( filter),
            ScopeCommand::ToggleVectors => self.render_options.show_vectors = !self.render_options.show_vectors,
            ScopeCommand::ToggleAirports => self.render_options.show_airports = !self.render_options.show_airports,
            ScopeCommand::ToggleNavaids => self.render_options.show_navaids = !self.render_options.show_navaids,
            ScopeCommand::ToggleRunways => self.render_options.show_runways = !self.render_options.show_runways,
            ScopeCommand::ToggleLabels => self.render_options.show_labels = !self.render_options.show_labels,
            ScopeCommand::SelectNext => self.selected = self.engine.next_after( self.selected.as_deref()),
            ScopeCommand::ClearSelection => self.selected = None,
            ScopeCommand::SetHome{lat,lon} => {
                if lat.abs() <= 90.0 && lon.abs() <= 180.0 {
                    info!("home set to {lat},{lon}");
                    self.config.home_lat = lat;
                    self.config.home_lon = lon;
                    self.home.set_home( lat, lon);
                    self.engine.clear(); // all bearings changed
                } else {
                    warn!("ignoring invalid home position {lat},{lon}");
                }
            }
            ScopeCommand::SetSweepPeriod(period) => {
                info!("sweep period set to {period:?}");
                self.config.sweep_period = period;
                self.sweep.set_period( period);
                self.render_options.sweep_period = period;
                self.track_config.timeout = self.config.aircraft_timeout();
            }
            ScopeCommand::SetSources(sources) => {
                self.config.sources = sources.into_iter().map( |src| FeedSource { url: sanitize_url( &src.url), ..src }).collect();
                self.status = FeedStatus::Connecting;
            }
            ScopeCommand::Resize(viewport) => self.set_viewport( viewport),
            ScopeCommand::Redraw => {}
        }
        self.needs_redraw = true;
        self.last_view_update = None;
    }

    fn set_filter (&mut self, filter: DisplayFilter) {
        info!("display filter set to {filter}");
        self.track_config.filter = filter;
        self.engine.apply_filter( filter);
    }

    /// advance the sweep and run the track engine. A paused sweep does not illuminate anything but stale
    /// aircraft still expire
    pub fn advance (&mut self, now: Instant)->FrameUpdate {
        let interval = self.sweep.advance( now);

        let upd = if self.sweep.is_paused() {
            let expired = self.engine.expire_stale( self.track_config.timeout, now);
            if expired > 0 { self.needs_redraw = true }
            FrameUpdate { expired, ..FrameUpdate::default() }
        } else {
            self.engine.update( &self.table, &interval, &self.home, &self.track_config, now)
        };

        self.stats.record_tracking( &self.engine);
        upd
    }

    pub fn should_render (&self, now: Instant)->bool {
        self.needs_redraw || !self.sweep.is_paused() || match self.last_render {
            Some(t) => now.saturating_duration_since(t) > self.config.render_floor,
            None => true
        }
    }

    /// emergency aircraft blink with 2Hz
    pub fn blink_on (&self, now: Instant)->bool {
        ((now.saturating_duration_since( self.epoch).as_secs_f64() * 4.0).floor() as u64) % 2 == 1
    }

    pub fn render (&mut self, renderer: &mut ScopeRenderer, out: &mut DisplayList, now: Instant)->RenderSummary {
        let frame = ScopeFrame {
            home: &self.home,
            viewport: self.viewport,
            engine: &self.engine,
            overlay: &self.overlay,
            options: &self.render_options,
            sweep_angle: self.sweep.angle(),
            selected: self.selected.as_deref(),
            blink_on: self.blink_on( now),
            now,
        };
        let summary = renderer.render( &frame, out);

        self.last_render = Some(now);
        self.needs_redraw = false;
        self.frames += 1;
        summary
    }

    /// refresh aircraft list and alerts, at a lower rate than the scope itself
    pub fn refresh_view (&mut self, now: Instant)->bool {
        let due = match self.last_view_update {
            Some(t) => now.saturating_duration_since(t) >= self.config.ui_update_interval,
            None => true
        };
        if due {
            self.snapshot = self.engine.snapshot( now);
            self.metrics = ScopeMetrics::of( &self.snapshot);
            self.emergencies.expire( now);
            self.alerts = self.emergencies.active_alerts().cloned().collect();
            self.last_view_update = Some(now);
        }
        due
    }

    pub fn snapshot (&self)->&[AircraftSnapshot] { self.snapshot.as_slice() }

    pub fn metrics (&self)->&ScopeMetrics { &self.metrics }

    pub fn view (&self)->ScopeView<'_> {
        ScopeView {
            aircraft: &self.snapshot,
            status: &self.status,
            stats: &self.stats,
            metrics: &self.metrics,
            alerts: &self.alerts,
            options: &self.render_options,
            paused: self.sweep.is_paused(),
            range_nm: self.home.max_range_nm,
            filter: self.track_config.filter,
            selected: self.selected.as_deref(),
            sweep_angle: self.sweep.angle(),
        }
    }
}

/// the sending side for scope commands and shutdown
#[derive(Clone)]
pub struct SchedulerHandle {
    cmd_tx: mpsc::Sender<ScopeCommand>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    pub async fn send (&self, cmd: ScopeCommand)->Result<()> {
        self.cmd_tx.send( cmd).await.map_err( |e| op_failed!("scope command not delivered: {:?}", e.0))
    }

    /// non-blocking send, for callers outside of async contexts
    pub fn try_send (&self, cmd: ScopeCommand)->Result<()> {
        self.cmd_tx.try_send( cmd).map_err( |e| op_failed!("scope command not delivered: {e}"))
    }

    pub fn shutdown (&self) { self.cancel.cancel() }

    pub fn is_shut_down (&self)->bool { self.cancel.is_cancelled() }

    pub fn cancellation_token (&self)->CancellationToken { self.cancel.clone() }
}

/// drives fetch cycles, sweep, track engine, rendering and display from a single task
pub struct FrameScheduler<D: ScopeDisplay> {
    state: RadarState,
    ingestor: FeedIngestor,
    renderer: ScopeRenderer,
    display: D,
    display_list: DisplayList,
    cmd_rx: mpsc::Receiver<ScopeCommand>,
    cancel: CancellationToken,
    fetch_task: Option<(u64,AbortHandle)>,
}

impl<D: ScopeDisplay> FrameScheduler<D> {
    pub fn new (config: RadarConfig, overlay: OverlayData, client: Arc<dyn FeedClient>, display: D)->(Self,SchedulerHandle) {
        let ingestor = FeedIngestor::new( client, config.sources.clone(), config.retry_policy());
        let state = RadarState::new( config, overlay, display.viewport(), Instant::now());
        let (cmd_tx, cmd_rx) = mpsc::channel( COMMAND_QUEUE_LEN);
        let cancel = CancellationToken::new();

        let scheduler = FrameScheduler {
            state, ingestor, display, cmd_rx,
            renderer: ScopeRenderer::new(),
            display_list: DisplayList::with_capacity(1024),
            cancel: cancel.clone(),
            fetch_task: None,
        };
        (scheduler, SchedulerHandle { cmd_tx, cancel })
    }

    pub fn state (&self)->&RadarState { &self.state }

    /// run until cancelled, returning the final state
    pub async fn run (mut self)->RadarState {
        let (cycle_tx, mut cycle_rx) = mpsc::channel::<FeedCycle>(4);

        let mut frame_tick = interval( self.state.config.frame_interval);
        frame_tick.set_missed_tick_behavior( MissedTickBehavior::Skip);
        let mut fetch_tick = interval( self.state.config.fetch_interval);
        fetch_tick.set_missed_tick_behavior( MissedTickBehavior::Skip);

        let mut commands_open = true;
        info!("radar scope running with {} feed sources", self.ingestor.sources().len());

        loop {
            select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(cycle) = cycle_rx.recv() => self.complete_fetch_cycle( cycle),

                cmd = self.cmd_rx.recv(), if commands_open => match cmd {
                    Some(cmd) => self.apply_command( cmd),
                    None => { debug!("command channel closed"); commands_open = false }
                },

                _ = fetch_tick.tick() => self.start_fetch_cycle( &cycle_tx),

                _ = frame_tick.tick() => self.frame( Instant::now()),
            }
        }

        if let Some((_,task)) = self.fetch_task.take() {
            task.abort();
        }
        info!("radar scope terminated after {} frames: {}", self.state.frames, self.state.stats);
        self.state
    }

    fn apply_command (&mut self, cmd: ScopeCommand) {
        let sources_changed = matches!( cmd, ScopeCommand::SetSources(_));
        self.state.apply_command( cmd);
        if sources_changed {
            self.ingestor.set_sources( self.state.config.sources.clone());
        }
    }

    fn start_fetch_cycle (&mut self, cycle_tx: &mpsc::Sender<FeedCycle>) {
        // a cycle task that terminated without reporting back must not block polling
        let abandoned = match &self.fetch_task {
            Some((seq,task)) => task.is_finished() && self.ingestor.abandon_cycle( *seq),
            None => false
        };
        if abandoned { self.fetch_task = None }

        if let Some(cycle) = self.ingestor.begin_cycle() {
            let seq = self.ingestor.last_started();
            let cycle_tx = cycle_tx.clone();
            let jh = tokio::spawn( async move {
                let cycle = cycle.await;
                if cycle_tx.send( cycle).await.is_err() {
                    debug!("fetch cycle result dropped");
                }
            });
            self.fetch_task = Some( (seq, jh.abort_handle()));
        }
    }

    fn complete_fetch_cycle (&mut self, cycle: FeedCycle) {
        if self.fetch_task.as_ref().is_some_and( |(seq,_)| *seq == cycle.seq) {
            self.fetch_task = None;
        }
        debug!("fetch cycle {} finished in {:?}: {}", cycle.seq, cycle.elapsed, cycle.status);
        if self.ingestor.complete_cycle( &cycle) {
            self.state.apply_feed_cycle( cycle, Instant::now());
        }
    }

    fn frame (&mut self, now: Instant) {
        let viewport = self.display.viewport();
        if viewport != self.state.viewport {
            self.state.set_viewport( viewport);
        }

        let upd = self.state.advance( now);
        if upd.failed > 0 {
            debug!("{} aircraft failed to update", upd.failed);
        }
        self.state.refresh_view( now);

        if self.state.should_render( now) {
            self.state.render( &mut self.renderer, &mut self.display_list, now);
            let view = self.state.view();
            if let Err(e) = self.display.present( &self.display_list, &view) {
                warn!("scope display failed: {e}");
            }
        }
    }
}
