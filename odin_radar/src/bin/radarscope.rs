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

use std::{fs::File, path::{Path,PathBuf}, sync::{Arc,Mutex}};
use anyhow::{Context, Result};
use clap::Parser;
use lazy_static::lazy_static;
use tracing::info;
use tracing_subscriber::EnvFilter;

use odin_radar::{
    load_config, FeedClient, FeedSource, FrameScheduler, HttpFeedClient, RadarConfig,
    overlay::OverlayData,
    tui::{forward_terminal_events, init_terminal, restore_terminal, TerminalScope}
};

#[derive(Parser,Debug)]
#[command(about="terminal radar scope for ADS-B aircraft.json feeds")]
struct CliOpts {
    /// RON config file (built-in defaults if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// aircraft.json URL, replaces the configured sources
    #[arg(short, long)]
    url: Option<String>,

    /// home latitude in degrees
    #[arg(long, allow_hyphen_values=true)]
    lat: Option<f64>,

    /// home longitude in degrees
    #[arg(long, allow_hyphen_values=true)]
    lon: Option<f64>,

    /// initial scope range in nautical miles
    #[arg(long)]
    range: Option<f64>,

    /// log file (the terminal is used by the scope)
    #[arg(long, default_value="radarscope.log")]
    log: PathBuf,

    /// start with a paused sweep
    #[arg(long)]
    paused: bool,
}

lazy_static! { static ref ARGS: CliOpts = CliOpts::parse(); }

#[tokio::main(flavor="current_thread")]
async fn main()->Result<()> {
    init_logging( &ARGS.log)?;

    let config = get_config()?;
    let overlay = match &config.overlay_file {
        Some(path) => OverlayData::load( path).with_context( || format!("failed to load overlay data from {path:?}"))?,
        None => OverlayData::default()
    };
    let client: Arc<dyn FeedClient> = Arc::new( HttpFeedClient::new( config.fetch_timeout)?);

    let terminal = init_terminal()?;
    let (scheduler, handle) = FrameScheduler::new( config, overlay, client, TerminalScope::new( terminal));
    let input = tokio::spawn( forward_terminal_events( handle.clone()));

    let state = scheduler.run().await;

    handle.shutdown();
    let _ = input.await;
    restore_terminal()?;

    println!("{}", state.stats);
    Ok(())
}

fn init_logging (path: &Path)->Result<()> {
    let file = File::create( path).with_context( || format!("cannot create log file {path:?}"))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else( |_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter( filter)
        .with_ansi( false)
        .with_writer( Mutex::new( file))
        .init();
    Ok(())
}

fn get_config ()->Result<RadarConfig> {
    let mut config = match &ARGS.config {
        Some(path) => load_config( path).with_context( || format!("invalid config {path:?}"))?,
        None => RadarConfig::default()
    };

    if let Some(url) = &ARGS.url {
        config.sources = vec![ FeedSource::new( url, "cli")];
    }
    if let Some(lat) = ARGS.lat { config.home_lat = lat; }
    if let Some(lon) = ARGS.lon { config.home_lon = lon; }
    if let Some(range) = ARGS.range { config.range_nm = range; }
    if ARGS.paused { config.paused = true; }

    config.normalize();
    config.validate()?;
    info!("home {},{} range {}nm, {} sources", config.home_lat, config.home_lon, config.range_nm, config.sources.len());
    Ok(config)
}
