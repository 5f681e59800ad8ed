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

//! polling of aircraft position feeds. A fetch cycle requests all enabled sources concurrently,
//! retries failed sources with exponential backoff and merges the results into a new [AircraftTable]

use std::{collections::HashMap, fmt, panic::AssertUnwindSafe, sync::{Arc,Mutex,MutexGuard}, time::{Duration,Instant}};
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use reqwest::{Client, header};
use serde::{Deserialize,Serialize};
use tokio::time::{sleep,timeout};
use tracing::{debug,info,trace,warn};
use url::Url;

use crate::errors::{op_failed, OdinRadarError, Result};
use crate::report::{normalize_hex, AircraftReport, DataSourceKind, RawFeed};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/* #region sources ****************************************************************************************/

/// a configured aircraft feed
#[derive(Debug,Clone,PartialEq,Eq,Serialize,Deserialize)]
pub struct FeedSource {
    pub url: String,
    pub name: String,
    #[serde(default="enabled_default")]
    pub enabled: bool,
}
fn enabled_default()->bool { true }

impl FeedSource {
    pub fn new (url: impl AsRef<str>, name: impl ToString)->Self {
        FeedSource { url: sanitize_url( url.as_ref()), name: name.to_string(), enabled: true }
    }

    pub fn is_usable (&self)->bool { self.enabled && is_valid_feed_url( &self.url) }
}

/// we only accept http(s) URLs that look like a tar1090/readsb json endpoint
pub fn is_valid_feed_url (url: &str)->bool {
    match Url::parse( url.trim()) {
        Ok(u) => {
            matches!( u.scheme(), "http" | "https")
                && (u.as_str().contains("aircraft.json") || u.as_str().contains("/data/") || u.path().ends_with(".json"))
        }
        Err(_) => false
    }
}

/// strip surrounding whitespace and any markup brackets
pub fn sanitize_url (url: &str)->String {
    url.trim().chars().filter( |c| *c != '<' && *c != '>').collect()
}

/* #endregion sources */

/* #region aircraft table *********************************************************************************/

/// the merged and validated result of a successful fetch cycle. Keys are normalized identifiers
#[derive(Debug,Clone,Default)]
pub struct AircraftTable {
    reports: HashMap<String,AircraftReport>,
    messages: u64,
    dropped: usize,
}

impl AircraftTable {
    pub fn new ()->Self { AircraftTable::default() }

    pub fn from_reports (reports: impl IntoIterator<Item=AircraftReport>)->Self {
        let mut table = AircraftTable::new();
        for r in reports { table.insert(r); }
        table
    }

    /// first report for an identifier wins, returns false if the identifier was already present
    pub fn insert (&mut self, report: AircraftReport)->bool {
        if self.reports.contains_key( &report.hex) {
            false
        } else {
            self.reports.insert( report.hex.clone(), report);
            true
        }
    }

    pub fn get (&self, hex: &str)->Option<&AircraftReport> {
        normalize_hex(hex).and_then( |k| self.reports.get(&k))
    }

    pub fn iter (&self)->impl Iterator<Item=&AircraftReport> { self.reports.values() }
    pub fn len (&self)->usize { self.reports.len() }
    pub fn is_empty (&self)->bool { self.reports.is_empty() }

    /// sum of the (cumulative) message counters of all contributing sources
    pub fn messages (&self)->u64 { self.messages }

    /// number of records that did not pass validation
    pub fn dropped (&self)->usize { self.dropped }

    pub fn count_by_source (&self, kind: DataSourceKind)->usize {
        self.reports.values().filter( |r| r.source == kind).count()
    }

    pub fn emergencies (&self)->impl Iterator<Item=&AircraftReport> {
        self.reports.values().filter( |r| r.is_emergency())
    }
}

/// merge successful source results in configured order (first source wins for duplicate identifiers).
/// Invalid records are dropped and never claim an identifier
pub fn merge_feeds (outcomes: &[SourceOutcome])->AircraftTable {
    let mut table = AircraftTable::new();

    for outcome in outcomes {
        if let Ok(feed) = &outcome.result {
            let feed_name: Arc<str> = Arc::from( outcome.source.name.as_str());
            table.messages += feed.messages;

            for v in &feed.aircraft {
                match AircraftReport::from_json_value( v, &feed_name) {
                    Some(report) => {
                        if !table.insert( report) {
                            trace!("duplicate aircraft record from {}", outcome.source.name);
                        }
                    }
                    None => table.dropped += 1
                }
            }
        }
    }

    table
}

/* #endregion aircraft table */

/* #region client *****************************************************************************************/

/// the abstraction of how a feed document is retrieved, used to inject mock sources in tests
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch (&self, url: &str)->Result<RawFeed>;
}

/// the live http client. Non-success status codes and undecodable JSON count as failures
pub struct HttpFeedClient {
    client: Client,
}

impl HttpFeedClient {
    pub fn new (request_timeout: Duration)->Result<Self> {
        let client = Client::builder()
            .timeout( request_timeout)
            .user_agent( concat!("odin_radar/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok( HttpFeedClient { client })
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch (&self, url: &str)->Result<RawFeed> {
        let url = Url::parse( url).map_err( |_| OdinRadarError::InvalidUrlError( url.to_string()))?;
        let response = self.client.get( url.clone())
            .header( header::CACHE_CONTROL, "no-cache")
            .header( header::ACCEPT, "application/json")
            .send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err( OdinRadarError::HttpStatusError { url: url.to_string(), status: status.as_u16() })
        }

        let bytes = response.bytes().await?;
        Ok( serde_json::from_slice( &bytes)?)
    }
}

pub type FetchError = Arc<OdinRadarError>;
pub type FetchResult = std::result::Result<Arc<RawFeed>,FetchError>;

/// a (cloneable) pending request that can be awaited by any number of consumers
pub type PendingFetch = Shared<BoxFuture<'static,FetchResult>>;

/// registry of in-flight requests keyed by URL. A request for a URL that is already pending
/// joins the pending one instead of going out again
#[derive(Clone,Default)]
pub struct RequestPool {
    active: Arc<Mutex<HashMap<String,PendingFetch>>>,
}

impl RequestPool {
    pub fn new ()->Self { RequestPool::default() }

    pub fn request (&self, client: &Arc<dyn FeedClient>, url: &str, request_timeout: Duration)->PendingFetch {
        let mut active = lock_registry( &self.active);
        if let Some(pending) = active.get(url) {
            debug!("joining pending request for {url}");
            return pending.clone()
        }

        let client = client.clone();
        let registry = self.active.clone();
        let key = url.to_string();

        let fut = async move {
            let result = match AssertUnwindSafe( timeout( request_timeout, client.fetch( &key))).catch_unwind().await {
                Ok(Ok(Ok(feed))) => Ok( Arc::new(feed)),
                Ok(Ok(Err(e))) => Err( Arc::new(e)),
                Ok(Err(_)) => Err( Arc::new( OdinRadarError::TimeoutError(request_timeout))),
                Err(_) => Err( Arc::new( op_failed!("feed client panicked fetching {key}")))
            };
            lock_registry( &registry).remove( &key);
            result
        }.boxed().shared();

        active.insert( url.to_string(), fut.clone());
        fut
    }

    pub fn in_flight (&self)->usize { lock_registry( &self.active).len() }
}

fn lock_registry (m: &Mutex<HashMap<String,PendingFetch>>)->MutexGuard<'_,HashMap<String,PendingFetch>> {
    m.lock().unwrap_or_else( |poisoned| poisoned.into_inner())
}

/* #endregion client */

/* #region fetch cycle ************************************************************************************/

#[derive(Debug,Clone,PartialEq)]
pub struct RetryPolicy {
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    /// delay before the next attempt after `attempt` (1-based) failed attempts: initial * 2^(attempt-1)
    pub fn retry_delay (&self, attempt: u32)->Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul( 1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default()->Self {
        RetryPolicy { request_timeout: DEFAULT_FETCH_TIMEOUT, max_attempts: DEFAULT_MAX_ATTEMPTS, initial_delay: DEFAULT_INITIAL_RETRY_DELAY }
    }
}

/// what happened to a single source within a cycle
#[derive(Debug,Clone)]
pub struct SourceOutcome {
    pub source: FeedSource,
    pub attempts: u32,
    pub result: FetchResult,
}

impl SourceOutcome {
    pub fn is_ok (&self)->bool { self.result.is_ok() }
}

/// aggregate feed status as shown to the user
#[derive(Debug,Clone,PartialEq,Eq)]
pub enum FeedStatus {
    Connecting,
    Ok,
    Partial { failed: usize },
    AllFailed,
    NoSources,
}

impl FeedStatus {
    pub fn from_outcomes (outcomes: &[SourceOutcome])->Self {
        if outcomes.is_empty() { return FeedStatus::NoSources }

        let failed = outcomes.iter().filter( |o| !o.is_ok()).count();
        if failed == 0 {
            FeedStatus::Ok
        } else if failed < outcomes.len() {
            FeedStatus::Partial { failed }
        } else {
            FeedStatus::AllFailed
        }
    }

    pub fn is_error (&self)->bool { matches!( self, FeedStatus::AllFailed | FeedStatus::NoSources) }
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedStatus::Connecting => write!( f, "Connecting..."),
            FeedStatus::Ok => write!( f, "OK"),
            FeedStatus::Partial { failed } => write!( f, "Partial ({failed} failed)"),
            FeedStatus::AllFailed => write!( f, "Error - All sources failed"),
            FeedStatus::NoSources => write!( f, "Error - No enabled data sources"),
        }
    }
}

/// the result of one fetch cycle. `table` is `None` if no source delivered data
#[derive(Debug)]
pub struct FeedCycle {
    pub seq: u64,
    pub outcomes: Vec<SourceOutcome>,
    pub table: Option<AircraftTable>,
    pub status: FeedStatus,
    pub elapsed: Duration,
}

impl FeedCycle {
    pub fn failed_sources (&self)->impl Iterator<Item=&SourceOutcome> {
        self.outcomes.iter().filter( |o| !o.is_ok())
    }
}

/// fetch a single source with bounded exponential backoff
pub async fn fetch_source (client: Arc<dyn FeedClient>, pool: RequestPool, source: FeedSource, policy: RetryPolicy)->SourceOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match pool.request( &client, &source.url, policy.request_timeout).await {
            Ok(feed) => {
                trace!("source '{}' delivered {} records", source.name, feed.aircraft.len());
                return SourceOutcome { source, attempts, result: Ok(feed) }
            }
            Err(e) => {
                if attempts >= max_attempts {
                    warn!("source '{}' failed after {} attempts: {}", source.name, attempts, e);
                    return SourceOutcome { source, attempts, result: Err(e) }
                }
                let delay = policy.retry_delay( attempts);
                debug!("source '{}' attempt {} failed: {}, retry in {:?}", source.name, attempts, e, delay);
                sleep( delay).await;
            }
        }
    }
}

/// run one complete fetch cycle over all enabled sources with valid URLs
pub async fn fetch_cycle (client: Arc<dyn FeedClient>, pool: RequestPool, sources: Vec<FeedSource>, policy: RetryPolicy, seq: u64)->FeedCycle {
    let started = Instant::now();

    let usable: Vec<FeedSource> = sources.into_iter()
        .filter( |s| s.enabled)
        .filter( |s| {
            let valid = is_valid_feed_url( &s.url);
            if !valid { debug!("skipping source '{}' with invalid url {}", s.name, s.url) }
            valid
        })
        .collect();

    if usable.is_empty() {
        return FeedCycle { seq, outcomes: Vec::new(), table: None, status: FeedStatus::NoSources, elapsed: started.elapsed() }
    }

    let outcomes = join_all( usable.into_iter().map( |src| {
        fetch_source( client.clone(), pool.clone(), src, policy.clone())
    })).await;

    let status = FeedStatus::from_outcomes( &outcomes);
    let table = if outcomes.iter().any( |o| o.is_ok()) { Some( merge_feeds( &outcomes)) } else { None };

    FeedCycle { seq, outcomes, table, status, elapsed: started.elapsed() }
}

/* #endregion fetch cycle */

/// owner of the source list and the cycle bookkeeping. Cycles are single flight (no new cycle is started
/// while one is pending) and carry monotonic sequence numbers so that late results can be discarded
pub struct FeedIngestor {
    client: Arc<dyn FeedClient>,
    pool: RequestPool,
    sources: Vec<FeedSource>,
    policy: RetryPolicy,
    next_seq: u64,
    in_flight: Option<u64>,
    last_applied: u64,
}

impl FeedIngestor {
    pub fn new (client: Arc<dyn FeedClient>, sources: Vec<FeedSource>, policy: RetryPolicy)->Self {
        FeedIngestor { client, pool: RequestPool::new(), sources, policy, next_seq: 0, in_flight: None, last_applied: 0 }
    }

    pub fn sources (&self)->&[FeedSource] { self.sources.as_slice() }

    pub fn set_sources (&mut self, sources: Vec<FeedSource>) {
        info!("feed sources changed: {}", sources.iter().map( |s| s.name.as_str()).collect::<Vec<_>>().join(", "));
        self.sources = sources;
    }

    pub fn policy (&self)->&RetryPolicy { &self.policy }

    pub fn is_in_flight (&self)->bool { self.in_flight.is_some() }

    pub fn last_applied (&self)->u64 { self.last_applied }

    /// sequence number of the most recently started cycle
    pub fn last_started (&self)->u64 { self.next_seq }

    /// start a new cycle unless one is still pending. The returned future does not borrow the ingestor
    pub fn begin_cycle (&mut self)->Option<BoxFuture<'static,FeedCycle>> {
        if let Some(seq) = self.in_flight {
            trace!("fetch cycle {seq} still in flight");
            return None
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        self.in_flight = Some(seq);

        Some( fetch_cycle( self.client.clone(), self.pool.clone(), self.sources.clone(), self.policy.clone(), seq).boxed())
    }

    /// book-keep a finished cycle. Returns true if its result is newer than anything applied so far
    pub fn complete_cycle (&mut self, cycle: &FeedCycle)->bool {
        if self.in_flight == Some(cycle.seq) {
            self.in_flight = None;
        }

        if cycle.seq > self.last_applied {
            self.last_applied = cycle.seq;
            true
        } else {
            debug!("discarding stale fetch cycle {} (last applied {})", cycle.seq, self.last_applied);
            false
        }
    }

    /// give up on a started cycle whose result will never arrive, so that the next one can start.
    /// Returns false if `seq` is not the pending cycle
    pub fn abandon_cycle (&mut self, seq: u64)->bool {
        if self.in_flight == Some(seq) {
            warn!("fetch cycle {seq} terminated without result");
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    /// begin, await and complete a cycle in place
    pub async fn run_cycle (&mut self)->Option<FeedCycle> {
        let fut = self.begin_cycle()?;
        let cycle = fut.await;
        if self.complete_cycle( &cycle) { Some(cycle) } else { None }
    }
}
