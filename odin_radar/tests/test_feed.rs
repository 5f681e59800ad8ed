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

use std::{collections::HashMap, sync::{Arc, atomic::{AtomicUsize,Ordering}}, time::{Duration,Instant}};
use async_trait::async_trait;
use serde_json::json;
use odin_radar::{
    alerts::EmergencyMonitor,
    errors::{OdinRadarError,Result},
    feed::*,
    report::{DataSourceKind, RawFeed},
    stats::{SessionStats, SourceDistribution},
};

// run with "cargo test --test test_feed -- --nocapture"

/// serves canned documents per URL, URLs without a document fail with a 503
struct MockClient {
    docs: HashMap<String,String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockClient {
    fn new (docs: &[(&str,&str)], delay: Duration)->Self {
        let docs = docs.iter().map( |(u,d)| (u.to_string(), d.to_string())).collect();
        MockClient { docs, delay, calls: AtomicUsize::new(0) }
    }

    fn calls (&self)->usize { self.calls.load( Ordering::SeqCst) }
}

#[async_trait]
impl FeedClient for MockClient {
    async fn fetch (&self, url: &str)->Result<RawFeed> {
        self.calls.fetch_add( 1, Ordering::SeqCst);
        if !self.delay.is_zero() { tokio::time::sleep( self.delay).await; }

        match self.docs.get(url) {
            Some(doc) => RawFeed::from_json( doc),
            None => Err( OdinRadarError::HttpStatusError { url: url.to_string(), status: 503 })
        }
    }
}

const URL_A: &str = "http://radar-a.local/tar1090/data/aircraft.json";
const URL_B: &str = "https://radar-b.local/data/aircraft.json";
const URL_DOWN: &str = "http://offline.local/data/aircraft.json";

const DOC_A: &str = r#"{
    "now": 1700000000.0,
    "messages": 1000,
    "aircraft": [
        { "hex": "a1b2c3", "flight": "UAL123  ", "lat": 40.1, "lon": -74.9, "alt_baro": 35000, "gs": 450.2, "track": 270.0, "squawk": "1200", "version": 2 },
        { "hex": "ae1234", "lat": 40.2, "lon": -75.1, "alt_baro": "ground", "mlat": ["lat","lon"] },
        { "hex": "bad001", "lat": 200.0, "lon": -75.0, "alt_baro": 1000 },
        { "hex": "  ", "lat": 40.0, "lon": -75.0, "alt_baro": 1000 },
        { "hex": "c0ffee", "alt_baro": 1000 },
        { "hex": "d00d00", "lat": 40.3, "lon": -75.2, "alt_baro": 8000, "squawk": 7700 }
    ]
}"#;

const DOC_B: &str = r#"{
    "messages": 234,
    "aircraft": [
        { "hex": "A1B2C3", "flight": "OTHER", "lat": 41.0, "lon": -74.0, "alt_baro": 12000 },
        { "hex": "bad001", "lat": 40.5, "lon": -75.5, "alt_baro": 5000, "version": 0 }
    ]
}"#;

fn fast_policy ()->RetryPolicy {
    RetryPolicy { request_timeout: Duration::from_secs(1), max_attempts: 3, initial_delay: Duration::from_millis(1) }
}

fn client (docs: &[(&str,&str)])->Arc<MockClient> { Arc::new( MockClient::new( docs, Duration::ZERO)) }

#[test]
fn test_feed_url_validation () {
    assert!( is_valid_feed_url( URL_A));
    assert!( is_valid_feed_url( URL_B));
    assert!( is_valid_feed_url( "http://192.168.1.10:8080/skyaware/data.json"));
    assert!( !is_valid_feed_url( "ftp://radar.local/data/aircraft.json"));
    assert!( !is_valid_feed_url( "http://radar.local/index.html"));
    assert!( !is_valid_feed_url( "not a url"));

    assert_eq!( sanitize_url( "  <http://radar.local/data/aircraft.json> "), "http://radar.local/data/aircraft.json");
    let src = FeedSource::new( " <http://radar.local/data/aircraft.json>", "local");
    assert_eq!( src.url, "http://radar.local/data/aircraft.json");
    assert!( src.is_usable());
    assert!( !FeedSource { enabled: false, ..src }.is_usable());
}

#[test]
fn test_retry_delay () {
    let policy = RetryPolicy::default();
    assert_eq!( policy.max_attempts, 3);
    assert_eq!( policy.retry_delay(1), Duration::from_secs(1));
    assert_eq!( policy.retry_delay(2), Duration::from_secs(2));
    assert_eq!( policy.retry_delay(3), Duration::from_secs(4));
}

#[test]
fn test_report_decoding () {
    let feed = RawFeed::from_json( DOC_A).unwrap();
    assert_eq!( feed.messages, 1000);
    assert_eq!( feed.aircraft.len(), 6);

    let name: Arc<str> = Arc::from("a");
    let reports: Vec<_> = feed.reports( &name).collect();
    for r in &reports { println!("{r}") }
    assert_eq!( reports.len(), 3); // out of range lat, blank hex and missing position are dropped

    let ual = reports.iter().find( |r| r.hex == "A1B2C3").unwrap();
    assert_eq!( ual.callsign.as_deref(), Some("UAL123"));
    assert_eq!( ual.source, DataSourceKind::Adsb);
    assert_eq!( ual.altitude_ft, Some(35000.0));
    assert!( !ual.is_emergency());

    let mil = reports.iter().find( |r| r.hex == "AE1234").unwrap();
    assert_eq!( mil.source, DataSourceKind::Mlat);
    assert!( mil.on_ground);
    assert_eq!( mil.display_callsign(), "N/A");

    let emergency = reports.iter().find( |r| r.hex == "D00D00").unwrap();
    assert_eq!( emergency.squawk.as_deref(), Some("7700"));
    assert_eq!( emergency.source, DataSourceKind::Other);
    assert!( emergency.is_emergency());

    assert!( RawFeed::from_json( "{ not json").is_err());
}

#[test]
fn test_merge_first_source_wins () {
    let feed_a = Arc::new( RawFeed::from_json( DOC_A).unwrap());
    let feed_b = Arc::new( RawFeed::from_json( DOC_B).unwrap());
    let outcomes = vec![
        SourceOutcome { source: FeedSource::new( URL_A, "a"), attempts: 1, result: Ok(feed_a) },
        SourceOutcome { source: FeedSource::new( URL_DOWN, "down"), attempts: 3,
                        result: Err( Arc::new( OdinRadarError::TimeoutError( Duration::from_secs(5)))) },
        SourceOutcome { source: FeedSource::new( URL_B, "b"), attempts: 1, result: Ok(feed_b) },
    ];

    let table = merge_feeds( &outcomes);
    assert_eq!( table.messages(), 1234);
    assert_eq!( table.len(), 4);
    assert_eq!( table.dropped(), 3);

    let dup = table.get( "a1b2c3").unwrap();
    assert_eq!( dup.callsign.as_deref(), Some("UAL123"));
    assert_eq!( &*dup.feed, "a");

    // the invalid record of source a does not block the valid one of source b
    let late = table.get( "BAD001").unwrap();
    assert_eq!( &*late.feed, "b");
    assert_eq!( late.source, DataSourceKind::Adsb);

    assert_eq!( table.emergencies().count(), 1);
    assert_eq!( SourceDistribution::of( &table), SourceDistribution { adsb: 2, mlat: 1, other: 1 });
    assert_eq!( FeedStatus::from_outcomes( &outcomes), FeedStatus::Partial { failed: 1 });
}

#[tokio::test]
async fn test_cycle_all_ok () {
    let client = client( &[(URL_A, DOC_A), (URL_B, DOC_B)]);
    let sources = vec![ FeedSource::new( URL_A, "a"), FeedSource::new( URL_B, "b")];

    let cycle = fetch_cycle( client.clone(), RequestPool::new(), sources, fast_policy(), 1).await;
    println!("cycle {} status {} in {:?}", cycle.seq, cycle.status, cycle.elapsed);
    assert_eq!( cycle.status, FeedStatus::Ok);
    assert_eq!( cycle.status.to_string(), "OK");
    assert_eq!( cycle.table.as_ref().map( |t| t.len()), Some(4));
    assert!( cycle.outcomes.iter().all( |o| o.attempts == 1));
    assert_eq!( client.calls(), 2);
}

#[tokio::test]
async fn test_cycle_partial_and_failed () {
    let client = client( &[(URL_A, DOC_A)]);
    let policy = fast_policy();

    let cycle = fetch_cycle( client.clone(), RequestPool::new(), vec![ FeedSource::new( URL_DOWN, "down")], policy.clone(), 1).await;
    assert_eq!( cycle.status, FeedStatus::AllFailed);
    assert_eq!( cycle.status.to_string(), "Error - All sources failed");
    assert!( cycle.status.is_error());
    assert!( cycle.table.is_none());
    assert_eq!( cycle.outcomes[0].attempts, 3);
    assert_eq!( client.calls(), 3);

    let sources = vec![ FeedSource::new( URL_A, "a"), FeedSource::new( URL_DOWN, "down")];
    let cycle = fetch_cycle( client.clone(), RequestPool::new(), sources, policy, 2).await;
    assert_eq!( cycle.status, FeedStatus::Partial { failed: 1 });
    assert_eq!( cycle.status.to_string(), "Partial (1 failed)");
    assert!( !cycle.status.is_error());
    assert_eq!( cycle.table.as_ref().map( |t| t.len()), Some(3));
    let failed: Vec<&str> = cycle.failed_sources().map( |o| o.source.name.as_str()).collect();
    assert_eq!( failed, vec!["down"]);
}

#[tokio::test]
async fn test_cycle_without_usable_sources () {
    let client = client( &[(URL_A, DOC_A)]);
    let mut disabled = FeedSource::new( URL_A, "a");
    disabled.enabled = false;
    let sources = vec![ disabled, FeedSource::new( "http://radar.local/index.html", "bogus")];

    let cycle = fetch_cycle( client.clone(), RequestPool::new(), sources, fast_policy(), 1).await;
    assert_eq!( cycle.status, FeedStatus::NoSources);
    assert_eq!( cycle.status.to_string(), "Error - No enabled data sources");
    assert!( cycle.table.is_none());
    assert_eq!( client.calls(), 0);
}

#[tokio::test]
async fn test_request_timeout () {
    let client = Arc::new( MockClient::new( &[(URL_A, DOC_A)], Duration::from_millis(500)));
    let policy = RetryPolicy { request_timeout: Duration::from_millis(20), max_attempts: 1, initial_delay: Duration::from_millis(1) };

    let outcome = fetch_source( client.clone(), RequestPool::new(), FeedSource::new( URL_A, "slow"), policy).await;
    match &outcome.result {
        Err(e) => assert!( matches!( e.as_ref(), OdinRadarError::TimeoutError(_)), "unexpected error {e}"),
        Ok(_) => panic!("slow source should have timed out")
    }
}

#[tokio::test]
async fn test_request_pool_dedup () {
    let mock = Arc::new( MockClient::new( &[(URL_A, DOC_A)], Duration::from_millis(30)));
    let client: Arc<dyn FeedClient> = mock.clone();
    let pool = RequestPool::new();

    let r1 = pool.request( &client, URL_A, Duration::from_secs(1));
    let r2 = pool.request( &client, URL_A, Duration::from_secs(1));
    assert_eq!( pool.in_flight(), 1);

    let (a,b) = futures::join!( r1, r2);
    assert!( a.is_ok() && b.is_ok());
    assert_eq!( mock.calls(), 1);
    assert_eq!( pool.in_flight(), 0);

    // completed requests are not cached
    pool.request( &client, URL_A, Duration::from_secs(1)).await.unwrap();
    assert_eq!( mock.calls(), 2);
}

#[tokio::test]
async fn test_ingestor_single_flight () {
    let mock = Arc::new( MockClient::new( &[(URL_A, DOC_A)], Duration::from_millis(10)));
    let mut ingestor = FeedIngestor::new( mock.clone(), vec![ FeedSource::new( URL_A, "a")], fast_policy());

    let pending = ingestor.begin_cycle().expect("first cycle should start");
    assert!( ingestor.is_in_flight());
    assert!( ingestor.begin_cycle().is_none());

    let cycle = pending.await;
    assert_eq!( cycle.seq, 1);
    assert!( ingestor.complete_cycle( &cycle));
    assert!( !ingestor.is_in_flight());
    assert_eq!( ingestor.last_applied(), 1);

    // a late duplicate of an already applied cycle is discarded
    let stale = FeedCycle { seq: 1, outcomes: Vec::new(), table: None, status: FeedStatus::AllFailed, elapsed: Duration::ZERO };
    assert!( !ingestor.complete_cycle( &stale));

    let next = ingestor.run_cycle().await.expect("second cycle should apply");
    assert_eq!( next.seq, 2);
    assert_eq!( ingestor.last_applied(), 2);
    assert_eq!( mock.calls(), 2);
}

#[tokio::test]
async fn test_ingestor_abandoned_cycle () {
    let mock = client( &[(URL_A, DOC_A)]);
    let mut ingestor = FeedIngestor::new( mock.clone(), vec![ FeedSource::new( URL_A, "a")], fast_policy());

    // the task running this cycle went away without delivering a result
    drop( ingestor.begin_cycle().expect("first cycle should start"));
    assert_eq!( ingestor.last_started(), 1);
    assert!( ingestor.begin_cycle().is_none());

    assert!( !ingestor.abandon_cycle( 2));
    assert!( ingestor.is_in_flight());
    assert!( ingestor.abandon_cycle( 1));
    assert!( !ingestor.is_in_flight());

    let next = ingestor.run_cycle().await.expect("polling should resume");
    assert_eq!( next.seq, 2);
    assert_eq!( next.status, FeedStatus::Ok);
    assert_eq!( ingestor.last_applied(), 2);
}

struct PanickingClient;

#[async_trait]
impl FeedClient for PanickingClient {
    async fn fetch (&self, url: &str)->Result<RawFeed> { panic!("client failure for {url}") }
}

#[tokio::test]
async fn test_client_panic_fails_source () {
    let mut ingestor = FeedIngestor::new( Arc::new( PanickingClient), vec![ FeedSource::new( URL_A, "a")], fast_policy());

    for seq in 1..=2 {
        let cycle = ingestor.run_cycle().await.expect("cycle should complete");
        println!("cycle {seq}: {}", cycle.status);
        assert_eq!( cycle.seq, seq);
        assert_eq!( cycle.status, FeedStatus::AllFailed);
        assert!( cycle.table.is_none());

        let outcome = &cycle.outcomes[0];
        assert_eq!( outcome.attempts, 3);
        match &outcome.result {
            Err(e) => assert!( matches!( **e, OdinRadarError::OpFailedError(_))),
            Ok(_) => panic!("panicking client should not deliver a feed")
        }
    }
    assert!( !ingestor.is_in_flight());
}

#[test]
fn test_emergency_alerts () {
    let feed = Arc::new( RawFeed::from_json( DOC_A).unwrap());
    let table = merge_feeds( &[ SourceOutcome { source: FeedSource::new( URL_A, "a"), attempts: 1, result: Ok(feed) }]);

    let t0 = Instant::now();
    let mut monitor = EmergencyMonitor::new( Duration::from_secs(6));

    let alerts = monitor.observe( &table, t0);
    assert_eq!( alerts.len(), 1);
    assert_eq!( alerts[0].to_string(), "EMERGENCY D00D00 squawk 7700");
    assert!( monitor.is_active( "D00D00"));

    // no repeat while the alert is active
    assert!( monitor.observe( &table, t0 + Duration::from_secs(3)).is_empty());

    // a still squawking aircraft raises a new alert once the old one expired
    let alerts = monitor.observe( &table, t0 + Duration::from_secs(6));
    assert_eq!( alerts.len(), 1);

    monitor.expire( t0 + Duration::from_secs(20));
    assert!( monitor.is_empty());
}

#[test]
fn test_session_stats () {
    let feed_a = Arc::new( RawFeed::from_json( DOC_A).unwrap());
    let feed_b = Arc::new( RawFeed::from_json( DOC_B).unwrap());
    let table_a = merge_feeds( &[ SourceOutcome { source: FeedSource::new( URL_A, "a"), attempts: 1, result: Ok(feed_a) }]);
    let table_b = merge_feeds( &[ SourceOutcome { source: FeedSource::new( URL_B, "b"), attempts: 1, result: Ok(feed_b) }]);

    let mut stats = SessionStats::new();
    stats.record_table( &table_a);
    stats.record_failed_cycle();
    stats.record_table( &table_b);
    println!("{stats}");

    assert_eq!( stats.cycles, 3);
    assert_eq!( stats.failed_cycles, 1);
    assert_eq!( stats.unique_aircraft(), 4); // A1B2C3 is seen twice
    assert_eq!( stats.in_table, 2);
    assert_eq!( stats.messages, 234);
    assert_eq!( stats.dropped_records, 3);
    assert_eq!( stats.military, 0);
    assert_eq!( stats.distribution.total(), 2);
}
