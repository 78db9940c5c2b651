//! Feed lifecycle through the hub: shared generators, reference counting and
//! stop-on-last-release.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use sfox_core::ConnectionId;
use sfox_feed::{GeneratorPhase, SubscribeOutcome};

const BTC_TICKER: &str = "ticker.sfox.btcusd";
const ETH_BOOK: &str = "orderbook.sfox.ethusd";

#[tokio::test(start_paused = true)]
async fn two_connections_share_one_generator() {
    let (hub, _transport) = common::hub(1_000);
    let a = ConnectionId::from("A");
    let b = ConnectionId::from("B");

    hub.subscribe(&a, BTC_TICKER).unwrap();
    let generator = hub.registry().generator(BTC_TICKER).unwrap();
    hub.subscribe(&b, BTC_TICKER).unwrap();

    assert_eq!(hub.registry().ref_count(BTC_TICKER), 2);
    assert_eq!(hub.registry().generators_created(), 1);
    assert!(Arc::ptr_eq(&generator, &hub.registry().generator(BTC_TICKER).unwrap()));

    assert_eq!(hub.on_disconnect(&a), 1);
    assert_eq!(hub.registry().ref_count(BTC_TICKER), 1);
    assert!(generator.is_running());

    assert!(hub.unsubscribe(&b, BTC_TICKER));
    assert!(!hub.registry().contains(BTC_TICKER));
    assert_eq!(generator.phase(), GeneratorPhase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn orderbook_first_tick_reaches_group() {
    let (hub, transport) = common::hub(5_000);
    let conn = ConnectionId::from("A");
    hub.subscribe(&conn, ETH_BOOK).unwrap();

    let delivered = transport.wait_for(ETH_BOOK, 1).await;
    let first = &delivered[0];
    assert_eq!(first.sequence, 1);
    assert_eq!(first.feed_key, ETH_BOOK);

    let v: Value = serde_json::to_value(first.as_ref()).unwrap();
    assert_eq!(v["recipient"], ETH_BOOK);
    assert_eq!(v["payload"]["feedType"], "orderbook");
    assert_eq!(v["payload"]["currencyPair"], "ethusd");
    let asks = v["payload"]["asks"].as_array().unwrap();
    let bids = v["payload"]["bids"].as_array().unwrap();
    assert_eq!(asks.len(), 5);
    assert_eq!(bids.len(), 5);
    assert_eq!(asks[0][0].as_f64(), Some(101.0));
    assert_eq!(bids[4][0].as_f64(), Some(95.0));
    for (ask, bid) in asks.iter().zip(bids) {
        assert!(ask[0].as_f64() > bid[0].as_f64());
    }
    for level in asks.iter().chain(bids) {
        let size = level[1].as_f64().unwrap();
        assert!((1.0..10.0).contains(&size), "size {size}");
    }

    hub.on_disconnect(&conn);
}

#[tokio::test]
async fn malformed_key_leaves_no_trace() {
    let (hub, transport) = common::hub(1_000);
    let conn = ConnectionId::from("A");

    let err = hub.subscribe(&conn, "badkey").unwrap_err();
    assert_eq!(err.code, sfox_core::SUBSCRIBE_FAILED);
    assert!(hub.registry().is_empty());
    assert_eq!(transport.members("badkey"), 0);
    assert!(hub.subscriptions(&conn).is_empty());
}

#[tokio::test]
async fn unsubscribe_never_subscribed_is_noop() {
    let (hub, _transport) = common::hub(1_000);
    let conn = ConnectionId::from("A");
    hub.subscribe(&conn, ETH_BOOK).unwrap();

    assert!(!hub.unsubscribe(&conn, BTC_TICKER));
    assert!(!hub.unsubscribe(&ConnectionId::from("nobody"), ETH_BOOK));
    assert_eq!(hub.registry().ref_count(ETH_BOOK), 1);
    assert_eq!(hub.registry().feed_keys(), vec![ETH_BOOK]);
    hub.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_subscribes_create_one_generator() {
    let (hub, _transport) = common::hub(1_000);

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let hub = hub.clone();
            tokio::spawn(async move {
                let conn = ConnectionId::from(format!("c{i}"));
                hub.subscribe(&conn, BTC_TICKER).unwrap();
                hub.registry().generator(BTC_TICKER).unwrap()
            })
        })
        .collect();

    let mut generators = Vec::new();
    for handle in handles {
        generators.push(handle.await.unwrap());
    }

    assert_eq!(hub.registry().generators_created(), 1);
    assert_eq!(hub.registry().ref_count(BTC_TICKER), 32);
    assert!(generators.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    hub.shutdown();
    assert_eq!(generators[0].phase(), GeneratorPhase::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ref_counts_track_subscription_sets_under_churn() {
    let (hub, _transport) = common::hub(1_000);
    let keys = [BTC_TICKER, ETH_BOOK, "trades.sfox.ltcusd"];

    let handles: Vec<_> = (0..8u64)
        .map(|i| {
            let hub = hub.clone();
            tokio::spawn(async move {
                let conn = ConnectionId::from(format!("c{i}"));
                let mut rng = StdRng::seed_from_u64(i);
                for _ in 0..200 {
                    let key = keys[rng.gen_range(0..keys.len())];
                    if rng.gen_bool(0.5) {
                        let _ = hub.subscribe(&conn, key);
                    } else {
                        hub.unsubscribe(&conn, key);
                    }
                    if rng.gen_ratio(1, 50) {
                        tokio::task::yield_now().await;
                    }
                }
                conn
            })
        })
        .collect();

    let mut conns = Vec::new();
    for handle in handles {
        conns.push(handle.await.unwrap());
    }

    for key in keys {
        let holders = conns.iter().filter(|c| hub.subscriptions(c).iter().any(|k| k == key)).count();
        assert_eq!(hub.registry().ref_count(key), holders, "{key}");
        assert_eq!(hub.registry().contains(key), holders > 0, "{key}");
    }

    for conn in &conns {
        hub.on_disconnect(conn);
    }
    assert!(hub.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_stops_delivery_within_one_period() {
    let (hub, transport) = common::hub(1_000);
    let conn = ConnectionId::from("A");
    hub.subscribe(&conn, BTC_TICKER).unwrap();
    hub.subscribe(&conn, ETH_BOOK).unwrap();
    transport.wait_for(BTC_TICKER, 1).await;
    transport.wait_for(ETH_BOOK, 1).await;

    let generators = [hub.registry().generator(BTC_TICKER).unwrap(), hub.registry().generator(ETH_BOOK).unwrap()];
    assert_eq!(hub.on_disconnect(&conn), 2);
    assert!(hub.registry().is_empty());
    assert!(generators.iter().all(|g| g.phase() == GeneratorPhase::Stopped));

    // let forwarders drain whatever was published before the stop
    tokio::time::sleep(Duration::from_millis(10)).await;
    let btc = transport.delivered(BTC_TICKER).len();
    let eth = transport.delivered(ETH_BOOK).len();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.delivered(BTC_TICKER).len(), btc);
    assert_eq!(transport.delivered(ETH_BOOK).len(), eth);
    assert_eq!(transport.members(BTC_TICKER), 0);
}

#[tokio::test(start_paused = true)]
async fn sequences_strictly_increase() {
    let (hub, transport) = common::hub(1_000);
    let conn = ConnectionId::from("A");
    assert_eq!(hub.subscribe(&conn, "trades.sfox.btcusd").unwrap(), SubscribeOutcome::Subscribed);

    let delivered = transport.wait_for("trades.sfox.btcusd", 4).await;
    assert!(delivered.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert!(delivered.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let v: Value = serde_json::to_value(delivered[0].as_ref()).unwrap();
    let price = v["payload"]["trade"]["price"].as_f64().unwrap();
    assert!((95.0..105.0).contains(&price));
    hub.shutdown();
}

#[tokio::test(start_paused = true)]
async fn unknown_type_publishes_unsupported_payload() {
    let (hub, transport) = common::hub(1_000);
    let conn = ConnectionId::from("A");
    hub.subscribe(&conn, "foo.sfox.btcusd").unwrap();

    let delivered = transport.wait_for("foo.sfox.btcusd", 1).await;
    let v: Value = serde_json::to_value(delivered[0].as_ref()).unwrap();
    assert_eq!(v["payload"]["feedType"], "foo");
    assert_eq!(v["payload"]["message"], "Unsupported feed type");
    hub.shutdown();
}

#[tokio::test]
async fn resubscribe_after_last_release_starts_fresh() {
    let (hub, _transport) = common::hub(1_000);
    let conn = ConnectionId::from("A");
    hub.subscribe(&conn, BTC_TICKER).unwrap();
    let first = hub.registry().generator(BTC_TICKER).unwrap();
    hub.unsubscribe(&conn, BTC_TICKER);
    hub.subscribe(&conn, BTC_TICKER).unwrap();
    let second = hub.registry().generator(BTC_TICKER).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(hub.registry().generators_created(), 2);
    hub.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disconnect_racing_subscribe_and_unsubscribe_leaks_nothing() {
    let (hub, _transport) = common::hub(1_000);
    let keys = [BTC_TICKER, ETH_BOOK, "trades.sfox.ltcusd"];
    let conns: Vec<ConnectionId> = (0..16).map(|i| ConnectionId::from(format!("c{i}"))).collect();
    for conn in &conns {
        hub.on_connect(conn);
    }

    let mut handles = Vec::new();
    for (i, conn) in conns.iter().enumerate() {
        for worker in 0..2u64 {
            let hub = hub.clone();
            let conn = conn.clone();
            handles.push(tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(i as u64 * 31 + worker);
                for _ in 0..100 {
                    let key = keys[rng.gen_range(0..keys.len())];
                    if rng.gen_bool(0.6) {
                        let _ = hub.subscribe(&conn, key);
                    } else {
                        hub.unsubscribe(&conn, key);
                    }
                    if rng.gen_ratio(1, 10) {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }

        // every other connection is torn down while its workers are running
        if i % 2 == 0 {
            let hub = hub.clone();
            let conn = conn.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..(i % 7) {
                    tokio::task::yield_now().await;
                }
                hub.on_disconnect(&conn);
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for (i, conn) in conns.iter().enumerate() {
        if i % 2 == 0 {
            assert!(hub.subscriptions(conn).is_empty(), "{conn} kept subscriptions after disconnect");
        }
    }
    for key in keys {
        let holders = conns.iter().filter(|c| hub.subscriptions(c).iter().any(|k| k == key)).count();
        assert_eq!(hub.registry().ref_count(key), holders, "{key}");
    }

    for conn in &conns {
        hub.on_disconnect(conn);
    }
    assert!(hub.registry().is_empty());
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn subscribes_racing_shutdown_leave_registry_empty() {
    let (hub, _transport) = common::hub(1_000);

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let hub = hub.clone();
            tokio::spawn(async move {
                let conn = ConnectionId::from(format!("c{i}"));
                for key in [BTC_TICKER, ETH_BOOK, "trades.sfox.ltcusd"] {
                    let _ = hub.subscribe(&conn, key);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    tokio::task::yield_now().await;
    hub.shutdown();
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(hub.registry().is_empty(), "live feeds after shutdown: {:?}", hub.registry().feed_keys());
    assert!(hub.subscribe(&ConnectionId::from("late"), BTC_TICKER).is_err());
    assert!(hub.registry().is_empty());
}
