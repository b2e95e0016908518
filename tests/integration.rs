//! Runs against a real server on 127.0.0.1:6379 and checks our replies against the `redis`
//! crate's. Ignored by default: `cargo test -- --ignored`.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serial_test::serial;
use tokio::sync::mpsc;
use tokio::time::timeout;

use redis_driver::{Client, ClientConfig, Error, Subscriber, SubscriberConfig, SubscriberState};

const ADDR: &str = "127.0.0.1:6379";

async fn connect() -> (Client, MultiplexedConnection) {
    let ours = Client::connect(&ClientConfig::new(ADDR)).await.unwrap();

    let theirs = redis::Client::open(format!("redis://{}/", ADDR)).unwrap();
    let mut theirs = theirs.get_multiplexed_async_connection().await.unwrap();

    // Since we use the same instance for all tests, we flush it to start fresh.
    let _: () = redis::cmd("FLUSHDB").query_async(&mut theirs).await.unwrap();

    (ours, theirs)
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_strings() {
    let (ours, mut theirs) = connect().await;

    ours.set("greeting", "hello").await.unwrap();
    let value: String = theirs.get("greeting").await.unwrap();
    assert_eq!(value, "hello");

    let _: () = theirs.set("counter", 10).await.unwrap();
    assert_eq!(
        ours.get_with("counter", |data: Bytes| String::from_utf8_lossy(&data).parse::<i64>())
            .await
            .unwrap(),
        Some(10)
    );

    let their_values: Vec<Option<Vec<u8>>> =
        theirs.mget(&["greeting", "missing", "counter"]).await.unwrap();
    let our_values: Vec<Option<Vec<u8>>> = ours
        .mget(["greeting", "missing", "counter"])
        .await
        .unwrap()
        .into_iter()
        .map(|value| value.map(|bytes| bytes.to_vec()))
        .collect();
    assert_eq!(our_values, their_values);

    assert_eq!(ours.append("greeting", " world").await.unwrap(), 11);
    let bit: u8 = theirs.getbit("greeting", 1).await.unwrap();
    assert_eq!(ours.getbit("greeting", 1).await.unwrap(), bit);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_keys_and_expire() {
    let (ours, mut theirs) = connect().await;

    ours.mset([("user:1", "a"), ("user:2", "b"), ("other", "c")])
        .await
        .unwrap();

    let mut our_keys = ours.keys("user:*").await.unwrap();
    let mut their_keys: Vec<String> = theirs.keys("user:*").await.unwrap();
    our_keys.sort();
    their_keys.sort();
    assert_eq!(our_keys, their_keys);

    assert!(ours.expire("other", 100).await.unwrap());
    let ttl: i64 = theirs.ttl("other").await.unwrap();
    assert!(ttl > 0);

    assert_eq!(ours.del_many(["user:1", "user:2", "nope"]).await.unwrap(), 2);
    assert_eq!(ours.del("other").await.unwrap(), 1);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_hashes() {
    let (ours, mut theirs) = connect().await;

    assert_eq!(ours.hset("user", "name", "alice").await.unwrap(), 1);
    ours.hmset("user", [("age", "30"), ("city", "Rome")])
        .await
        .unwrap();
    assert_eq!(ours.hsetnx("user", "name", "bob").await.unwrap(), 0);

    let their_all: HashMap<String, String> = theirs.hgetall("user").await.unwrap();
    let our_all: HashMap<String, String> = ours
        .hgetall("user")
        .await
        .unwrap()
        .into_iter()
        .map(|(field, value)| (field, String::from_utf8_lossy(&value).into_owned()))
        .collect();
    assert_eq!(our_all, their_all);

    assert!(ours.hexists("user", "age").await.unwrap());
    assert_eq!(
        ours.hmget("user", ["name", "email"]).await.unwrap(),
        vec![Some(Bytes::from("alice")), None]
    );
    assert!(ours.hdel("user", "age").await.unwrap());
    assert_eq!(ours.hdel_many("user", ["name", "city", "x"]).await.unwrap(), 2);
    assert!(ours.hgetall("user").await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_lists() {
    let (ours, mut theirs) = connect().await;

    assert_eq!(ours.lpush("queue", "a").await.unwrap(), 1);
    assert_eq!(ours.lpush_many("queue", ["b", "c"]).await.unwrap(), 3);

    let items: Vec<String> = theirs.lrange("queue", 0, -1).await.unwrap();
    assert_eq!(items, vec!["c", "b", "a"]);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_wrong_type_is_a_server_error() {
    let (ours, _theirs) = connect().await;

    ours.lpush("queue", "a").await.unwrap();
    let err = ours.get("queue").await.unwrap_err();

    match err {
        Error::Server(message) => assert!(message.starts_with("WRONGTYPE")),
        other => panic!("expected a server error, got {:?}", other),
    }
    assert_eq!(ours.ping().await.unwrap(), "PONG");
}

/// Active means the subscriptions were written, not that the server processed them yet.
async fn publish_until_received(client: &Client, channel: &str, message: &str) -> i64 {
    for _ in 0..50 {
        let receivers = client.publish(channel, message).await.unwrap();
        if receivers > 0 {
            return receivers;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    0
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_publish_reaches_subscriber() {
    let (ours, _theirs) = connect().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscriber = Subscriber::new(SubscriberConfig::new(ADDR), move |message| {
        let _ = tx.send(message);
    });
    subscriber.subscribe(["news"]).unwrap();
    subscriber.psubscribe(["log.*"]).unwrap();
    timeout(
        Duration::from_secs(2),
        subscriber.wait_for(SubscriberState::Active),
    )
    .await
    .unwrap();

    assert_eq!(publish_until_received(&ours, "news", "hello").await, 1);
    assert_eq!(publish_until_received(&ours, "log.disk", "full").await, 1);

    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.channel, "news");
    assert_eq!(first.payload, Bytes::from("hello"));

    let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.pattern.as_deref(), Some("log.*"));
    assert_eq!(second.channel, "log.disk");

    subscriber.close();
}
