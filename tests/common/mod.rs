//! Shared helpers for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plist::{Dictionary, Value};
use rusqlite::{params, Connection};

use slackpulse::adapters::{EventSink, StoreRecord};
use slackpulse::CanonicalEvent;

pub const APP: &str = "com.tinyspeck.slackmacgap";

/// Sink that records every event it receives
#[derive(Default)]
pub struct CollectSink(Mutex<Vec<CanonicalEvent>>);

impl CollectSink {
    pub fn events(&self) -> Vec<CanonicalEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

impl EventSink for CollectSink {
    fn on_event(&self, event: &CanonicalEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

pub fn collect_sink() -> Arc<CollectSink> {
    Arc::new(CollectSink::default())
}

/// Binary plist notification payload
pub fn payload(title: &str, subtitle: &str, body: &str) -> Vec<u8> {
    let mut req = Dictionary::new();
    req.insert("titl".to_string(), Value::from(title));
    req.insert("subt".to_string(), Value::from(subtitle));
    req.insert("body".to_string(), Value::from(body));

    let mut root = Dictionary::new();
    root.insert("req".to_string(), Value::Dictionary(req));

    let mut buf = Vec::new();
    Value::Dictionary(root).to_writer_binary(&mut buf).unwrap();
    buf
}

pub fn record(id: u8, delivered_at: f64, payload: Vec<u8>) -> StoreRecord {
    StoreRecord {
        identifier: vec![id; 16],
        payload,
        delivered_at,
    }
}

/// SQLite database with the notification store schema
pub fn create_store(path: &Path) -> Connection {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE app (app_id INTEGER PRIMARY KEY, identifier TEXT);
         CREATE TABLE record (
             rec_id INTEGER PRIMARY KEY,
             app_id INTEGER,
             uuid BLOB,
             data BLOB,
             delivered_date REAL
         );
         INSERT INTO app (app_id, identifier) VALUES (1, 'com.tinyspeck.slackmacgap');",
    )
    .unwrap();
    conn
}

pub fn insert_record(conn: &Connection, uuid: &[u8], data: &[u8], delivered: f64) {
    conn.execute(
        "INSERT INTO record (app_id, uuid, data, delivered_date) VALUES (1, ?1, ?2, ?3)",
        params![uuid, data, delivered],
    )
    .unwrap();
}

/// Poll `check` until it holds or `limit` elapses
pub async fn wait_for(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
