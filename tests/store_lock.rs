// Concurrency behaviour of the JSON-array store: parallel writers, lock
// contention, and recovery from markers left behind by dead writers.

use cyberintel_harvester::store::JsonArrayStore;
use serde_json::{json, Value};
use std::time::Duration;

fn parse(path: &std::path::Path) -> Vec<Value> {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn parallel_writers_produce_one_valid_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("news.json");

    let mut handles = Vec::new();
    for w in 0..4 {
        let store = JsonArrayStore::new(&path);
        handles.push(std::thread::spawn(move || {
            for i in 0..25 {
                store
                    .append(&json!({ "url": format!("http://w{w}.example/{i}") }))
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let items = parse(&path);
    assert_eq!(items.len(), 100);
    // every record intact, none interleaved
    let urls: std::collections::HashSet<&str> =
        items.iter().map(|v| v["url"].as_str().unwrap()).collect();
    assert_eq!(urls.len(), 100);
}

#[test]
fn writer_waits_out_a_briefly_held_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("news.json");
    let store = JsonArrayStore::new(&path).with_lock_params(
        Duration::from_millis(20),
        50,
        Duration::from_secs(60),
    );
    store.append(&json!({"url": "http://first.example"})).unwrap();

    // another process holds the marker for several poll intervals
    std::fs::write(store.lock_path(), "pid 4242").unwrap();
    let lock_path = store.lock_path().to_path_buf();
    let holder = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(120));
        std::fs::remove_file(lock_path).unwrap();
    });

    store.append(&json!({"url": "http://second.example"})).unwrap();
    holder.join().unwrap();

    let items = parse(&path);
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["url"], "http://second.example");
}

#[test]
fn marker_from_a_dead_writer_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonArrayStore::new(dir.path().join("news.json")).with_lock_params(
        Duration::from_millis(10),
        20,
        Duration::from_millis(50),
    );
    std::fs::write(store.lock_path(), "pid of a process that is gone").unwrap();
    std::thread::sleep(Duration::from_millis(80));

    store.append(&json!({"url": "http://a.example"})).unwrap();
    assert_eq!(parse(store.path()).len(), 1);
    assert!(!store.lock_path().exists());
}

#[test]
fn truncated_file_keeps_accepting_appends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("news.json");
    // a writer died after truncating the tail
    std::fs::write(&path, "[\n{\"url\":\"http://a.example\"}\n").unwrap();

    let store = JsonArrayStore::new(&path);
    store.append(&json!({"url": "http://b.example"})).unwrap();
    store.append(&json!({"url": "http://c.example"})).unwrap();

    assert_eq!(parse(&path).len(), 3);
}
