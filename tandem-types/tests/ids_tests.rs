use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use tandem_types::{AdapterId, RecordKey};

// ── AdapterId ─────────────────────────────────────────────────────

#[test]
fn adapter_id_new_is_unique() {
    let a = AdapterId::new();
    let b = AdapterId::new();
    assert_ne!(a, b);
}

#[test]
fn adapter_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::now_v7();
    let id = AdapterId::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn adapter_id_display_and_parse() {
    let id = AdapterId::new();
    let parsed = AdapterId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);

    let from_str: AdapterId = AdapterId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, from_str);
}

#[test]
fn adapter_id_parse_invalid() {
    assert!(AdapterId::parse("not-a-uuid").is_err());
    assert!(AdapterId::from_str("garbage").is_err());
}

#[test]
fn adapter_id_hash_and_eq() {
    let id = AdapterId::new();
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id);
    assert_eq!(set.len(), 1);
}

#[test]
fn adapter_ids_order_by_creation() {
    let first = AdapterId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let second = AdapterId::new();
    assert!(first < second);
}

#[test]
fn adapter_id_serializes_as_plain_string() {
    let id = AdapterId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let parsed: AdapterId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, parsed);
}

// ── RecordKey ─────────────────────────────────────────────────────

#[test]
fn record_key_prefix() {
    assert_eq!(RecordKey::from("TestObject:Key").prefix(), Some("TestObject"));
    assert_eq!(RecordKey::from("a:b:c").prefix(), Some("a"));
    assert_eq!(RecordKey::from("plain").prefix(), None);
}

#[test]
fn record_key_display_matches_input() {
    let key = RecordKey::new("T1");
    assert_eq!(key.to_string(), "T1");
    assert_eq!(key.as_str(), "T1");
    assert_eq!(key.as_ref(), "T1");
}

#[test]
fn record_key_borrows_as_str_for_lookups() {
    let mut set = BTreeSet::new();
    set.insert(RecordKey::from("k1"));
    set.insert(RecordKey::from(String::from("k2")));
    assert!(set.contains("k1"));
    assert!(set.contains("k2"));
    assert!(!set.contains("k3"));
}

#[test]
fn record_key_serializes_transparently() {
    let key = RecordKey::from("TestObject:Key");
    let json = serde_json::to_string(&key).unwrap();
    assert_eq!(json, "\"TestObject:Key\"");
    let parsed: RecordKey = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, key);
}
