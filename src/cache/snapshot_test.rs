use bytes::Bytes;

use super::*;
use crate::store::KeySpace;
use crate::store::KvEntry;
use crate::store::KvListing;
use crate::store::WatchEvent;
use crate::store::WatchEventKind;
use crate::DeliveryMode;
use crate::Function;
use crate::FunctionKey;
use crate::Subscription;

fn function(id: &str) -> Function {
    Function::http("default", id, format!("http://{}.local/", id))
}

fn sub(
    mode: DeliveryMode,
    event_type: &str,
    function_id: &str,
    path: &str,
) -> Subscription {
    Subscription::new(mode, event_type, function_id, path, "POST")
}

fn entry(
    key: String,
    value: Vec<u8>,
    revision: u64,
) -> KvEntry {
    KvEntry {
        key,
        value: Bytes::from(value),
        create_revision: revision,
        mod_revision: revision,
    }
}

#[test]
fn test_sync_scenario_matches_exact_type_only() {
    let snapshot = TargetSnapshot::from_entries(
        vec![function("fnA")],
        vec![sub(DeliveryMode::Sync, "user.created", "fnA", "/foo")],
    );

    let target = snapshot.sync_target("user.created", "/foo", "POST").unwrap();
    assert_eq!(target.function.function_id, "fnA");

    assert!(snapshot.sync_target("user.deleted", "/foo", "POST").is_none());
    assert!(snapshot.sync_target("user.created", "/foo", "GET").is_none());
    assert!(snapshot.has_sync_endpoint("/foo", "POST"));
    assert!(!snapshot.has_sync_endpoint("/bar", "POST"));
}

#[test]
fn test_exact_type_wins_over_wildcard() {
    let snapshot = TargetSnapshot::from_entries(
        vec![function("any"), function("exact")],
        vec![
            sub(DeliveryMode::Sync, "*", "any", "/foo"),
            sub(DeliveryMode::Sync, "user.created", "exact", "/foo"),
        ],
    );

    let target = snapshot.sync_target("user.created", "/foo", "POST").unwrap();
    assert_eq!(target.function.function_id, "exact");

    let target = snapshot.sync_target("user.deleted", "/foo", "POST").unwrap();
    assert_eq!(target.function.function_id, "any");
}

#[test]
fn test_static_path_wins_over_param() {
    let snapshot = TargetSnapshot::from_entries(
        vec![function("param"), function("fixed")],
        vec![
            sub(DeliveryMode::Sync, "http.request", "param", "/users/:id"),
            sub(DeliveryMode::Sync, "http.request", "fixed", "/users/me"),
        ],
    );

    let target = snapshot.sync_target("http.request", "/users/me", "POST").unwrap();
    assert_eq!(target.function.function_id, "fixed");

    let target = snapshot.sync_target("http.request", "/users/7", "POST").unwrap();
    assert_eq!(target.function.function_id, "param");
    assert_eq!(target.params.get("id").map(String::as_str), Some("7"));
}

#[test]
fn test_async_targets_keep_registration_order() {
    let snapshot = TargetSnapshot::from_entries(
        vec![function("a"), function("b"), function("c")],
        vec![
            sub(DeliveryMode::Async, "user.created", "b", "/"),
            sub(DeliveryMode::Async, "user.created", "a", "/"),
            sub(DeliveryMode::Async, "*", "c", "/"),
        ],
    );

    let ids: Vec<String> = snapshot
        .async_targets("user.created", "/", "POST")
        .iter()
        .map(|t| t.function.function_id.clone())
        .collect();

    assert_eq!(ids, vec!["b", "a", "c"]);
}

#[test]
fn test_subscription_without_function_is_not_matched() {
    let snapshot = TargetSnapshot::from_entries(
        vec![],
        vec![sub(DeliveryMode::Async, "user.created", "ghost", "/")],
    );

    assert!(snapshot.match_subscriptions("user.created", "/", "POST").is_empty());
    assert_eq!(snapshot.subscriptions(None).len(), 1);
}

#[test]
fn test_load_and_apply_follow_store_keys() {
    let keys = KeySpace::new("/gw");
    let f = function("fnA");
    let s = sub(DeliveryMode::Sync, "user.created", "fnA", "/foo");

    let listing = KvListing {
        entries: vec![
            entry(keys.function(&f.key()), serde_json::to_vec(&f).unwrap(), 1),
            entry("/gw/functions/default/broken".into(), b"not json".to_vec(), 2),
        ],
        revision: 2,
    };
    let mut snapshot = TargetSnapshot::load(&keys, &listing);
    assert_eq!(snapshot.revision(), 2);
    assert_eq!(snapshot.functions(None).len(), 1);

    let put = WatchEvent {
        kind: WatchEventKind::Put,
        key: keys.subscription(&s.key()),
        value: Bytes::from(serde_json::to_vec(&s).unwrap()),
        revision: 3,
        create_revision: 3,
    };
    assert!(snapshot.apply(&keys, &put));
    assert!(!snapshot.apply(&keys, &put), "replayed event must be skipped");
    assert!(snapshot.sync_target("user.created", "/foo", "POST").is_some());

    let delete = WatchEvent {
        kind: WatchEventKind::Delete,
        key: keys.function(&FunctionKey::new("default", "fnA")),
        value: Bytes::new(),
        revision: 4,
        create_revision: 1,
    };
    assert!(snapshot.apply(&keys, &delete));
    assert!(snapshot.get_function(&FunctionKey::new("default", "fnA")).is_none());
    assert!(snapshot.sync_target("user.created", "/foo", "POST").is_none());
}

#[test]
fn test_listing_filters_by_space() {
    let snapshot = TargetSnapshot::from_entries(
        vec![function("a"), Function::http("other", "b", "http://b.local/")],
        vec![],
    );

    assert_eq!(snapshot.functions(None).len(), 2);
    assert_eq!(snapshot.functions(Some("other")).len(), 1);
    assert_eq!(snapshot.functions(Some("missing")).len(), 0);
}
