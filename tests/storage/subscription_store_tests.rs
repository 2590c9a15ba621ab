//! SubscriptionStore interface tests.
//!
//! These tests verify the contract of the SubscriptionStore trait.
//! Each storage implementation should run these tests. Every test uses its
//! own publisher endpoint, so they can share one table.

use chrono::{DateTime, Duration, SubsecRound, Utc};

use subscription_registry::storage::SubscriptionStore;
use subscription_registry::Subscription;

/// Current time at the microsecond precision stores keep.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn subscription(
    publisher: &str,
    subscriber: &str,
    message_type: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Subscription {
    Subscription::new(publisher, subscriber, message_type, expires_at, now())
}

fn sorted(mut rows: Vec<(String, String)>) -> Vec<(String, String)> {
    rows.sort();
    rows
}

// =============================================================================
// SubscriptionStore::create_schema tests
// =============================================================================

pub async fn test_create_schema_idempotent<S: SubscriptionStore>(store: &S) {
    store
        .create_schema(None)
        .await
        .expect("create_schema should succeed");
    store
        .create_schema(None)
        .await
        .expect("create_schema should succeed against an existing table");
}

// =============================================================================
// SubscriptionStore::load_live tests
// =============================================================================

pub async fn test_load_empty<S: SubscriptionStore>(store: &S) {
    let rows = store
        .load_live(None, "test_pub_empty", now())
        .await
        .expect("load should succeed");
    assert!(rows.is_empty(), "no subscriptions should load nothing");
}

pub async fn test_upsert_and_load<S: SubscriptionStore>(store: &S) {
    let publisher = "test_pub_upsert_load";
    let later = now() + Duration::hours(1);

    store.upsert(None, &subscription(publisher, "s1", "Ordered", None)).await.unwrap();
    store.upsert(None, &subscription(publisher, "s2", "Ordered", Some(later))).await.unwrap();
    store.upsert(None, &subscription(publisher, "s1", "Shipped", None)).await.unwrap();

    let rows = sorted(store.load_live(None, publisher, now()).await.unwrap());
    assert_eq!(
        rows,
        vec![
            ("Ordered".to_string(), "s1".to_string()),
            ("Ordered".to_string(), "s2".to_string()),
            ("Shipped".to_string(), "s1".to_string()),
        ]
    );
}

pub async fn test_load_excludes_expired<S: SubscriptionStore>(store: &S) {
    let publisher = "test_pub_load_expired";
    let now = now();

    store
        .upsert(None, &subscription(publisher, "alive", "Ordered", Some(now + Duration::minutes(5))))
        .await
        .unwrap();
    store
        .upsert(None, &subscription(publisher, "dead", "Ordered", Some(now - Duration::minutes(5))))
        .await
        .unwrap();

    let rows = store.load_live(None, publisher, now).await.unwrap();
    assert_eq!(rows, vec![("Ordered".to_string(), "alive".to_string())]);

    let later = store
        .load_live(None, publisher, now + Duration::minutes(10))
        .await
        .unwrap();
    assert!(later.is_empty(), "both rows are expired ten minutes on");
}

pub async fn test_publisher_isolation<S: SubscriptionStore>(store: &S) {
    store
        .upsert(None, &subscription("test_pub_iso_a", "s1", "Ordered", None))
        .await
        .unwrap();
    store
        .upsert(None, &subscription("test_pub_iso_b", "s2", "Ordered", None))
        .await
        .unwrap();

    let rows = store.load_live(None, "test_pub_iso_a", now()).await.unwrap();
    assert_eq!(rows, vec![("Ordered".to_string(), "s1".to_string())]);

    let removed = store
        .delete(None, "test_pub_iso_a", "s2", "Ordered")
        .await
        .unwrap();
    assert_eq!(removed, 0, "delete must not reach another publisher's rows");
}

// =============================================================================
// SubscriptionStore::upsert tests
// =============================================================================

pub async fn test_upsert_updates_in_place<S: SubscriptionStore>(store: &S) {
    let publisher = "test_pub_upsert_update";
    let first = subscription(publisher, "s1", "Ordered", Some(now() + Duration::minutes(1)));
    store.upsert(None, &first).await.unwrap();

    let refreshed = Subscription {
        created_at: first.created_at + Duration::seconds(30),
        expires_at: Some(first.created_at + Duration::days(1)),
        ..first.clone()
    };
    store.upsert(None, &refreshed).await.unwrap();

    let rows = store.list(None, publisher).await.unwrap();
    assert_eq!(rows.len(), 1, "same key must not create a second row");
    assert_eq!(rows[0].expires_at, refreshed.expires_at, "expiration refreshed");
    assert_eq!(rows[0].created_at, first.created_at, "creation time kept");
}

pub async fn test_upsert_can_clear_expiration<S: SubscriptionStore>(store: &S) {
    let publisher = "test_pub_upsert_clear";
    store
        .upsert(None, &subscription(publisher, "s1", "Ordered", Some(now() + Duration::minutes(1))))
        .await
        .unwrap();
    store
        .upsert(None, &subscription(publisher, "s1", "Ordered", None))
        .await
        .unwrap();

    let rows = store.list(None, publisher).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].expires_at.is_none(), "now never expires");
}

// =============================================================================
// SubscriptionStore::list tests
// =============================================================================

pub async fn test_list_ordered_and_includes_expired<S: SubscriptionStore>(store: &S) {
    let publisher = "test_pub_list";
    let past = now() - Duration::hours(1);

    store.upsert(None, &subscription(publisher, "s2", "Shipped", None)).await.unwrap();
    store.upsert(None, &subscription(publisher, "s2", "Ordered", None)).await.unwrap();
    store.upsert(None, &subscription(publisher, "s1", "Ordered", Some(past))).await.unwrap();

    let keys: Vec<(String, String)> = store
        .list(None, publisher)
        .await
        .unwrap()
        .into_iter()
        .map(|s| (s.message_type, s.subscriber_endpoint))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("Ordered".to_string(), "s1".to_string()),
            ("Ordered".to_string(), "s2".to_string()),
            ("Shipped".to_string(), "s2".to_string()),
        ]
    );
}

// =============================================================================
// SubscriptionStore::delete tests
// =============================================================================

pub async fn test_delete<S: SubscriptionStore>(store: &S) {
    let publisher = "test_pub_delete";
    store.upsert(None, &subscription(publisher, "s1", "Ordered", None)).await.unwrap();
    store.upsert(None, &subscription(publisher, "s1", "Shipped", None)).await.unwrap();

    assert_eq!(store.delete(None, publisher, "s1", "Ordered").await.unwrap(), 1);
    assert_eq!(
        store.delete(None, publisher, "s1", "Ordered").await.unwrap(),
        0,
        "deleting a missing row is a no-op"
    );

    let rows = store.load_live(None, publisher, now()).await.unwrap();
    assert_eq!(rows, vec![("Shipped".to_string(), "s1".to_string())]);
}

pub async fn test_delete_expired<S: SubscriptionStore>(store: &S) {
    let publisher = "test_pub_delete_expired";
    let now = now();

    store
        .upsert(None, &subscription(publisher, "expired", "Ordered", Some(now - Duration::seconds(1))))
        .await
        .unwrap();
    store
        .upsert(None, &subscription(publisher, "pending", "Ordered", Some(now + Duration::hours(1))))
        .await
        .unwrap();
    store
        .upsert(None, &subscription(publisher, "forever", "Ordered", None))
        .await
        .unwrap();

    for subscriber in ["pending", "forever", "missing"] {
        let removed = store
            .delete_expired(None, publisher, subscriber, "Ordered", now)
            .await
            .unwrap();
        assert_eq!(removed, 0, "{subscriber} should not be swept");
    }

    let removed = store
        .delete_expired(None, publisher, "expired", "Ordered", now)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.list(None, publisher).await.unwrap().len(), 2);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all SubscriptionStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_subscription_store_tests {
    ($store:expr) => {
        use $crate::storage::subscription_store_tests::*;

        // schema
        test_create_schema_idempotent($store).await;
        println!("  test_create_schema_idempotent: PASSED");

        // load tests
        test_load_empty($store).await;
        println!("  test_load_empty: PASSED");

        test_upsert_and_load($store).await;
        println!("  test_upsert_and_load: PASSED");

        test_load_excludes_expired($store).await;
        println!("  test_load_excludes_expired: PASSED");

        test_publisher_isolation($store).await;
        println!("  test_publisher_isolation: PASSED");

        // upsert tests
        test_upsert_updates_in_place($store).await;
        println!("  test_upsert_updates_in_place: PASSED");

        test_upsert_can_clear_expiration($store).await;
        println!("  test_upsert_can_clear_expiration: PASSED");

        // list tests
        test_list_ordered_and_includes_expired($store).await;
        println!("  test_list_ordered_and_includes_expired: PASSED");

        // delete tests
        test_delete($store).await;
        println!("  test_delete: PASSED");

        test_delete_expired($store).await;
        println!("  test_delete_expired: PASSED");
    };
}
