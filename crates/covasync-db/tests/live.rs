//! Live integration tests for covasync-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/covasync-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::{DateTime, TimeZone, Utc};
use covasync_core::{
    CatalogProduct, InventoryRecord, LinkedDownstreamRecord, PriceRecord, SyncCheckpoint,
};
use covasync_db::{
    complete_sync_run, count_processed_keys, count_products, create_sync_run,
    delete_downstream_link, fail_sync_run, get_downstream_link, get_product, get_sync_run,
    inventory_for_product, is_key_processed, latest_price, list_downstream_links, list_products,
    list_sync_events, list_sync_runs, load_checkpoint, mark_key_processed, record_sync_event,
    reset_checkpoint, save_checkpoint, start_sync_run, upsert_downstream_link, upsert_inventory,
    upsert_price, upsert_product, DbError, EventLevel, RunCounts, UpsertOutcome,
};
use rust_decimal::Decimal;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn synced_at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
}

fn make_product(product_id: &str, stock: i64) -> CatalogProduct {
    CatalogProduct {
        product_id: product_id.to_string(),
        name: format!("Product {product_id}"),
        master_product_id: None,
        category: Some("Edibles".to_string()),
        catalog_sku: Some(format!("SKU{product_id}")),
        description: None,
        is_archived: false,
        is_in_stock: stock > 0,
        stock_quantity: stock,
        upstream_created_at: None,
        upstream_updated_at: Some(synced_at(1)),
        raw: json!({"ProductId": product_id}),
        last_sync: synced_at(8),
    }
}

fn make_price(price_id: &str, product_id: &str, entity: Option<&str>, regular: &str) -> PriceRecord {
    PriceRecord {
        price_id: price_id.to_string(),
        entity_id: entity.map(str::to_string),
        catalog_item_id: product_id.to_string(),
        regular_price: Some(regular.parse().unwrap()),
        at_tier_price: None,
        tier_name: None,
        raw: json!({"Id": price_id}),
        last_sync: synced_at(8),
    }
}

fn make_inventory(inventory_id: &str, product_id: &str, location: &str, qty: i64) -> InventoryRecord {
    InventoryRecord {
        inventory_id: inventory_id.to_string(),
        product_id: product_id.to_string(),
        location_id: Some(location.to_string()),
        quantity: qty,
        available_quantity: qty,
        reserved_quantity: 0,
        raw: json!({}),
        last_sync: synced_at(8),
    }
}

// ---------------------------------------------------------------------------
// Section 1: Catalog upserts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn product_upsert_is_idempotent(pool: sqlx::PgPool) {
    let product = make_product("p-1", 5);

    assert_eq!(
        upsert_product(&pool, &product).await.unwrap(),
        UpsertOutcome::Inserted
    );
    let updated_at_before: DateTime<Utc> =
        sqlx::query_scalar("SELECT updated_at FROM catalog_products WHERE product_id = 'p-1'")
            .fetch_one(&pool)
            .await
            .unwrap();

    assert_eq!(
        upsert_product(&pool, &product).await.unwrap(),
        UpsertOutcome::Unchanged
    );
    let updated_at_after: DateTime<Utc> =
        sqlx::query_scalar("SELECT updated_at FROM catalog_products WHERE product_id = 'p-1'")
            .fetch_one(&pool)
            .await
            .unwrap();

    assert_eq!(updated_at_before, updated_at_after, "replay must not touch the row");
    assert_eq!(count_products(&pool).await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_upsert_updates_changed_fields(pool: sqlx::PgPool) {
    upsert_product(&pool, &make_product("p-1", 5)).await.unwrap();

    let mut changed = make_product("p-1", 0);
    changed.name = "Renamed".to_string();
    assert_eq!(
        upsert_product(&pool, &changed).await.unwrap(),
        UpsertOutcome::Updated
    );

    let stored = get_product(&pool, "p-1").await.unwrap().expect("product exists");
    assert_eq!(stored.name, "Renamed");
    assert_eq!(stored.stock_quantity, 0);
    assert!(!stored.is_in_stock);
    assert_eq!(stored.raw, json!({"ProductId": "p-1"}));
    assert_eq!(stored.last_sync, synced_at(8));
}

#[sqlx::test(migrations = "../../migrations")]
async fn get_product_returns_none_for_unknown_id(pool: sqlx::PgPool) {
    assert!(get_product(&pool, "missing").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_products_pages_in_id_order(pool: sqlx::PgPool) {
    for id in ["c", "a", "b", "d"] {
        upsert_product(&pool, &make_product(id, 1)).await.unwrap();
    }

    let first: Vec<String> = list_products(&pool, 0, 2)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.product_id)
        .collect();
    let second: Vec<String> = list_products(&pool, 2, 2)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.product_id)
        .collect();

    assert_eq!(first, vec!["a", "b"]);
    assert_eq!(second, vec!["c", "d"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn latest_price_prefers_location_then_most_recent_sync(pool: sqlx::PgPool) {
    let older_positive = PriceRecord {
        last_sync: synced_at(7),
        ..make_price("pr-old", "p-1", Some("42"), "25")
    };
    upsert_price(&pool, &older_positive).await.unwrap();
    upsert_price(&pool, &make_price("pr-new", "p-1", Some("42"), "0")).await.unwrap();
    let newest_elsewhere = PriceRecord {
        last_sync: synced_at(9),
        ..make_price("pr-other", "p-1", Some("7"), "30")
    };
    upsert_price(&pool, &newest_elsewhere).await.unwrap();

    let at_42 = latest_price(&pool, "p-1", Some("42"))
        .await
        .unwrap()
        .expect("price exists");
    assert_eq!(at_42.price_id, "pr-new");
    assert_eq!(at_42.regular_price, Some(Decimal::ZERO));

    let anywhere = latest_price(&pool, "p-1", None).await.unwrap().expect("price exists");
    assert_eq!(anywhere.price_id, "pr-other");

    // Another entity's row still answers when the location has none.
    let elsewhere = latest_price(&pool, "p-1", Some("99"))
        .await
        .unwrap()
        .expect("price exists");
    assert_eq!(elsewhere.price_id, "pr-other");

    assert!(latest_price(&pool, "p-2", None).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn price_upsert_reports_outcome(pool: sqlx::PgPool) {
    let price = make_price("pr-1", "p-1", Some("42"), "19.99");
    assert_eq!(upsert_price(&pool, &price).await.unwrap(), UpsertOutcome::Inserted);
    assert_eq!(upsert_price(&pool, &price).await.unwrap(), UpsertOutcome::Unchanged);

    let mut repriced = price.clone();
    repriced.at_tier_price = Some("17.50".parse().unwrap());
    assert_eq!(upsert_price(&pool, &repriced).await.unwrap(), UpsertOutcome::Updated);
}

#[sqlx::test(migrations = "../../migrations")]
async fn inventory_rows_filter_by_location(pool: sqlx::PgPool) {
    upsert_inventory(&pool, &make_inventory("i-1", "p-1", "42", 3)).await.unwrap();
    upsert_inventory(&pool, &make_inventory("i-2", "p-1", "7", 9)).await.unwrap();
    upsert_inventory(&pool, &make_inventory("i-3", "p-2", "42", 1)).await.unwrap();

    assert_eq!(inventory_for_product(&pool, "p-1", None).await.unwrap().len(), 2);
    let at_42 = inventory_for_product(&pool, "p-1", Some("42")).await.unwrap();
    assert_eq!(at_42.len(), 1);
    assert_eq!(at_42[0].quantity, 3);

    assert_eq!(
        upsert_inventory(&pool, &make_inventory("i-1", "p-1", "42", 3)).await.unwrap(),
        UpsertOutcome::Unchanged
    );
}

// ---------------------------------------------------------------------------
// Section 2: Checkpoints and processed keys
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn checkpoint_defaults_then_round_trips(pool: sqlx::PgPool) {
    let initial = load_checkpoint(&pool, "catalog").await.unwrap();
    assert!(initial.needs_full_sync());
    assert_eq!(initial.batch_offset, 0);

    let saved = SyncCheckpoint {
        last_sync_at: Some(synced_at(9)),
        batch_offset: 1500,
    };
    save_checkpoint(&pool, "catalog", &saved).await.unwrap();
    assert_eq!(load_checkpoint(&pool, "catalog").await.unwrap(), saved);

    // Jobs are independent.
    assert!(load_checkpoint(&pool, "images").await.unwrap().needs_full_sync());
}

#[sqlx::test(migrations = "../../migrations")]
async fn reset_clears_checkpoint_and_processed_keys(pool: sqlx::PgPool) {
    save_checkpoint(
        &pool,
        "images",
        &SyncCheckpoint {
            last_sync_at: None,
            batch_offset: 12,
        },
    )
    .await
    .unwrap();
    mark_key_processed(&pool, "images", "p-1").await.unwrap();
    mark_key_processed(&pool, "images", "p-1").await.unwrap();
    mark_key_processed(&pool, "images", "p-2").await.unwrap();
    mark_key_processed(&pool, "catalog", "p-1").await.unwrap();

    assert_eq!(count_processed_keys(&pool, "images").await.unwrap(), 2);
    assert!(is_key_processed(&pool, "images", "p-1").await.unwrap());

    reset_checkpoint(&pool, "images").await.unwrap();

    assert_eq!(load_checkpoint(&pool, "images").await.unwrap().batch_offset, 0);
    assert!(!is_key_processed(&pool, "images", "p-1").await.unwrap());
    assert!(
        is_key_processed(&pool, "catalog", "p-1").await.unwrap(),
        "other jobs keep their keys"
    );
}

// ---------------------------------------------------------------------------
// Section 3: Sync run lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_lifecycle_queued_to_succeeded(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, "sync", "cli").await.unwrap();
    assert_eq!(run.status, "queued");

    start_sync_run(&pool, run.id).await.unwrap();
    complete_sync_run(
        &pool,
        run.id,
        RunCounts {
            processed: 120,
            failed: 2,
        },
        &json!({"stages": []}),
    )
    .await
    .unwrap();

    let stored = get_sync_run(&pool, run.id).await.unwrap();
    assert_eq!(stored.status, "succeeded");
    assert_eq!(stored.records_processed, 120);
    assert_eq!(stored.records_failed, 2);
    assert!(stored.started_at.is_some());
    assert!(stored.completed_at.is_some());
    assert_eq!(stored.summary, Some(json!({"stages": []})));
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_failure_records_message(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, "sync", "scheduler").await.unwrap();
    start_sync_run(&pool, run.id).await.unwrap();
    fail_sync_run(&pool, run.id, "upstream unavailable", None).await.unwrap();

    let stored = get_sync_run(&pool, run.id).await.unwrap();
    assert_eq!(stored.status, "failed");
    assert_eq!(stored.error_message.as_deref(), Some("upstream unavailable"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_run_rejects_invalid_transitions(pool: sqlx::PgPool) {
    let run = create_sync_run(&pool, "sync", "api").await.unwrap();

    let err = complete_sync_run(&pool, run.id, RunCounts::default(), &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidSyncRunTransition {
            expected_status: "running",
            ..
        }
    ));

    start_sync_run(&pool, run.id).await.unwrap();
    assert!(start_sync_run(&pool, run.id).await.is_err());
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_sync_runs_filters_by_type(pool: sqlx::PgPool) {
    create_sync_run(&pool, "sync", "cli").await.unwrap();
    create_sync_run(&pool, "publish", "cli").await.unwrap();
    create_sync_run(&pool, "sync", "api").await.unwrap();

    assert_eq!(list_sync_runs(&pool, None, 10).await.unwrap().len(), 3);
    let syncs = list_sync_runs(&pool, Some("sync"), 10).await.unwrap();
    assert_eq!(syncs.len(), 2);
    assert!(syncs.iter().all(|r| r.run_type == "sync"));
    assert_eq!(syncs[0].trigger_source, "api", "newest first");
}

// ---------------------------------------------------------------------------
// Section 4: Event log
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn event_log_is_pruned_to_retention(pool: sqlx::PgPool) {
    for i in 0..5 {
        record_sync_event(
            &pool,
            EventLevel::Info,
            &format!("event {i}"),
            &json!({"i": i}),
            3,
        )
        .await
        .unwrap();
    }

    let events = list_sync_events(&pool, 10).await.unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].message, "event 4");
    assert_eq!(events[2].message, "event 2");
}

// ---------------------------------------------------------------------------
// Section 5: Downstream links
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn downstream_link_lifecycle(pool: sqlx::PgPool) {
    let first = LinkedDownstreamRecord {
        product_id: "p-1".to_string(),
        downstream_id: 501,
        sku: Some("BD35".to_string()),
        stock_quantity: Some(4),
        in_stock: true,
        published_at: synced_at(10),
    };
    upsert_downstream_link(&pool, &first).await.unwrap();

    let mut refreshed = first.clone();
    refreshed.stock_quantity = Some(0);
    refreshed.in_stock = false;
    refreshed.published_at = synced_at(11);
    upsert_downstream_link(&pool, &refreshed).await.unwrap();

    let stored = get_downstream_link(&pool, "p-1").await.unwrap().expect("link");
    assert_eq!(stored.stock_quantity, Some(0));
    assert!(!stored.in_stock);
    assert_eq!(stored.published_at, synced_at(10), "first publish time is kept");

    assert_eq!(list_downstream_links(&pool).await.unwrap().len(), 1);
    assert!(delete_downstream_link(&pool, "p-1").await.unwrap());
    assert!(!delete_downstream_link(&pool, "p-1").await.unwrap());
    assert!(get_downstream_link(&pool, "p-1").await.unwrap().is_none());
}
