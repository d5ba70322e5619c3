//! End-to-end sync runs against a `wiremock` upstream and the in-memory
//! store.

mod common;

use covasync_core::{SyncCheckpoint, UpstreamSettings};
use covasync_sync::{
    OrchestratorSettings, Stage, SyncMode, SyncOptions, SyncOrchestrator, TriggerSource,
    CATALOG_JOB,
};
use covasync_upstream::{format_updated_since, UpstreamClient};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::MemoryStore;

const TOKEN_PATH: &str = "/oauth2/token";
const CATALOG_PATH: &str = "/dataplatform/v1/companies/123/DetailedProductData";
const PRICES_PATH: &str = "/pricing/v1/Companies(123)/ProductPrices";

fn client(server: &MockServer) -> UpstreamClient {
    let settings = UpstreamSettings {
        auth_url: format!("{}{TOKEN_PATH}", server.uri()),
        api_base_url: server.uri(),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        username: "sync@example.com".to_string(),
        password: "hunter2".to_string(),
        company_id: "123".to_string(),
        location_id: Some("42".to_string()),
        token_ttl_secs: 3600,
        request_timeout_secs: 5,
        catalog_page_size: 2,
        price_page_size: 100,
        user_agent: "covasync-test/0.1".to_string(),
    };
    UpstreamClient::from_settings(&settings).expect("failed to build test client")
}

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        catalog_page_size: 2,
        price_page_size: 100,
        concurrency: 2,
    }
}

fn product(i: usize) -> Value {
    json!({
        "ProductId": format!("p-{i}"),
        "Name": format!("Product {i}"),
        "SKU": format!("SKU{i:03}"),
        "Availability": [{"LocationId": 42, "InStockQuantity": i}],
    })
}

fn page(ids: std::ops::Range<usize>) -> Value {
    json!({"Products": ids.map(product).collect::<Vec<_>>()})
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"access_token": "tok", "token_type": "bearer", "expires_in": 3600}),
        ))
        .mount(server)
        .await;
}

async fn mount_prices(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(PRICES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Id": "pr-1", "CatalogItemId": "p-0", "EntityId": 42, "RegularPrice": 12.5}
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn full_then_incremental_sync() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_prices(&server).await;

    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .and(body_partial_json(json!({"Skip": 0, "Top": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0..2)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .and(body_partial_json(json!({"Skip": 2, "Top": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(2..3)))
        .expect(1)
        .mount(&server)
        .await;

    let upstream = client(&server);
    let store = MemoryStore::default();
    let orchestrator = SyncOrchestrator::new(&upstream, &store, settings());

    let report = orchestrator
        .run(SyncOptions::default())
        .await
        .expect("first run");
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.mode, Some(SyncMode::Full));
    assert_eq!(store.product_count(), 3);

    let catalog = report.stage(Stage::Catalog).expect("catalog stage");
    assert_eq!(catalog.stats.inserted, 3);
    let inventory = report.stage(Stage::Inventory).expect("inventory stage");
    assert_eq!(inventory.source.as_deref(), Some("availability"));
    assert_eq!(store.inventory().len(), 3);
    assert_eq!(store.prices().len(), 1);

    let checkpoint = store.checkpoint(CATALOG_JOB);
    assert_eq!(checkpoint.batch_offset, 0);
    let since = checkpoint.last_sync_at.expect("last sync recorded");
    assert_eq!(since, report.started_at);

    let runs = store.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "succeeded");
    assert_eq!(runs[0].trigger, "cli");

    // Second run asks only for products changed since the first started.
    Mock::given(method("POST"))
        .and(path(format!(
            "{CATALOG_PATH}/UpdatedAsOf/{}",
            format_updated_since(since)
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Products": []})))
        .expect(1)
        .mount(&server)
        .await;

    let second = orchestrator
        .run(SyncOptions {
            force_full: false,
            trigger: TriggerSource::Scheduler,
        })
        .await
        .expect("second run");
    assert_eq!(second.mode, Some(SyncMode::Incremental));
    assert!(second.is_success());
    assert_eq!(store.product_count(), 3);
    assert!(store.checkpoint(CATALOG_JOB).last_sync_at > Some(since));
}

#[tokio::test]
async fn failed_page_leaves_a_resumable_checkpoint() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_prices(&server).await;

    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .and(body_partial_json(json!({"Skip": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0..2)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .and(body_partial_json(json!({"Skip": 2})))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .and(body_partial_json(json!({"Skip": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(2..3)))
        .mount(&server)
        .await;

    let upstream = client(&server);
    let store = MemoryStore::default();
    let orchestrator = SyncOrchestrator::new(&upstream, &store, settings());

    let failed = orchestrator
        .run(SyncOptions::default())
        .await
        .expect("run is recorded");
    assert!(!failed.is_success());
    let catalog = failed.stage(Stage::Catalog).expect("catalog stage");
    assert!(catalog.error.is_some());
    assert_eq!(
        store.checkpoint(CATALOG_JOB),
        SyncCheckpoint {
            last_sync_at: None,
            batch_offset: 2,
        }
    );
    assert_eq!(store.runs()[0].status, "failed");
    assert!(store
        .events()
        .iter()
        .any(|e| e.message == "catalog stage failed"));

    // The retry starts at the saved offset; the Skip 0 mock expects one call.
    let resumed = orchestrator
        .run(SyncOptions::default())
        .await
        .expect("resumed run");
    assert!(resumed.is_success(), "{resumed:?}");
    assert_eq!(store.product_count(), 3);
    let checkpoint = store.checkpoint(CATALOG_JOB);
    assert_eq!(checkpoint.batch_offset, 0);
    assert!(checkpoint.last_sync_at.is_some());
}

#[tokio::test]
async fn force_full_ignores_checkpoint() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_prices(&server).await;

    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .and(body_partial_json(json!({"Skip": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0..1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/UpdatedAsOf/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemoryStore::default();
    store.set_checkpoint(
        CATALOG_JOB,
        SyncCheckpoint {
            last_sync_at: Some(chrono::Utc::now()),
            batch_offset: 40,
        },
    );

    let upstream = client(&server);
    let report = SyncOrchestrator::new(&upstream, &store, settings())
        .run(SyncOptions {
            force_full: true,
            trigger: TriggerSource::Api,
        })
        .await
        .expect("run");
    assert_eq!(report.mode, Some(SyncMode::Full));
    assert!(report.is_success());
    assert_eq!(store.product_count(), 1);
}

#[tokio::test]
async fn interrupted_forced_full_run_resumes_as_full_walk() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_prices(&server).await;

    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .and(body_partial_json(json!({"Skip": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0..2)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .and(body_partial_json(json!({"Skip": 2})))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(CATALOG_PATH))
        .and(body_partial_json(json!({"Skip": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(2..3)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/UpdatedAsOf/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemoryStore::default();
    store.set_checkpoint(
        CATALOG_JOB,
        SyncCheckpoint {
            last_sync_at: Some(chrono::Utc::now()),
            batch_offset: 0,
        },
    );

    let upstream = client(&server);
    let orchestrator = SyncOrchestrator::new(&upstream, &store, settings());
    let forced = orchestrator
        .run(SyncOptions {
            force_full: true,
            trigger: TriggerSource::Api,
        })
        .await
        .expect("forced run is recorded");
    assert!(!forced.is_success());
    assert_eq!(
        store.checkpoint(CATALOG_JOB),
        SyncCheckpoint {
            last_sync_at: None,
            batch_offset: 2,
        }
    );

    let resumed = orchestrator
        .run(SyncOptions::default())
        .await
        .expect("resumed run");
    assert_eq!(resumed.mode, Some(SyncMode::Full));
    assert!(resumed.is_success(), "{resumed:?}");
    assert_eq!(store.product_count(), 3);
    assert!(store.checkpoint(CATALOG_JOB).last_sync_at.is_some());
}

#[tokio::test]
async fn inventory_endpoints_are_used_without_stored_availability() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/SupplyChain/v1/companies/123/location/42/inventory"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [{"ProductId": "p-1", "QuantityOnHand": 4}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let upstream = client(&server);
    let store = MemoryStore::default();
    let report = SyncOrchestrator::new(&upstream, &store, settings())
        .run_inventory(TriggerSource::Cli)
        .await
        .expect("run");

    assert!(report.is_success());
    let inventory = report.stage(Stage::Inventory).expect("inventory stage");
    assert_eq!(
        inventory.source.as_deref(),
        Some("SupplyChain/v1/companies/123/location/42/inventory")
    );
    assert_eq!(store.inventory()[0].location_id.as_deref(), Some("42"));
    assert_eq!(store.runs()[0].run_type, "inventory");
}

#[tokio::test]
async fn single_product_sync_reconciles_one_payload() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("POST"))
        .and(path(format!("{CATALOG_PATH}/ByProductIdList")))
        .and(body_partial_json(json!({"ProductIds": ["p-7"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(7..8)))
        .expect(1)
        .mount(&server)
        .await;

    let upstream = client(&server);
    let store = MemoryStore::default();
    let done = SyncOrchestrator::new(&upstream, &store, settings())
        .sync_product("p-7")
        .await
        .expect("sync")
        .expect("upstream has p-7");
    assert_eq!(done.product.product_id, "p-7");
    assert_eq!(done.inventory.inserted, 1);
    assert!(store.product("p-7").is_some());
}
