//! Synchronization engine between the upstream retail API, the local
//! Postgres copy, and the downstream commerce catalog.
//!
//! - [`Reconciler`] normalizes raw upstream records and upserts them.
//! - [`SyncOrchestrator`] sequences the catalog, price and inventory stages
//!   and keeps the resumable checkpoint.
//! - [`BatchImageJob`] hands product images to the asset collaborator in
//!   bounded, resumable batches.
//! - [`DownstreamPublisher`] creates or updates linked downstream products.
//!
//! Storage is reached through the traits in [`store`]; [`PgStore`] is the
//! production implementation.

pub mod error;
pub mod image_job;
pub mod orchestrator;
pub mod publish;
pub mod reconcile;
pub mod store;

pub use error::{AssetError, PublishError, ReconcileError, StoreError, SyncError};
pub use image_job::{
    AssetRequest, AssetSink, BatchImageJob, ImageBatchProgress, WebhookAssetSink,
};
pub use orchestrator::{
    OrchestratorSettings, Stage, StageReport, SyncMode, SyncOptions, SyncOrchestrator, SyncReport,
    TriggerSource, CATALOG_JOB, IMAGES_JOB, PUBLISH_JOB,
};
pub use publish::{
    ClearSummary, DownstreamCatalog, DownstreamProduct, DownstreamPublisher, DownstreamRecord,
    PublishAction, PublishOutcome, PublishStatus, PublishSummary, PublisherSettings,
    SkuRepairStats, StockStatus, WooCommerceClient,
};
pub use reconcile::{CatalogStats, ProductReconciled, ReconcileStats, Reconciled, Reconciler};
pub use store::{CatalogStore, CheckpointStore, LinkStore, PgStore, RunLog, SyncStore};
