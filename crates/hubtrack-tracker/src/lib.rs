//! Hubtrack Tracker - Helm repository tracker source
//!
//! Given a repository and the digests of the package versions already
//! registered, the tracker source returns every package available in the
//! repository:
//!
//! - chart versions are listed from the index (http/https) or the tags
//!   (oci) of the repository
//! - each version is prepared on a bounded pool of workers
//! - new or changed versions are downloaded and enriched with the chart
//!   contents and its `artifacthub.io/*` annotations
//!
//! ## Example
//!
//! ```rust,no_run
//! use hubtrack_core::Repository;
//! use hubtrack_tracker::{
//!     MemoryErrorsCollector, TrackerConfig, TrackerServices, TrackerSource, TrackerSourceInput,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let errors = Arc::new(MemoryErrorsCollector::new());
//! let services =
//!     TrackerServices::remote(TrackerConfig::default(), CancellationToken::new(), errors.clone())?;
//! let source = TrackerSource::new(TrackerSourceInput {
//!     repository: Repository::new("bitnami", "https://charts.bitnami.com/bitnami"),
//!     packages_registered: Default::default(),
//!     services,
//! });
//!
//! let packages = source.get_packages_available().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod enrich;
pub mod error;
pub mod images;
pub mod prepare;
pub mod reconcile;
pub mod source;

// Re-exports for convenience
pub use config::{DEFAULT_CONCURRENCY, TrackerConfig};
pub use enrich::{enrich_package_from_annotations, enrich_package_from_chart, parse_bool};
pub use error::{AnnotationErrors, Result, TrackerError};
pub use images::validate_containers_images;
pub use prepare::{needs_enrichment, resolve_chart_url};
pub use reconcile::{SyncPlan, plan};
pub use source::{
    ErrorsCollector, MemoryErrorsCollector, NoopErrorsCollector, TrackerServices, TrackerSource,
    TrackerSourceInput,
};
