//! Hubtrack Repository Access
//!
//! This crate talks to the places charts live:
//!
//! - **HTTP repositories**: Helm-style repos publishing an `index.yaml`
//! - **OCI registries**: chart versions are tags, archives are image layers
//! - **Chart packages**: downloaded and loaded into a `Chart`
//! - **Logos**: downloaded and stored by content hash
//!
//! Each remote concern sits behind an async trait (`IndexLoader`,
//! `TagsGetter`, `ChartLoader`, `ProvenanceChecker`, `ImageStore`) so the
//! tracker can be driven by in-memory implementations in tests.
//!
//! ## Security Notes
//!
//! - Credentials are NEVER sent after cross-origin redirects
//! - GitHub downloads share one rate limiter across all workers

pub mod client;
pub mod error;
pub mod fetch;
pub mod images;
pub mod index;
pub mod oci;
pub mod provenance;
pub mod ratelimit;

// Re-exports for convenience
pub use client::{DEFAULT_TIMEOUT, HttpClient, cancellable};
pub use error::{RepoError, Result};
pub use fetch::{ChartLoader, LoadOptions, RemoteChartLoader};
pub use images::{FsImageStore, ImageStore, image_id};
pub use index::{ChartVersion, HttpIndexLoader, IndexLoader, RepositoryIndex, index_url};
pub use oci::{OCI_PREFIX, OciClient, OciTagsGetter, TagsGetter};
pub use provenance::{HttpProvenanceChecker, ProvenanceChecker, chart_has_provenance_file};
pub use ratelimit::{RateLimitConfig, RateLimiter};
