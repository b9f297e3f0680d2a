//! Hubtrack Core - Core types and utilities for the Helm repository tracker
//!
//! This crate provides the foundational types used throughout hubtrack:
//! - `Package`: A chart version as the hub registers it
//! - `Chart`: A loaded Helm chart and its metadata
//! - `Values`: Chart values with deep merge support
//! - Archive loading, lenient versions, license detection and changes parsing

pub mod archive;
pub mod changes;
pub mod chart;
pub mod error;
pub mod license;
pub mod package;
pub mod values;
pub mod version;

pub use archive::{load_archive, load_files, write_archive};
pub use changes::parse_changes_annotation;
pub use chart::{Chart, ChartDependency, ChartFile, ChartMaintainer, ChartMetadata};
pub use error::{CoreError, Result};
pub use package::{
    Change, ContainerImage, Link, Maintainer, Package, Recommendation, Repository,
    RepositoryKind, SignKey, build_key,
};
pub use values::{Values, deep_merge};
pub use version::{is_valid_version, parse_version};
