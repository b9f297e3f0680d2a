//! Hubtrack Render - Dry-run rendering of Helm charts
//!
//! Helm charts are written with Go templates. This crate parses them with a
//! pest grammar, evaluates them with the sprig/Helm function library and
//! renders whole charts the way a dry-run install does, so the container
//! images a chart deploys can be extracted.

pub mod ast;
pub mod engine;
pub mod error;
pub mod files_object;
pub mod functions;
pub mod images;
pub mod parser;
pub mod render;
pub mod value;

pub use engine::Engine;
pub use error::{RenderError, Result};
pub use images::{extract_containers_images, images_in_manifest};
pub use render::{RenderOptions, render_chart};
pub use value::Value;
