//! Container image extraction from a rendered chart

use hubtrack_core::Chart;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;
use crate::render::{RenderOptions, render_chart};

static IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\simage:\s(\S+)").expect("image regex is valid"));

/// Images referenced by the manifest of a dry-run install of `chart`
pub fn extract_containers_images(chart: &Chart) -> Result<Vec<String>> {
    let manifest = render_chart(chart, &RenderOptions::default())?;
    Ok(images_in_manifest(&manifest))
}

/// Scan a manifest for `image:` fields, unquoted and deduplicated in order
pub fn images_in_manifest(manifest: &str) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    for caps in IMAGE_RE.captures_iter(manifest) {
        let image = caps[1].trim_matches(['"', '\'']);
        if !image.is_empty() && !images.iter().any(|i| i == image) {
            images.push(image.to_string());
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images_in_manifest() {
        let manifest = r#"---
spec:
  containers:
    - name: app
      image: "nginx:1.25"
    - name: sidecar
      image: 'busybox'
  initContainers:
    - image: nginx:1.25
      name: init
  notAnImage: "image: x"
"#;
        assert_eq!(images_in_manifest(manifest), vec!["nginx:1.25", "busybox"]);
    }

    #[test]
    fn test_empty_quoted_image_is_dropped() {
        assert!(images_in_manifest("\n  image: \"\"\n").is_empty());
    }
}
