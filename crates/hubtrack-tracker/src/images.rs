//! Container image validation

use hubtrack_core::ContainerImage;
use oci_distribution::Reference;
use std::collections::HashSet;

/// Check that every image is a valid reference and names are unique
pub fn validate_containers_images(images: &[ContainerImage]) -> Result<(), String> {
    let mut names = HashSet::new();
    for image in images {
        if image.image.is_empty() {
            return Err("invalid container image: image url not provided".to_string());
        }
        if let Err(e) = Reference::try_from(image.image.as_str()) {
            return Err(format!(
                "invalid container image: invalid image reference {}: {}",
                image.image, e
            ));
        }
        if !image.name.is_empty() && !names.insert(image.name.as_str()) {
            return Err(format!(
                "invalid container image: duplicated name: {}",
                image.name
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str, reference: &str) -> ContainerImage {
        ContainerImage {
            name: name.to_string(),
            image: reference.to_string(),
            whitelisted: false,
        }
    }

    #[test]
    fn test_valid_images() {
        let images = vec![
            image("app", "ghcr.io/org/app:1.0.0"),
            image("", "nginx"),
            image("", "bitnami/redis:7.2@sha256:0f6f1c7ab8bb6fd1e9b67b5f0d0c1c3b3e5a1b7d3d3b6f8a4f0b9d7e1b5a6c8d"),
        ];
        assert!(validate_containers_images(&images).is_ok());
    }

    #[test]
    fn test_missing_reference() {
        let err = validate_containers_images(&[image("app", "")]).unwrap_err();
        assert_eq!(err, "invalid container image: image url not provided");
    }

    #[test]
    fn test_invalid_reference() {
        let err = validate_containers_images(&[image("", "not a/valid image")]).unwrap_err();
        assert!(err.starts_with("invalid container image: invalid image reference"));
    }

    #[test]
    fn test_duplicated_name() {
        let images = vec![image("app", "nginx:1"), image("app", "nginx:2")];
        let err = validate_containers_images(&images).unwrap_err();
        assert_eq!(err, "invalid container image: duplicated name: app");
    }
}
