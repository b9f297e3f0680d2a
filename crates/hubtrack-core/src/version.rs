//! Lenient semantic version parsing
//!
//! Chart versions found in the wild are not always strict SemVer 2.0:
//! `v1.2.3`, `1.2` or `1` are accepted and normalized.

use once_cell::sync::Lazy;
use regex::Regex;
use semver::{BuildMetadata, Prerelease, Version};

use crate::error::{CoreError, Result};

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^v?([0-9]+)(?:\.([0-9]+))?(?:\.([0-9]+))?(?:-([0-9A-Za-z\-]+(?:\.[0-9A-Za-z\-]+)*))?(?:\+([0-9A-Za-z\-]+(?:\.[0-9A-Za-z\-]+)*))?$",
    )
    .expect("version regex is valid")
});

/// Parse a version, padding missing minor/patch components with zero
pub fn parse_version(input: &str) -> Result<Version> {
    let invalid = || CoreError::InvalidVersion {
        version: input.to_string(),
    };

    let caps = VERSION_RE.captures(input.trim()).ok_or_else(invalid)?;
    let number = |i: usize| -> Result<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().map_err(|_| invalid()),
            None => Ok(0),
        }
    };

    let mut version = Version::new(number(1)?, number(2)?, number(3)?);
    if let Some(pre) = caps.get(4) {
        version.pre = Prerelease::new(pre.as_str()).map_err(|_| invalid())?;
    }
    if let Some(build) = caps.get(5) {
        version.build = BuildMetadata::new(build.as_str()).map_err(|_| invalid())?;
    }
    Ok(version)
}

/// Check if a string is a valid (lenient) semantic version
pub fn is_valid_version(input: &str) -> bool {
    parse_version(input).is_ok()
}
