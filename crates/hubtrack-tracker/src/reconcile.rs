//! Reconciliation of available packages against registered ones

use hubtrack_core::Package;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Changes needed to bring the registered state in line with a repository
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncPlan {
    /// Packages to register, new or changed
    pub register: Vec<Package>,

    /// Keys of registered packages no longer available
    pub unregister: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.register.is_empty() && self.unregister.is_empty()
    }
}

/// Compute what has to be registered and unregistered
pub fn plan(
    available: &BTreeMap<String, Package>,
    registered: &HashMap<String, String>,
    bypass_digest_check: bool,
) -> SyncPlan {
    let register = available
        .iter()
        .filter(|(key, package)| match registered.get(*key) {
            None => true,
            Some(digest) => {
                bypass_digest_check
                    || package.digest.as_deref().unwrap_or_default() != digest.as_str()
            }
        })
        .map(|(_, package)| package.clone())
        .collect();

    let mut unregister: Vec<String> = registered
        .keys()
        .filter(|key| !available.contains_key(*key))
        .cloned()
        .collect();
    unregister.sort();

    SyncPlan {
        register,
        unregister,
    }
}
