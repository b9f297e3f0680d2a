//! Provenance file detection
//!
//! A signed chart is published next to a `<chart url>.prov` file holding a
//! PGP clearsigned document.

use async_trait::async_trait;
use hubtrack_core::Repository;

use crate::client::HttpClient;
use crate::error::{RepoError, Result};

const PGP_SIGNATURE_MARKER: &str = "PGP SIGNATURE";

/// Checks whether a chart has a provenance file
#[async_trait]
pub trait ProvenanceChecker: Send + Sync {
    async fn has_provenance_file(&self, repository: &Repository, chart_url: &str) -> Result<bool>;
}

/// Provenance checker requesting `<chart url>.prov` over HTTP(S)
pub struct HttpProvenanceChecker {
    client: HttpClient,
}

impl HttpProvenanceChecker {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProvenanceChecker for HttpProvenanceChecker {
    async fn has_provenance_file(&self, repository: &Repository, chart_url: &str) -> Result<bool> {
        chart_has_provenance_file(&self.client, chart_url, repository.basic_auth()).await
    }
}

pub async fn chart_has_provenance_file(
    client: &HttpClient,
    chart_url: &str,
    auth: Option<(&str, &str)>,
) -> Result<bool> {
    let response = client
        .get(&format!("{}.prov", chart_url))
        .basic_auth(auth)
        .send()
        .await?;
    if response.status() != reqwest::StatusCode::OK {
        return Ok(false);
    }

    let body = response.bytes().await?;
    if String::from_utf8_lossy(&body).contains(PGP_SIGNATURE_MARKER) {
        Ok(true)
    } else {
        Err(RepoError::InvalidProvenance)
    }
}
