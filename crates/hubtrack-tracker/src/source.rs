//! Helm tracker source
//!
//! Lists the chart versions a repository serves and prepares a package for
//! each of them on a bounded pool of workers. Versions that fail to prepare
//! are reported and skipped so one broken chart never hides the others.

use hubtrack_core::{ChartMetadata, Package, Repository};
use hubtrack_repo::{
    ChartLoader, ChartVersion, FsImageStore, HttpClient, HttpIndexLoader, HttpProvenanceChecker,
    ImageStore, IndexLoader, OciClient, OciTagsGetter, ProvenanceChecker, RateLimiter,
    RemoteChartLoader, RepoError, TagsGetter, cancellable, oci,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};

/// Receives the problems found while tracking a repository
pub trait ErrorsCollector: Send + Sync {
    fn append(&self, repository_id: &str, err: String);
}

/// Errors collector keeping everything in memory
#[derive(Debug, Default)]
pub struct MemoryErrorsCollector {
    errors: Mutex<BTreeMap<String, Vec<String>>>,
}

impl MemoryErrorsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors reported for a repository, in arrival order
    pub fn errors(&self, repository_id: &str) -> Vec<String> {
        self.lock().get(repository_id).cloned().unwrap_or_default()
    }

    /// Every error reported so far, by repository
    pub fn all(&self) -> BTreeMap<String, Vec<String>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<String>>> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ErrorsCollector for MemoryErrorsCollector {
    fn append(&self, repository_id: &str, err: String) {
        self.lock()
            .entry(repository_id.to_string())
            .or_default()
            .push(err);
    }
}

/// Services the tracker source relies on
#[derive(Clone)]
pub struct TrackerServices {
    pub cancel: CancellationToken,
    pub config: TrackerConfig,
    pub index_loader: Arc<dyn IndexLoader>,
    pub tags_getter: Arc<dyn TagsGetter>,
    pub chart_loader: Arc<dyn ChartLoader>,
    pub image_store: Arc<dyn ImageStore>,
    pub provenance: Arc<dyn ProvenanceChecker>,
    pub errors: Arc<dyn ErrorsCollector>,
}

impl TrackerServices {
    /// Services talking to real repositories and registries
    ///
    /// All chart downloads share one GitHub rate limiter.
    pub fn remote(
        config: TrackerConfig,
        cancel: CancellationToken,
        errors: Arc<dyn ErrorsCollector>,
    ) -> Result<Self> {
        let client = HttpClient::new(config.http_timeout())?;
        let github_limiter = Arc::new(RateLimiter::new(config.github_rate_limit));

        let chart_loader =
            RemoteChartLoader::new(client.clone(), Arc::new(OciClient::new()), github_limiter)
                .with_github_token(config.github_token.clone());

        Ok(Self {
            cancel,
            index_loader: Arc::new(HttpIndexLoader::new(client.clone())),
            tags_getter: Arc::new(OciTagsGetter::new(OciClient::new())),
            chart_loader: Arc::new(chart_loader),
            image_store: Arc::new(FsImageStore::new(client.clone(), config.images_dir())),
            provenance: Arc::new(HttpProvenanceChecker::new(client)),
            errors,
            config,
        })
    }
}

impl fmt::Debug for TrackerServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerServices")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Input of a tracker source run
#[derive(Debug, Clone)]
pub struct TrackerSourceInput {
    pub repository: Repository,

    /// Digest of every registered package version, by package key
    pub packages_registered: HashMap<String, String>,

    pub services: TrackerServices,
}

/// Tracker source for Helm repositories
#[derive(Debug, Clone)]
pub struct TrackerSource {
    pub(crate) input: Arc<TrackerSourceInput>,
}

impl TrackerSource {
    pub fn new(input: TrackerSourceInput) -> Self {
        Self {
            input: Arc::new(input),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.input.repository
    }

    pub(crate) fn services(&self) -> &TrackerServices {
        &self.input.services
    }

    /// Packages available in the repository, by package key
    pub async fn get_packages_available(&self) -> Result<BTreeMap<String, Package>> {
        let cancel = self.services().cancel.clone();
        let chart_versions = self.get_charts().await?;
        let total = chart_versions.len();

        let semaphore = Arc::new(Semaphore::new(self.services().config.workers()));
        let mut workers = JoinSet::new();
        let mut running: HashMap<task::Id, ChartMetadata> = HashMap::new();
        let mut packages = BTreeMap::new();

        for chart_version in chart_versions {
            if cancel.is_cancelled() {
                return Err(wait_and_cancel(workers).await);
            }
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(wait_and_cancel(workers).await),
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|_| TrackerError::Cancelled)?
                }
            };

            let source = self.clone();
            let md = chart_version.metadata.clone();
            let handle = workers.spawn(async move {
                let _permit = permit;
                source.prepare_or_warn(chart_version).await
            });
            running.insert(handle.id(), md);

            while let Some(done) = workers.try_join_next_with_id() {
                self.collect(&mut packages, &mut running, done);
            }
        }

        while let Some(done) = workers.join_next_with_id().await {
            self.collect(&mut packages, &mut running, done);
        }

        // Versions interrupted by a late cancellation are missing from the map
        if cancel.is_cancelled() {
            tracing::debug!(
                repository = %self.repository().name,
                "cancelled after all workers started"
            );
            return Err(TrackerError::Cancelled);
        }

        tracing::info!(
            repository = %self.repository().name,
            versions = total,
            packages = packages.len(),
            "repository packages prepared"
        );
        Ok(packages)
    }

    /// Chart versions served by the repository
    pub async fn get_charts(&self) -> Result<Vec<ChartVersion>> {
        let repository = self.repository();
        let scheme = Url::parse(&repository.url)
            .map_err(|e| RepoError::InvalidRepositoryUrl {
                url: repository.url.clone(),
                reason: e.to_string(),
            })?
            .scheme()
            .to_string();
        let cancel = &self.services().cancel;

        let charts = match scheme.as_str() {
            "http" | "https" => {
                let index = cancellable(
                    cancel,
                    self.services().index_loader.load_index(repository),
                )
                .await?;
                index.entries.into_values().flatten().collect()
            }
            "oci" => {
                let tags =
                    cancellable(cancel, self.services().tags_getter.tags(repository)).await?;
                let name = oci::chart_name(&repository.url);
                tags.into_iter()
                    .map(|tag| {
                        let mut chart_version = ChartVersion::new(name, tag.clone());
                        chart_version.urls = vec![format!("{}:{}", repository.url, tag)];
                        chart_version
                    })
                    .collect()
            }
            _ => return Err(RepoError::SchemeNotSupported { scheme }.into()),
        };
        Ok(charts)
    }

    /// Report a problem found with a chart version
    ///
    /// Problems with deprecated charts are logged but not collected.
    pub fn warn(&self, md: &ChartMetadata, err: impl fmt::Display) {
        let message = format!("{} (package: {} version: {})", err, md.name, md.version);
        tracing::warn!(repository = %self.repository().name, "{}", message);
        if !md.deprecated {
            self.services()
                .errors
                .append(&self.repository().repository_id, message);
        }
    }

    async fn prepare_or_warn(&self, chart_version: ChartVersion) -> Option<Package> {
        match self.prepare_package(&chart_version).await {
            Ok(package) => Some(package),
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                self.warn(
                    &chart_version.metadata,
                    format!("error preparing package: {}", e),
                );
                None
            }
        }
    }

    fn collect(
        &self,
        packages: &mut BTreeMap<String, Package>,
        running: &mut HashMap<task::Id, ChartMetadata>,
        done: std::result::Result<(task::Id, Option<Package>), task::JoinError>,
    ) {
        match done {
            Ok((id, package)) => {
                running.remove(&id);
                if let Some(package) = package {
                    packages.insert(package.key(), package);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "package worker failed");
                if let Some(md) = running.remove(&e.id()) {
                    self.warn(&md, format!("error preparing package: {}", e));
                }
            }
        }
    }
}

/// Let in-flight workers finish, then report the cancellation
async fn wait_and_cancel(mut workers: JoinSet<Option<Package>>) -> TrackerError {
    tracing::debug!(in_flight = workers.len(), "cancelled, waiting for workers");
    while workers.join_next().await.is_some() {}
    TrackerError::Cancelled
}

/// Errors collector that drops everything, for one-off runs
#[derive(Debug, Default)]
pub struct NoopErrorsCollector;

impl ErrorsCollector for NoopErrorsCollector {
    fn append(&self, _repository_id: &str, _err: String) {}
}
