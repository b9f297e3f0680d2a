//! Tracker source tests driven by in-memory services

use async_trait::async_trait;
use hubtrack_core::{Chart, ChartFile, Repository, load_files};
use hubtrack_repo::{
    ChartLoader, ChartVersion, ImageStore, IndexLoader, LoadOptions, ProvenanceChecker,
    RepoError, RepositoryIndex, TagsGetter,
};
use hubtrack_tracker::{
    MemoryErrorsCollector, TrackerConfig, TrackerError, TrackerServices, TrackerSource,
    TrackerSourceInput, plan,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const REPO_URL: &str = "https://charts.example.com/stable";

// ============ Mock services ============

#[derive(Default)]
struct MockIndexLoader {
    index: RepositoryIndex,
}

#[async_trait]
impl IndexLoader for MockIndexLoader {
    async fn load_index(&self, _repository: &Repository) -> hubtrack_repo::Result<RepositoryIndex> {
        Ok(self.index.clone())
    }
}

#[derive(Default)]
struct MockTagsGetter {
    tags: Vec<String>,
}

#[async_trait]
impl TagsGetter for MockTagsGetter {
    async fn tags(&self, _repository: &Repository) -> hubtrack_repo::Result<Vec<String>> {
        Ok(self.tags.clone())
    }
}

#[derive(Default)]
struct MockChartLoader {
    charts: HashMap<String, Chart>,
    loaded: Mutex<Vec<String>>,
    delay: Option<Duration>,
    panic_on: Option<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl ChartLoader for MockChartLoader {
    async fn load(&self, url: &str, _options: &LoadOptions) -> hubtrack_repo::Result<Chart> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.panic_on.as_deref() == Some(url) {
            panic!("corrupted archive");
        }

        self.loaded.lock().unwrap().push(url.to_string());
        self.charts
            .get(url)
            .cloned()
            .ok_or(RepoError::UnexpectedStatus { status: 404 })
    }
}

struct MockImageStore;

#[async_trait]
impl ImageStore for MockImageStore {
    async fn download_and_save_image(&self, url: &str) -> hubtrack_repo::Result<String> {
        if url.ends_with("broken.png") {
            return Err(RepoError::UnexpectedStatus { status: 500 });
        }
        Ok(format!("id-of-{}", url.rsplit('/').next().unwrap_or_default()))
    }
}

#[derive(Default)]
struct MockProvenance {
    signed: Vec<String>,
    checked: Mutex<Vec<String>>,
}

#[async_trait]
impl ProvenanceChecker for MockProvenance {
    async fn has_provenance_file(
        &self,
        _repository: &Repository,
        chart_url: &str,
    ) -> hubtrack_repo::Result<bool> {
        self.checked.lock().unwrap().push(chart_url.to_string());
        Ok(self.signed.iter().any(|u| u == chart_url))
    }
}

// ============ Fixtures ============

fn chart(name: &str, version: &str, extra: &str) -> Chart {
    load_files(vec![
        ChartFile::new(
            "Chart.yaml",
            format!(
                "apiVersion: v2\nname: {}\nversion: {}\ndescription: The {} chart\n{}",
                name, version, name, extra
            ),
        ),
        ChartFile::new(
            "templates/deployment.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: app\nspec:\n  template:\n    spec:\n      containers:\n        - name: app\n          image: ghcr.io/org/app:1.0.0\n",
        ),
    ])
    .unwrap()
}

fn chart_version(name: &str, version: &str, digest: &str, deprecated: bool) -> ChartVersion {
    let mut cv = ChartVersion::new(name, version);
    cv.digest = digest.to_string();
    cv.metadata.deprecated = deprecated;
    cv.urls = vec![format!("{}-{}.tgz", name, version)];
    cv
}

fn index(versions: Vec<ChartVersion>) -> RepositoryIndex {
    let mut index = RepositoryIndex::default();
    for cv in versions {
        index
            .entries
            .entry(cv.name().to_string())
            .or_default()
            .push(cv);
    }
    index
}

struct Harness {
    index_loader: MockIndexLoader,
    tags_getter: MockTagsGetter,
    chart_loader: Arc<MockChartLoader>,
    provenance: Arc<MockProvenance>,
    errors: Arc<MemoryErrorsCollector>,
    config: TrackerConfig,
    cancel: CancellationToken,
}

impl Harness {
    fn new(chart_loader: MockChartLoader) -> Self {
        Self {
            index_loader: MockIndexLoader::default(),
            tags_getter: MockTagsGetter::default(),
            chart_loader: Arc::new(chart_loader),
            provenance: Arc::new(MockProvenance {
                signed: vec![format!("{}/web-1.1.0.tgz", REPO_URL)],
                ..Default::default()
            }),
            errors: Arc::new(MemoryErrorsCollector::new()),
            config: TrackerConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    fn source(self, url: &str, registered: &[(&str, &str)]) -> (TrackerSource, Self) {
        let services = TrackerServices {
            cancel: self.cancel.clone(),
            config: self.config.clone(),
            index_loader: Arc::new(MockIndexLoader {
                index: self.index_loader.index.clone(),
            }),
            tags_getter: Arc::new(MockTagsGetter {
                tags: self.tags_getter.tags.clone(),
            }),
            chart_loader: self.chart_loader.clone(),
            image_store: Arc::new(MockImageStore),
            provenance: self.provenance.clone(),
            errors: self.errors.clone(),
        };
        let mut repository = Repository::new("stable", url);
        repository.repository_id = "repo-1".to_string();

        let source = TrackerSource::new(TrackerSourceInput {
            repository,
            packages_registered: registered
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            services,
        });
        (source, self)
    }
}

fn url(file: &str) -> String {
    format!("{}/{}", REPO_URL, file)
}

// ============ Tests ============

#[tokio::test]
async fn test_http_repository_packages() {
    let mut loader = MockChartLoader::default();
    loader.charts.insert(
        url("web-1.1.0.tgz"),
        chart(
            "web",
            "1.1.0",
            "icon: https://example.com/web.png\nsources:\n  - https://github.com/org/web\n",
        ),
    );
    loader
        .charts
        .insert(url("web-1.0.0.tgz"), chart("web", "1.0.0", ""));

    let mut harness = Harness::new(loader);
    harness.index_loader.index = index(vec![
        chart_version("web", "1.0.0", "aaa", false),
        chart_version("web", "1.1.0", "bbb", false),
    ]);
    let (source, harness) = harness.source(REPO_URL, &[("web@1.0.0", "aaa")]);

    let packages = source.get_packages_available().await.unwrap();
    let keys: Vec<_> = packages.keys().cloned().collect();
    assert_eq!(keys, vec!["web@1.0.0", "web@1.1.0"]);

    // Registered with the same digest: index data only
    let unchanged = &packages["web@1.0.0"];
    assert_eq!(unchanged.content_url, url("web-1.0.0.tgz"));
    assert_eq!(unchanged.digest.as_deref(), Some("aaa"));
    assert!(unchanged.description.is_none());

    // New version: downloaded and enriched
    let new = &packages["web@1.1.0"];
    assert_eq!(new.description.as_deref(), Some("The web chart"));
    assert_eq!(new.logo_image_id.as_deref(), Some("id-of-web.png"));
    assert_eq!(new.logo_url.as_deref(), Some("https://example.com/web.png"));
    assert!(new.signed);
    assert_eq!(new.containers_images[0].image, "ghcr.io/org/app:1.0.0");
    assert_eq!(new.links[0].name, "source");
    assert_eq!(new.repository.repository_id, "repo-1");

    assert_eq!(*harness.chart_loader.loaded.lock().unwrap(), vec![url("web-1.1.0.tgz")]);
    assert!(harness.errors.all().is_empty());
}

#[tokio::test]
async fn test_bypass_digest_check_enriches_everything() {
    let mut loader = MockChartLoader::default();
    loader.charts.insert(url("web-1.0.0.tgz"), chart("web", "1.0.0", ""));

    let mut harness = Harness::new(loader);
    harness.config.bypass_digest_check = true;
    harness.index_loader.index = index(vec![chart_version("web", "1.0.0", "aaa", false)]);
    let (source, harness) = harness.source(REPO_URL, &[("web@1.0.0", "aaa")]);

    let packages = source.get_packages_available().await.unwrap();
    assert_eq!(packages["web@1.0.0"].description.as_deref(), Some("The web chart"));
    assert_eq!(harness.chart_loader.loaded.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_versions_are_reported_and_skipped() {
    let mut loader = MockChartLoader::default();
    loader.charts.insert(
        url("api-2.0.0.tgz"),
        chart("api", "2.0.0", "annotations:\n  artifacthub.io/operator: maybe\n"),
    );
    loader.charts.insert(
        url("web-1.0.0.tgz"),
        chart("web", "1.0.0", "icon: https://example.com/broken.png\n"),
    );

    let mut harness = Harness::new(loader);
    harness.index_loader.index = index(vec![
        chart_version("web", "1.0.0", "aaa", false),
        chart_version("web", "not-a-version", "bbb", false),
        chart_version("api", "2.0.0", "ccc", false),
        chart_version("old", "0.1.0", "ddd", true),
    ]);
    let (source, harness) = harness.source(REPO_URL, &[]);

    let packages = source.get_packages_available().await.unwrap();
    let keys: Vec<_> = packages.keys().cloned().collect();
    assert_eq!(keys, vec!["web@1.0.0"]);
    assert!(packages["web@1.0.0"].logo_image_id.is_none());

    // The deprecated chart failed to load but is not collected
    let mut errors = harness.errors.errors("repo-1");
    errors.sort();
    insta::assert_yaml_snapshot!(errors, @r###"
    - "error getting logo image https://example.com/broken.png: unexpected status code received: 500 (package: web version: 1.0.0)"
    - "error preparing package: error enriching package from annotations: invalid annotation: invalid operator value: maybe (package: api version: 2.0.0)"
    - "error preparing package: invalid package version: Invalid semantic version: not-a-version (package: web version: not-a-version)"
    "###);
}

#[tokio::test]
async fn test_oci_repository_versions_from_tags() {
    let oci_url = "oci://ghcr.io/org/charts/web";
    let mut loader = MockChartLoader::default();
    loader
        .charts
        .insert(format!("{}:1.0.0", oci_url), chart("web", "1.0.0", ""));
    loader
        .charts
        .insert(format!("{}:1.1.0", oci_url), chart("web", "1.1.0", ""));

    let mut harness = Harness::new(loader);
    harness.tags_getter.tags = vec!["1.0.0".to_string(), "1.1.0".to_string()];
    let (source, harness) = harness.source(oci_url, &[]);

    let packages = source.get_packages_available().await.unwrap();
    assert_eq!(packages.len(), 2);
    assert_eq!(
        packages["web@1.1.0"].content_url,
        "oci://ghcr.io/org/charts/web:1.1.0"
    );
    assert!(!packages["web@1.1.0"].signed);
    assert!(harness.provenance.checked.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let mut loader = MockChartLoader {
        delay: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let mut versions = Vec::new();
    for patch in 0..8 {
        let version = format!("1.0.{}", patch);
        loader
            .charts
            .insert(url(&format!("web-{}.tgz", version)), chart("web", &version, ""));
        versions.push(chart_version("web", &version, "x", false));
    }

    let mut harness = Harness::new(loader);
    harness.config.concurrency = 2;
    harness.index_loader.index = index(versions);
    let (source, harness) = harness.source(REPO_URL, &[]);

    let packages = source.get_packages_available().await.unwrap();
    assert_eq!(packages.len(), 8);
    assert!(harness.chart_loader.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_cancelled_run() {
    let mut harness = Harness::new(MockChartLoader::default());
    harness.index_loader.index = index(vec![chart_version("web", "1.0.0", "aaa", false)]);
    harness.cancel.cancel();
    let (source, harness) = harness.source(REPO_URL, &[]);

    let err = source.get_packages_available().await.unwrap_err();
    assert!(matches!(err, TrackerError::Cancelled));
    assert!(harness.chart_loader.loaded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_while_workers_run() {
    let mut loader = MockChartLoader {
        delay: Some(Duration::from_millis(500)),
        ..Default::default()
    };
    loader.charts.insert(
        url("web-1.0.0.tgz"),
        chart("web", "1.0.0", "icon: https://example.com/web.png\n"),
    );

    let mut harness = Harness::new(loader);
    harness.index_loader.index = index(vec![chart_version("web", "1.0.0", "new", false)]);
    let cancel = harness.cancel.clone();
    let (source, harness) = harness.source(REPO_URL, &[("web@1.0.0", "old")]);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    // A partial result would unregister the interrupted versions, and the
    // interrupted logo download is not a problem of the chart
    let err = source.get_packages_available().await.unwrap_err();
    assert!(matches!(err, TrackerError::Cancelled));
    assert!(harness.errors.all().is_empty());
}

#[tokio::test]
async fn test_panicking_worker_is_reported() {
    let mut loader = MockChartLoader {
        panic_on: Some(url("api-2.0.0.tgz")),
        ..Default::default()
    };
    loader.charts.insert(url("web-1.0.0.tgz"), chart("web", "1.0.0", ""));

    let mut harness = Harness::new(loader);
    harness.index_loader.index = index(vec![
        chart_version("web", "1.0.0", "aaa", false),
        chart_version("api", "2.0.0", "bbb", false),
    ]);
    let (source, harness) = harness.source(REPO_URL, &[]);

    let packages = source.get_packages_available().await.unwrap();
    assert_eq!(packages.keys().collect::<Vec<_>>(), vec!["web@1.0.0"]);

    let errors = harness.errors.errors("repo-1");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("error preparing package: task "));
    assert!(errors[0].ends_with("(package: api version: 2.0.0)"));
}

#[tokio::test]
async fn test_unsupported_scheme() {
    let (source, _) =
        Harness::new(MockChartLoader::default()).source("ftp://charts.example.com", &[]);
    let err = source.get_packages_available().await.unwrap_err();
    assert!(matches!(
        err,
        TrackerError::Repo(RepoError::SchemeNotSupported { .. })
    ));
}

#[tokio::test]
async fn test_plan_from_available_packages() {
    let mut loader = MockChartLoader::default();
    loader.charts.insert(url("web-1.1.0.tgz"), chart("web", "1.1.0", ""));

    let mut harness = Harness::new(loader);
    harness.index_loader.index = index(vec![
        chart_version("web", "1.0.0", "aaa", false),
        chart_version("web", "1.1.0", "bbb", false),
    ]);
    let registered = [("web@1.0.0", "aaa"), ("web@0.9.0", "zzz")];
    let (source, _) = harness.source(REPO_URL, &registered);

    let available: BTreeMap<_, _> = source.get_packages_available().await.unwrap();
    let registered: HashMap<String, String> = registered
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let plan = plan(&available, &registered, false);
    assert_eq!(plan.register.len(), 1);
    assert_eq!(plan.register[0].key(), "web@1.1.0");
    assert_eq!(plan.unregister, vec!["web@0.9.0"]);
}
