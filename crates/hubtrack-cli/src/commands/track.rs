//! Track command - list the packages available in a repository

use clap::Args;
use hubtrack_core::Repository;
use hubtrack_tracker::{
    MemoryErrorsCollector, TrackerServices, TrackerSource, TrackerSourceInput, plan,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::commands::{cancel_on_ctrl_c, load_config};
use crate::display::{self, OutputFormat, PlanSummary, TrackReport};
use crate::error::{CliError, Result};

#[derive(Debug, Args)]
pub struct TrackArgs {
    /// Repository URL (http(s) index location or oci:// reference)
    pub url: String,

    /// Repository name (defaults to the last segment of the url)
    #[arg(long)]
    pub name: Option<String>,

    /// Identifier errors are reported under (defaults to the name)
    #[arg(long)]
    pub repository_id: Option<String>,

    /// Username for basic auth
    #[arg(long)]
    pub auth_user: Option<String>,

    /// Password for basic auth
    #[arg(long, env = "HUBTRACK_AUTH_PASS", hide_env_values = true)]
    pub auth_pass: Option<String>,

    /// YAML or JSON map of registered package keys to digests
    #[arg(long)]
    pub registered: Option<PathBuf>,

    /// Enrich every version, even when its digest did not change
    #[arg(long)]
    pub bypass_digest_check: bool,

    /// Number of versions prepared concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Directory logo images are stored in
    #[arg(long)]
    pub images_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,
}

pub async fn run(args: TrackArgs, config_path: Option<&Path>) -> Result<()> {
    let url = Url::parse(&args.url).map_err(|e| {
        CliError::input_with_help(
            format!("invalid repository url {}: {}", args.url, e),
            "use an http(s) index location or an oci:// reference",
        )
    })?;

    let mut config = load_config(config_path)?;
    if args.bypass_digest_check {
        config.bypass_digest_check = true;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(dir) = args.images_dir {
        config.images_dir = Some(dir);
    }

    let registered = match &args.registered {
        Some(path) => read_registered(path)?,
        None => HashMap::new(),
    };

    let name = args.name.unwrap_or_else(|| default_name(&url));
    let mut repository = Repository::new(name.clone(), args.url.trim_end_matches('/'));
    repository.repository_id = args.repository_id.unwrap_or_else(|| name.clone());
    repository.auth_user = args.auth_user;
    repository.auth_pass = args.auth_pass;
    let repository_id = repository.repository_id.clone();

    let bypass = config.bypass_digest_check;
    let errors = Arc::new(MemoryErrorsCollector::new());
    let services = TrackerServices::remote(config, cancel_on_ctrl_c(), errors.clone())?;
    let source = TrackerSource::new(TrackerSourceInput {
        repository,
        packages_registered: registered.clone(),
        services,
    });

    tracing::info!(repository = %name, url = %args.url, "tracking repository");
    let available = source.get_packages_available().await?;
    let plan = plan(&available, &registered, bypass);

    display::print_output(
        &TrackReport {
            repository: &name,
            packages: &available,
            plan: PlanSummary::from(&plan),
        },
        args.output,
    )?;
    display::print_errors(&errors.errors(&repository_id));
    display::print_summary(&name, available.len(), &plan);

    Ok(())
}

/// Read the registered packages file (YAML, which also covers JSON)
fn read_registered(path: &Path) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_yaml::from_str(&content).map_err(|e| {
        CliError::input_with_help(
            format!("invalid registered packages file {}: {}", path.display(), e),
            "expected a map of package keys (name@version) to digests",
        )
    })
}

fn default_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .or_else(|| url.host_str())
        .unwrap_or("repository")
        .to_string()
}
