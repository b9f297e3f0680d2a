//! Inspect command - show the package a single chart archive produces

use clap::Args;
use hubtrack_core::{Package, Repository, parse_version};
use hubtrack_repo::LoadOptions;
use hubtrack_tracker::{
    NoopErrorsCollector, TrackerError, TrackerServices, enrich_package_from_annotations,
    enrich_package_from_chart,
};
use std::path::Path;
use std::sync::Arc;

use crate::commands::{cancel_on_ctrl_c, load_config};
use crate::display::{self, OutputFormat};
use crate::error::{CliError, Result};

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Chart archive URL (http(s) or oci://registry/repository:tag)
    pub chart_url: String,

    /// Username for basic auth
    #[arg(long)]
    pub auth_user: Option<String>,

    /// Password for basic auth
    #[arg(long, env = "HUBTRACK_AUTH_PASS", hide_env_values = true)]
    pub auth_pass: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,
}

pub async fn run(args: InspectArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let services =
        TrackerServices::remote(config, cancel_on_ctrl_c(), Arc::new(NoopErrorsCollector))?;

    let mut repository = Repository::new("inspect", args.chart_url.clone());
    repository.auth_user = args.auth_user;
    repository.auth_pass = args.auth_pass;

    let options = LoadOptions::for_repository(&repository, services.cancel.clone());
    let mut chart = services
        .chart_loader
        .load(&args.chart_url, &options)
        .await
        .map_err(|source| TrackerError::LoadChart {
            url: args.chart_url.clone(),
            source,
        })?;
    chart
        .metadata
        .validate()
        .map_err(TrackerError::InvalidChart)?;

    let version = parse_version(&chart.metadata.version)
        .map_err(|e| CliError::Chart {
            message: e.to_string(),
        })?
        .to_string();
    let mut package = Package {
        name: chart.metadata.name.clone(),
        version,
        content_url: args.chart_url.clone(),
        repository,
        ..Default::default()
    };

    enrich_package_from_chart(&mut package, &chart);
    if let Err(errors) = enrich_package_from_annotations(&mut package, &chart.metadata.annotations)
    {
        for err in errors.errors() {
            tracing::warn!(package = %package.key(), "invalid annotation: {}", err);
        }
        display::print_output(&package, args.output)?;
        return Err(CliError::Chart {
            message: errors.to_string(),
        });
    }

    display::print_output(&package, args.output)
}
