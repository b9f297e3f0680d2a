//! Display formatting for CLI output
//!
//! Machine readable results go to stdout, everything meant for a human
//! (summaries, collected errors) goes to stderr.

use clap::ValueEnum;
use console::style;
use hubtrack_core::Package;
use hubtrack_tracker::SyncPlan;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{CliError, Result};

/// Output format for results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

/// Result of tracking a repository
#[derive(Debug, Serialize)]
pub struct TrackReport<'a> {
    pub repository: &'a str,
    pub packages: &'a BTreeMap<String, Package>,
    pub plan: PlanSummary,
}

/// Sync plan with packages referenced by key
#[derive(Debug, Serialize)]
pub struct PlanSummary {
    pub register: Vec<String>,
    pub unregister: Vec<String>,
}

impl From<&SyncPlan> for PlanSummary {
    fn from(plan: &SyncPlan) -> Self {
        Self {
            register: plan.register.iter().map(Package::key).collect(),
            unregister: plan.unregister.clone(),
        }
    }
}

/// Serialize a value in the requested format
pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
    };
    rendered.map_err(|message| CliError::Other { message })
}

pub fn print_output<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let output = render(value, format)?;
    println!("{}", output.trim_end());
    Ok(())
}

/// Print the errors collected while tracking
pub fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("{} ({})", style("Errors").red().bold(), errors.len());
    for err in errors {
        eprintln!("  {} {}", style("✗").red(), err);
    }
}

pub fn print_summary(repository: &str, available: usize, plan: &SyncPlan) {
    eprintln!();
    eprintln!(
        "{} {}: {} available, {} to register, {} to unregister",
        style("✓").green().bold(),
        style(repository).cyan(),
        available,
        plan.register.len(),
        plan.unregister.len()
    );
}
