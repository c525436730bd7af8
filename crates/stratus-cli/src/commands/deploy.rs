//! Deploy command

use std::path::Path;

use stratus::catalog::FilesystemCatalog;
use stratus::engine::{ConvergenceReport, TupleStatus};

use crate::{Error, Result};

pub async fn run(config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;
    let engine = super::build_engine(&config)?;
    let catalog = FilesystemCatalog::new(&config.domains_root);

    let report = engine.apply(&catalog).await?;
    print_report(&report);

    let failed = report.failures().count();
    if failed > 0 {
        return Err(Error::PartialFailure {
            failed,
            total: report.outcomes.len(),
        });
    }
    Ok(())
}

/// Print a per-domain convergence report
pub fn print_report(report: &ConvergenceReport) {
    println!(
        "{:<28} {:<12} {:<12} {:<6} {:<10}",
        "DOMAIN", "ENV", "STATUS", "OPS", "REGISTRY"
    );

    for outcome in &report.outcomes {
        let (status, registry) = match &outcome.status {
            TupleStatus::Unchanged => ("unchanged", registry_column(outcome.published)),
            TupleStatus::Converged => ("converged", registry_column(outcome.published)),
            TupleStatus::Failed { .. } => ("failed", "-"),
        };
        println!(
            "{:<28} {:<12} {:<12} {:<6} {:<10}",
            outcome.domain,
            outcome.environment,
            status,
            outcome.completed.len(),
            registry,
        );
    }

    for outcome in report.failures() {
        if let TupleStatus::Failed { error } = &outcome.status {
            println!("\n{} ({}): {}", outcome.domain, outcome.environment, error);
        }
    }

    if !report.orphans.is_empty() {
        println!("\nRecorded resources without a declaration (run destroy to remove):");
        for orphan in &report.orphans {
            println!("  {orphan}");
        }
    }
}

fn registry_column(published: bool) -> &'static str {
    if published {
        "published"
    } else {
        "-"
    }
}
