//! Destroy command
//!
//! Tearing down every recorded resource is the one operation that cannot
//! be undone by a re-run, so it demands a typed confirmation token: the
//! configured state key, not a reflexive yes.

use std::path::Path;

use clap::Args;
use stratus::engine::TupleStatus;

use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Confirmation token; must equal the configured state key
    #[arg(long)]
    pub confirm: Option<String>,
}

pub async fn run(args: DestroyArgs, config_path: &Path) -> Result<()> {
    let config = super::load_config(config_path)?;

    let Some(token) = args.confirm else {
        println!("Destroy removes every resource recorded for '{}'.", config.state_key);
        println!("\nRe-run with --confirm {}", config.state_key);
        return Ok(());
    };
    if token != config.state_key {
        return Err(Error::DestroyNotConfirmed);
    }

    let engine = super::build_engine(&config)?;
    let report = engine.destroy().await?;

    println!(
        "{:<28} {:<12} {:<12} {:<6} {:<10}",
        "DOMAIN", "ENV", "STATUS", "OPS", "REGISTRY"
    );
    for outcome in &report.outcomes {
        let (status, registry) = match &outcome.status {
            TupleStatus::Failed { .. } => ("failed", "-"),
            _ => (
                "destroyed",
                if outcome.published { "withdrawn" } else { "-" },
            ),
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

    let failed = report.failures().count();
    if failed > 0 {
        return Err(Error::PartialFailure {
            failed,
            total: report.outcomes.len(),
        });
    }
    Ok(())
}
