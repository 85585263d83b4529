//! Apply command - Reconcile rendered templates with the cluster.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tapply_core::{
    ApplyOutcome, EngineOptions, ReconcileEngine, RetryPolicy, RootAttributeMerger,
};
use tapply_kube::KubeStore;
use tapply_templates::Applier;
use tracing::{info, info_span};

use super::TemplateArgs;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub templates: TemplateArgs,

    /// Render what would be written instead of writing it
    #[arg(long)]
    pub dry_run: bool,

    /// Delete the rendered objects (in reverse kind order)
    #[arg(long)]
    pub delete: bool,

    /// On delete, also clear finalizers
    #[arg(long)]
    pub force: bool,

    /// Upper bound in seconds for a single retry delay
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,

    /// Do not print the summary line
    #[arg(short, long)]
    pub silent: bool,

    /// Kubeconfig file; defaults to $KUBECONFIG, ~/.kube/config or in-cluster
    #[arg(short, long)]
    pub kubeconfig: Option<PathBuf>,
}

impl ApplyArgs {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(4, Duration::from_millis(500))
            .factor(5.0)
            .jitter(0.1)
            .cap(Duration::from_secs(self.timeout))
    }
}

pub async fn execute(args: ApplyArgs) -> Result<()> {
    info!(directories = %args.templates.directories(), dry_run = args.dry_run, "Applying templates");

    let values = args.templates.values()?;
    let store = match &args.kubeconfig {
        Some(path) => KubeStore::from_kubeconfig(path).await,
        None => KubeStore::try_default().await,
    }
    .context("Failed to connect to the cluster")?;

    let options = EngineOptions::new()
        .retry(args.retry_policy())
        .dry_run(args.dry_run)
        .force_delete(args.force);
    let engine = ReconcileEngine::builder()
        .store(Arc::new(store))
        .merger(RootAttributeMerger::default())
        .options(options)
        .span(info_span!("apply", directories = %args.templates.directories()))
        .build()?;
    let applier = Applier::new(args.templates.processor(), engine);

    let outcomes = if args.delete {
        applier
            .delete_in_path("", &args.templates.exclude, true, &values)
            .await?
    } else {
        applier
            .create_or_update_in_path("", &args.templates.exclude, true, &values)
            .await?
    };
    log_summary(&outcomes);

    if !args.silent {
        if args.dry_run {
            println!("Dryrun successfully executed");
        } else {
            println!("Successfully applied");
        }
    }
    Ok(())
}

fn log_summary(outcomes: &[ApplyOutcome]) {
    let count = |wanted: ApplyOutcome| outcomes.iter().filter(|o| **o == wanted).count();
    info!(
        created = count(ApplyOutcome::Created),
        updated = count(ApplyOutcome::Updated),
        unchanged = count(ApplyOutcome::Unchanged),
        deleted = count(ApplyOutcome::Deleted),
        absent = count(ApplyOutcome::AlreadyAbsent),
        "Reconciled {} objects",
        outcomes.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_retry_policy_is_capped_by_timeout() {
        let cli = Cli::try_parse_from(["tapply", "apply", "-d", "x", "-t", "2"]).unwrap();
        let Commands::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        let policy = args.retry_policy();
        assert_eq!(policy.attempts(), 4);
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(2));
    }
}
