//! tapply CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Template error
//! - 4: Store/apply error

use std::process::ExitCode;

use clap::Parser;
use tapply_core::ApplyError;
use tapply_kube::KubeStoreError;
use tapply_templates::TemplateError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const TEMPLATE_ERROR: u8 = 3;
    pub const APPLY_ERROR: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "tapply=debug"
    } else if cli.quiet {
        "tapply=warn"
    } else {
        "tapply=info"
    };
    let mut filter = EnvFilter::from_default_env();
    for directive in ["warn", level] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    // Logs go to stderr; stdout carries rendered documents.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Apply(args) => commands::apply::execute(args).await,
        Commands::Render(args) => commands::render::execute(args).await,
        Commands::Version => commands::version::execute(),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(error) = cause.downcast_ref::<TemplateError>() {
            return match error {
                TemplateError::Apply(_) => ExitCodes::APPLY_ERROR,
                TemplateError::PathNotFound(_) | TemplateError::NotFound(_) => {
                    ExitCodes::INVALID_ARGS
                }
                _ => ExitCodes::TEMPLATE_ERROR,
            };
        }
        if let Some(error) = cause.downcast_ref::<ApplyError>() {
            return match error {
                ApplyError::Configuration(_) => ExitCodes::INVALID_ARGS,
                _ => ExitCodes::APPLY_ERROR,
            };
        }
        if cause.downcast_ref::<KubeStoreError>().is_some() {
            return ExitCodes::APPLY_ERROR;
        }
    }
    ExitCodes::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tapply_core::{ObjectRef, StoreError};

    #[test]
    fn test_template_errors_map_to_template_code() {
        let err = anyhow::Error::new(TemplateError::MissingVariable {
            template: "sa.yaml".to_string(),
            variable: ".Values.name".to_string(),
        })
        .context("Failed to render templates");
        assert_eq!(categorize_error(&err), ExitCodes::TEMPLATE_ERROR);
    }

    #[test]
    fn test_missing_directory_is_invalid_args() {
        let err = anyhow::Error::new(TemplateError::PathNotFound(PathBuf::from("nope")));
        assert_eq!(categorize_error(&err), ExitCodes::INVALID_ARGS);
    }

    #[test]
    fn test_store_errors_map_to_apply_code() {
        let store = StoreError::NotFound(ObjectRef::new("v1", "ConfigMap", Some("ns"), "cm"));
        let err = anyhow::Error::new(TemplateError::Apply(ApplyError::Store(store)));
        assert_eq!(categorize_error(&err), ExitCodes::APPLY_ERROR);
    }

    #[test]
    fn test_other_errors_are_general() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(categorize_error(&err), ExitCodes::GENERAL_ERROR);
    }
}
