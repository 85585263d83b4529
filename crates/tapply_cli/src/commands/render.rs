//! Render command - Print rendered templates without touching a cluster.

use anyhow::{Context, Result};
use clap::Args;
use tapply_core::YAML_DOCUMENT_DELIMITER;
use tracing::info;

use super::TemplateArgs;

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub templates: TemplateArgs,
}

pub async fn execute(args: RenderArgs) -> Result<()> {
    info!(directories = %args.templates.directories(), "Rendering templates");

    let values = args.templates.values()?;
    let documents = args
        .templates
        .processor()
        .yaml_in_path("", &args.templates.exclude, true, &values)
        .with_context(|| {
            format!("Failed to render {}", args.templates.directories())
        })?;

    for document in &documents {
        print!("{}{}", YAML_DOCUMENT_DELIMITER, document);
    }
    Ok(())
}
