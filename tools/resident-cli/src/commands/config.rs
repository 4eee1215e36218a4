//! Worker configuration inspection.

use std::path::Path;

use anyhow::{bail, Context as _, Result};
use resident_kernel::WorkerConfig;

use super::{registry, ConfigArgs, ConfigCommand};
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Init { path, force } => init(&path, force, ctx),
        ConfigCommand::Validate => validate(ctx),
    }
}

fn show(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    match &ctx.config_path {
        Some(path) => ctx.output.info(&format!("Loaded from {}", path.display())),
        None => ctx.output.info("No config file found, using defaults"),
    }
    let rendered = ctx.config.render(Path::new("resident.toml"))?;
    ctx.output.raw(&rendered);
    Ok(())
}

fn init(path: &Path, force: bool, ctx: &Context) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let rendered = WorkerConfig::default().render(path)?;
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    ctx.output
        .success(&format!("Wrote default configuration to {}", path.display()));
    Ok(())
}

fn validate(ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    ctx.output.header("Validating configuration");

    let name = registry()
        .resolve(&config.bootstrap.identifier)
        .map(str::to_string)
        .with_context(|| format!("bootstrap {:?} is not available", config.bootstrap.identifier))?;
    ctx.output.kv("Bootstrap", &name);

    let upload_dir = config.uploads.dir();
    if !upload_dir.is_dir() {
        bail!("upload directory {} does not exist", upload_dir.display());
    }
    ctx.output.kv("Upload directory", &upload_dir.display().to_string());

    if config.session.cookie_name.is_empty() {
        bail!("session cookie name must not be empty");
    }
    ctx.output.kv("Session cookie", &config.session.cookie_name);

    ctx.output.success("Configuration is valid");
    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "valid": true, "bootstrap": name }));
    }
    Ok(())
}
