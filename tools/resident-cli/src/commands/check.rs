//! Bootstrap check.

use anyhow::{Context as _, Result};
use serde::Serialize;

use super::{factory, CheckArgs};
use crate::context::Context;

#[derive(Serialize)]
struct CheckReport {
    bootstrap: String,
    environment: String,
    debug: bool,
    static_directory: String,
    resets: Vec<String>,
    checked_at: String,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let identifier = args
        .bootstrap
        .unwrap_or_else(|| ctx.config.bootstrap.identifier.clone());
    let environment = args
        .env
        .unwrap_or_else(|| ctx.config.bootstrap.env.clone());
    let debug = ctx.config.bootstrap.debug;

    ctx.output
        .debug(&format!("Bootstrapping {} ({})", identifier, environment));
    let booted = factory()
        .create(&identifier, &environment, debug)
        .with_context(|| format!("Failed to bootstrap {:?}", identifier))?;

    let report = CheckReport {
        bootstrap: booted.name.clone(),
        environment: booted.context.environment.clone(),
        debug: booted.context.debug,
        static_directory: booted.static_directory().to_string(),
        resets: booted
            .reset_subsystems()
            .into_iter()
            .map(str::to_string)
            .collect(),
        checked_at: chrono::Utc::now().to_rfc3339(),
    };

    if ctx.output.is_json() {
        ctx.output.json(&report);
        return Ok(());
    }

    ctx.output.header("Bootstrap check");
    ctx.output.kv("Bootstrap", &report.bootstrap);
    ctx.output.kv("Environment", &report.environment);
    ctx.output.kv("Debug", &report.debug.to_string());
    ctx.output.kv("Static directory", &report.static_directory);
    if report.resets.is_empty() {
        ctx.output.kv("Resets", "-");
    } else {
        ctx.output.kv("Resets", &report.resets.join(", "));
    }
    ctx.output.success("Application bootstrapped");
    Ok(())
}
