//! Bootstrap registry listing.

use anyhow::Result;
use resident_kernel::BootstrapRegistry;

use super::{registry, BootstrapsArgs};
use crate::context::Context;

/// Run the bootstraps command.
pub async fn run(args: BootstrapsArgs, ctx: &Context) -> Result<()> {
    let registry = registry();

    if let Some(identifier) = args.resolve {
        let candidates = BootstrapRegistry::candidates(&identifier);
        let resolved = registry.resolve(&identifier).ok().map(str::to_string);

        if ctx.output.is_json() {
            ctx.output.json(&serde_json::json!({
                "identifier": identifier,
                "candidates": candidates,
                "resolved": resolved,
            }));
            return Ok(());
        }

        ctx.output.header(&format!("Resolving {:?}", identifier));
        for candidate in &candidates {
            ctx.output.list_item(candidate);
        }
        match resolved {
            Some(name) => ctx.output.success(&format!("Resolved to {}", name)),
            None => ctx.output.warn("No registered bootstrap matches"),
        }
        return Ok(());
    }

    let names: Vec<&str> = registry.names().collect();
    if ctx.output.is_json() {
        ctx.output.json(&names);
        return Ok(());
    }

    ctx.output.header("Registered bootstraps");
    for name in names {
        ctx.output.list_item(name);
    }
    Ok(())
}
