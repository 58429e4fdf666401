//! Synthesize command.

use anyhow::{Context, Result};
use sitepipe_synth::{CloudAssembly, SiteStack};
use std::path::Path;
use tracing::info;

use super::Input;

/// Synthesize the stack and write the cloud assembly to `out`.
pub fn run(input: &Input, out: &Path) -> Result<()> {
    let config = input.load_config()?;
    let lookup = input.load_lookup(&config)?;

    let stack = SiteStack::synthesize(&config, &lookup)
        .with_context(|| format!("Failed to synthesize stack {}", config.name))?;

    let assembly = CloudAssembly::new(out, input.base_dir());
    let written = assembly
        .write(&stack)
        .with_context(|| format!("Failed to write cloud assembly to {}", out.display()))?;

    for path in &written {
        info!(path = %path.display(), "written");
    }
    println!(
        "Synthesized {} ({} resources) to {}",
        stack.name,
        stack.template.resources.len(),
        assembly.out_dir().display()
    );
    Ok(())
}
