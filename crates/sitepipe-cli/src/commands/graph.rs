//! Resource graph command.

use anyhow::Result;
use sitepipe_synth::SiteStack;

use super::Input;

/// Print every resource after the resources it depends on.
pub fn run(input: &Input) -> Result<()> {
    let config = input.load_config()?;
    let lookup = input.load_lookup(&config)?;
    let stack = SiteStack::synthesize(&config, &lookup)?;
    let graph = stack.graph()?;

    for id in graph.topological_order() {
        let resource_type = stack
            .template
            .resources
            .iter()
            .find(|(k, _)| k.as_str() == id)
            .map(|(_, r)| r.resource_type.as_str())
            .unwrap_or("?");
        let deps: Vec<&str> = graph
            .dependencies(&id)
            .map(|d| d.iter().map(String::as_str).collect())
            .unwrap_or_default();
        if deps.is_empty() {
            println!("{} ({})", id, resource_type);
        } else {
            println!("{} ({}) <- {}", id, resource_type, deps.join(", "));
        }
    }
    Ok(())
}
