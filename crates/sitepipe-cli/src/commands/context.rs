//! Lookup context command.

use anyhow::Result;
use sitepipe_core::lookup::ZoneLookup;
use sitepipe_synth::SiteStack;

use super::Input;

/// Print each lookup the stack performs and its cached answer.
pub fn run(input: &Input) -> Result<()> {
    let config = input.load_config()?;
    let lookup = input.load_lookup(&config)?;

    let mut missing = 0;
    for query in SiteStack::lookups(&config) {
        match lookup.lookup(&query) {
            Ok(zone) => println!(
                "{}\n  resolved: {} ({})",
                query.context_key(),
                zone.zone_id,
                zone.zone_name
            ),
            Err(_) => {
                missing += 1;
                println!("{}\n  missing", query.context_key());
            }
        }
    }

    if missing > 0 {
        anyhow::bail!(
            "{} lookup(s) unresolved; add them to the lookup block or the context file",
            missing
        );
    }
    Ok(())
}
