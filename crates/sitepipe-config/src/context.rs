//! Lookup context: cached answers for lookups the stack needs at synthesis
//! time.
//!
//! Entries come from the `lookup` block of `sitepipe.kdl` and from an
//! optional `sitepipe.context.json`, which uses the same keys as
//! `cdk.context.json`:
//!
//! ```json
//! {
//!   "hosted-zone:account=123456789012:domainName=example.com:privateZone=false:region=eu-central-1": {
//!     "Id": "/hostedzone/Z23ABC4XYZL05B",
//!     "Name": "example.com."
//!   }
//! }
//! ```

use crate::stack::{StackConfig, zone_covers};
use crate::{ConfigError, ConfigResult};
use serde::Deserialize;
use serde_json::Value;
use sitepipe_core::lookup::{HostedZone, ZoneLookup, ZoneQuery};
use sitepipe_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

pub const DEFAULT_CONTEXT_FILE: &str = "sitepipe.context.json";

const HOSTED_ZONE_PREFIX: &str = "hosted-zone:";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ZoneEntry {
    id: String,
    name: String,
}

/// [`ZoneLookup`] backed by locally stored context.
#[derive(Debug, Clone, Default)]
pub struct ContextLookup {
    zones: BTreeMap<String, HostedZone>,
}

impl ContextLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the context with the hosted zones declared in the stack config.
    pub fn from_config(config: &StackConfig) -> Self {
        let mut ctx = Self::new();
        for (name, id) in &config.hosted_zones {
            let key = ZoneQuery::public(&config.account, &config.region, name).context_key();
            ctx.insert(key, HostedZone::new(id, name.clone()));
        }
        // the most specific declared zone containing the site domain answers
        // its lookup
        if let Some((name, id)) = config
            .hosted_zones
            .iter()
            .filter(|(name, _)| zone_covers(name, &config.domain))
            .max_by_key(|(name, _)| name.len())
        {
            let key =
                ZoneQuery::public(&config.account, &config.region, &config.domain).context_key();
            ctx.insert(key, HostedZone::new(id, name.clone()));
        }
        ctx
    }

    pub fn insert(&mut self, key: impl Into<String>, zone: HostedZone) {
        self.zones.insert(key.into(), zone);
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn contains(&self, query: &ZoneQuery) -> bool {
        self.zones.contains_key(&query.context_key())
    }

    /// Merge entries from a context file. Entries already present are
    /// replaced by the file's values.
    pub fn load_file(&mut self, path: &Path) -> ConfigResult<()> {
        let text = std::fs::read_to_string(path)?;
        let count = self.merge_json(&text)?;
        debug!(path = %path.display(), entries = count, "loaded lookup context");
        Ok(())
    }

    /// Merge entries from context JSON, returning how many hosted zones
    /// were read.
    pub fn merge_json(&mut self, text: &str) -> ConfigResult<usize> {
        let doc: Value = serde_json::from_str(text)?;
        let Value::Object(entries) = doc else {
            return Err(ConfigError::invalid(
                "context",
                "expected a JSON object at the top level",
            ));
        };

        let mut count = 0;
        for (key, value) in entries {
            if !key.starts_with(HOSTED_ZONE_PREFIX) {
                warn!(key = %key, "ignoring unsupported context entry");
                continue;
            }
            let entry: ZoneEntry = serde_json::from_value(value).map_err(|e| {
                ConfigError::invalid(&key, format!("malformed hosted zone entry: {}", e))
            })?;
            let name = entry.name.trim_end_matches('.').to_string();
            self.zones.insert(key, HostedZone::new(&entry.id, name));
            count += 1;
        }
        Ok(count)
    }
}

impl ZoneLookup for ContextLookup {
    fn lookup(&self, query: &ZoneQuery) -> Result<HostedZone> {
        let key = query.context_key();
        self.zones
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::UnresolvedLookup {
                key,
                message: format!(
                    "no hosted zone for '{}'; add it to the lookup block or the context file",
                    query.domain_name
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::parse_stack_config;

    const KEY: &str = "hosted-zone:account=123456789012:domainName=example.com:privateZone=false:region=eu-central-1";

    fn query() -> ZoneQuery {
        ZoneQuery::public("123456789012", "eu-central-1", "example.com")
    }

    #[test]
    fn test_lookup_from_json() {
        let mut ctx = ContextLookup::new();
        let text = format!(
            r#"{{ "{}": {{ "Id": "/hostedzone/Z23ABC4XYZL05B", "Name": "example.com." }} }}"#,
            KEY
        );
        assert_eq!(ctx.merge_json(&text).unwrap(), 1);

        let zone = ctx.lookup(&query()).unwrap();
        assert_eq!(zone.zone_id, "Z23ABC4XYZL05B");
        assert_eq!(zone.zone_name, "example.com");
    }

    #[test]
    fn test_missing_entry_names_key() {
        let ctx = ContextLookup::new();
        match ctx.lookup(&query()).unwrap_err() {
            Error::UnresolvedLookup { key, .. } => assert_eq!(key, KEY),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unsupported_entries_skipped() {
        let mut ctx = ContextLookup::new();
        let count = ctx
            .merge_json(r#"{ "availability-zones:account=1:region=x": ["a", "b"] }"#)
            .unwrap();
        assert_eq!(count, 0);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_malformed_entry() {
        let mut ctx = ContextLookup::new();
        let text = format!(r#"{{ "{}": {{ "Name": "example.com." }} }}"#, KEY);
        assert!(matches!(
            ctx.merge_json(&text).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
        assert!(matches!(
            ctx.merge_json("[]").unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
        assert!(matches!(
            ctx.merge_json("{").unwrap_err(),
            ConfigError::Json(_)
        ));
    }

    #[test]
    fn test_from_config() {
        let config = parse_stack_config(
            r#"
stack { domain "example.com"; account "123456789012"; region "eu-central-1"; }
lookup { hosted-zone "example.com" id="Z23ABC4XYZL05B"; }
"#,
        )
        .unwrap();
        let ctx = ContextLookup::from_config(&config);
        assert!(ctx.contains(&query()));
        assert_eq!(ctx.lookup(&query()).unwrap().zone_id, "Z23ABC4XYZL05B");
    }

    #[test]
    fn test_parent_zone_answers_subdomain() {
        let config = parse_stack_config(
            r#"
stack { domain "www.example.com"; account "123456789012"; region "eu-central-1"; }
lookup { hosted-zone "example.com" id="Z1"; }
"#,
        )
        .unwrap();
        let ctx = ContextLookup::from_config(&config);
        let q = ZoneQuery::public("123456789012", "eu-central-1", "www.example.com");
        assert_eq!(ctx.lookup(&q).unwrap().zone_name, "example.com");
    }

    const SITE_CONFIG: &str = r#"
stack { domain "example.com"; account "123456789012"; region "eu-central-1"; }
lookup { hosted-zone "example.com" id="Z23ABC4XYZL05B"; }
"#;

    fn other_org() -> crate::Overrides {
        crate::Overrides {
            domain: Some("other.org".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_domain_override_resolved_from_context_file() {
        let config = crate::parse_stack_config_with(SITE_CONFIG, &other_org()).unwrap();
        let mut ctx = ContextLookup::from_config(&config);
        let q = ZoneQuery::public("123456789012", "eu-central-1", "other.org");
        let text = format!(
            r#"{{ "{}": {{ "Id": "/hostedzone/ZOTHER", "Name": "other.org." }} }}"#,
            q.context_key()
        );
        ctx.merge_json(&text).unwrap();

        let zone = ctx.lookup(&q).unwrap();
        assert_eq!(zone.zone_id, "ZOTHER");
        assert_eq!(zone.zone_name, "other.org");
    }

    #[test]
    fn test_unrelated_zone_does_not_answer_site_lookup() {
        let config = crate::parse_stack_config_with(SITE_CONFIG, &other_org()).unwrap();
        let ctx = ContextLookup::from_config(&config);
        assert!(ctx.contains(&query()));
        let q = ZoneQuery::public("123456789012", "eu-central-1", "other.org");
        match ctx.lookup(&q).unwrap_err() {
            Error::UnresolvedLookup { key, .. } => assert!(key.contains("domainName=other.org")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
