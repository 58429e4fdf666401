//! Lookups of resources that live outside the stack.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::Result;
use crate::template::fns;

/// A Route53 hosted zone the stack does not own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZone {
    /// Zone id without the `/hostedzone/` prefix.
    pub zone_id: String,
    pub zone_name: String,
}

impl HostedZone {
    pub fn new(zone_id: impl AsRef<str>, zone_name: impl Into<String>) -> Self {
        let zone_id = zone_id.as_ref();
        Self {
            zone_id: zone_id
                .strip_prefix("/hostedzone/")
                .unwrap_or(zone_id)
                .to_string(),
            zone_name: zone_name.into(),
        }
    }

    /// `arn:<partition>:route53:::hostedzone/<id>`
    pub fn arn(&self) -> Value {
        fns::arn(
            "route53",
            json!(""),
            json!(""),
            json!(format!("hostedzone/{}", self.zone_id)),
        )
    }
}

/// Parameters of a hosted zone lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneQuery {
    pub account: String,
    pub region: String,
    pub domain_name: String,
    pub private_zone: bool,
}

impl ZoneQuery {
    pub fn public(
        account: impl Into<String>,
        region: impl Into<String>,
        domain_name: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            domain_name: domain_name.into(),
            private_zone: false,
        }
    }

    /// Key under which the lookup result is cached in the context file.
    pub fn context_key(&self) -> String {
        format!(
            "hosted-zone:account={}:domainName={}:privateZone={}:region={}",
            self.account, self.domain_name, self.private_zone, self.region
        )
    }
}

/// Trait for hosted zone lookup backends.
pub trait ZoneLookup: Send + Sync {
    /// Resolve the zone for a query. Fails with
    /// [`crate::Error::UnresolvedLookup`] when the zone is unknown.
    fn lookup(&self, query: &ZoneQuery) -> Result<HostedZone>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_id_prefix_stripped() {
        let zone = HostedZone::new("/hostedzone/Z23ABC4XYZL05B", "example.com");
        assert_eq!(zone.zone_id, "Z23ABC4XYZL05B");

        let zone = HostedZone::new("Z23ABC4XYZL05B", "example.com");
        assert_eq!(zone.zone_id, "Z23ABC4XYZL05B");
    }

    #[test]
    fn test_context_key_format() {
        let query = ZoneQuery::public("123456789012", "eu-central-1", "example.com");
        assert_eq!(
            query.context_key(),
            "hosted-zone:account=123456789012:domainName=example.com:privateZone=false:region=eu-central-1"
        );
    }

    #[test]
    fn test_zone_arn() {
        let zone = HostedZone::new("Z1", "example.com");
        let parts = zone.arn()["Fn::Join"][1].clone();
        assert_eq!(parts[7], "hostedzone/Z1");
    }
}
