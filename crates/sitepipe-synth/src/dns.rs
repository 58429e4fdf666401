//! Alias record pointing the domain at the distribution.

use serde_json::{Value, json};
use sitepipe_core::LogicalId;
use sitepipe_core::lookup::HostedZone;
use sitepipe_core::template::Resource;

use crate::scope::Scope;
use crate::SynthResult;

/// Hosted zone id CloudFront distributions live in, the same for every
/// distribution.
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// An `A` alias record.
#[derive(Debug, Clone)]
pub struct AliasRecord {
    pub resource: LogicalId,
}

impl AliasRecord {
    /// Point `record_name` in `zone` at a CloudFront distribution's domain name.
    pub fn to_distribution(
        scope: &mut Scope,
        name: &str,
        zone: &HostedZone,
        record_name: &str,
        distribution_domain: Value,
    ) -> SynthResult<Self> {
        let record = Resource::new("AWS::Route53::RecordSet")
            .property(
                "AliasTarget",
                json!({
                    "DNSName": distribution_domain,
                    "HostedZoneId": CLOUDFRONT_HOSTED_ZONE_ID,
                }),
            )
            .property("HostedZoneId", json!(zone.zone_id))
            .property("Name", json!(fqdn(record_name)))
            .property("Type", json!("A"));
        let resource = scope.add_resource(&[name], record)?;
        Ok(Self { resource })
    }
}

/// Record names are written fully qualified.
fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}
