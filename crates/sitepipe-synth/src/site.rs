//! Static site bucket and the distribution in front of it.

use serde_json::{Value, json};
use sitepipe_core::LogicalId;
use sitepipe_core::iam::{PolicyDocument, PolicyStatement};
use sitepipe_core::template::{RemovalPolicy, Resource, fns};
use tracing::debug;

use crate::scope::Scope;
use crate::SynthResult;

pub const INDEX_DOCUMENT: &str = "index.html";
pub const ERROR_DOCUMENT: &str = "error.html";

const ORIGIN_ID: &str = "origin1";

/// Error responses served by the single-page-app entry point.
pub const SPA_ERROR_CODES: [u16; 2] = [404, 403];
pub const SPA_RESPONSE_PAGE: &str = "/index.html";
pub const ERROR_CACHING_MIN_TTL: u32 = 300;

/// Public-read bucket in website mode, named after the domain.
#[derive(Debug, Clone)]
pub struct SiteBucket {
    pub resource: LogicalId,
    pub policy: LogicalId,
}

impl SiteBucket {
    pub fn build(scope: &mut Scope, name: &str, bucket_name: &str) -> SynthResult<Self> {
        let bucket = Resource::new("AWS::S3::Bucket")
            .property("BucketName", json!(bucket_name))
            .property(
                "PublicAccessBlockConfiguration",
                json!({
                    "BlockPublicAcls": false,
                    "BlockPublicPolicy": false,
                    "IgnorePublicAcls": false,
                    "RestrictPublicBuckets": false,
                }),
            )
            .property(
                "WebsiteConfiguration",
                json!({
                    "ErrorDocument": ERROR_DOCUMENT,
                    "IndexDocument": INDEX_DOCUMENT,
                }),
            )
            .removal_policy(RemovalPolicy::Delete);
        let resource = scope.add_resource(&[name], bucket)?;

        let read = PolicyDocument::new().with(
            PolicyStatement::allow(&["s3:GetObject"])
                .principal(json!("*"))
                .on(fns::join(
                    "",
                    vec![fns::get_att(&resource, "Arn"), json!("/*")],
                )),
        );
        let policy = scope.add_resource(
            &[name, "Policy"],
            Resource::new("AWS::S3::BucketPolicy")
                .property("Bucket", fns::reference(&resource))
                .property("PolicyDocument", read.to_value()),
        )?;

        debug!(bucket = bucket_name, id = %resource, "declared site bucket");
        Ok(Self { resource, policy })
    }

    pub fn arn(&self) -> Value {
        fns::get_att(&self.resource, "Arn")
    }

    pub fn regional_domain_name(&self) -> Value {
        fns::get_att(&self.resource, "RegionalDomainName")
    }
}

pub struct DistributionProps<'a> {
    pub aliases: &'a [String],
    pub certificate_arn: Value,
    pub bucket: &'a SiteBucket,
}

/// CDN distribution serving the site bucket under the custom domain.
#[derive(Debug, Clone)]
pub struct SiteDistribution {
    pub resource: LogicalId,
}

impl SiteDistribution {
    pub fn build(scope: &mut Scope, name: &str, props: &DistributionProps<'_>) -> SynthResult<Self> {
        let error_responses: Vec<Value> = SPA_ERROR_CODES
            .iter()
            .map(|code| {
                json!({
                    "ErrorCachingMinTTL": ERROR_CACHING_MIN_TTL,
                    "ErrorCode": code,
                    "ResponseCode": 200,
                    "ResponsePagePath": SPA_RESPONSE_PAGE,
                })
            })
            .collect();

        let config = json!({
            "Aliases": props.aliases,
            "CustomErrorResponses": error_responses,
            "DefaultCacheBehavior": {
                "AllowedMethods": ["GET", "HEAD"],
                "CachedMethods": ["GET", "HEAD"],
                "Compress": true,
                "ForwardedValues": {
                    "Cookies": { "Forward": "none" },
                    "QueryString": false,
                },
                "TargetOriginId": ORIGIN_ID,
                "ViewerProtocolPolicy": "redirect-to-https",
            },
            "DefaultRootObject": INDEX_DOCUMENT,
            "Enabled": true,
            "HttpVersion": "http2",
            "IPV6Enabled": true,
            "Origins": [{
                "ConnectionAttempts": 3,
                "ConnectionTimeout": 10,
                "DomainName": props.bucket.regional_domain_name(),
                "Id": ORIGIN_ID,
                "S3OriginConfig": {},
            }],
            "PriceClass": "PriceClass_100",
            "ViewerCertificate": {
                "AcmCertificateArn": props.certificate_arn,
                "MinimumProtocolVersion": "TLSv1.1_2016",
                "SslSupportMethod": "sni-only",
            },
        });

        let resource = scope.add_resource(
            &[name, "CFDistribution"],
            Resource::new("AWS::CloudFront::Distribution").property("DistributionConfig", config),
        )?;
        debug!(id = %resource, aliases = ?props.aliases, "declared distribution");
        Ok(Self { resource })
    }

    /// Distribution id, e.g. for cache invalidations.
    pub fn id(&self) -> Value {
        fns::reference(&self.resource)
    }

    pub fn domain_name(&self) -> Value {
        fns::get_att(&self.resource, "DomainName")
    }
}
