//! DNS-validated certificate, requested in a fixed region.
//!
//! CloudFront only accepts certificates from `us-east-1`. A regular
//! `AWS::CertificateManager::Certificate` would be created in the stack's
//! own region, so the certificate is requested by a custom resource whose
//! Lambda handler calls ACM in the pinned region and answers the DNS
//! validation through the hosted zone.

use serde_json::{Value, json};
use sitepipe_core::LogicalId;
use sitepipe_core::iam::{ManagedPolicy, PolicyStatement, Role, ServicePrincipal};
use sitepipe_core::lookup::HostedZone;
use sitepipe_core::template::{Resource, fns};
use tracing::debug;

use crate::asset::FileAsset;
use crate::scope::Scope;
use crate::SynthResult;

/// Region CloudFront reads certificates from.
pub const CERTIFICATE_REGION: &str = "us-east-1";

pub const CERTIFICATE_RESOURCE_TYPE: &str = "Custom::DnsValidatedCertificate";

const HANDLER: &str = "index.certificateRequestHandler";
const HANDLER_RUNTIME: &str = "nodejs10.x";
const HANDLER_TIMEOUT_SECS: u32 = 900;

pub struct CertificateProps<'a> {
    pub domain_name: &'a str,
    pub hosted_zone: &'a HostedZone,
    /// Local path of the requestor Lambda's code.
    pub handler_source: &'a str,
}

/// The synthesized certificate.
#[derive(Debug, Clone)]
pub struct DnsValidatedCertificate {
    pub resource: LogicalId,
    pub function: LogicalId,
    pub asset: FileAsset,
}

impl DnsValidatedCertificate {
    pub fn build(scope: &mut Scope, name: &str, props: &CertificateProps<'_>) -> SynthResult<Self> {
        validate_domain_name(props.domain_name)?;

        let asset = FileAsset::declare(scope, "CertificateHandler", props.handler_source)?;

        let mut role = Role::new(ServicePrincipal::new("lambda.amazonaws.com")).with_managed_policy(
            ManagedPolicy::aws_managed("service-role/AWSLambdaBasicExecutionRole"),
        );
        role.grant(
            PolicyStatement::allow(&[
                "acm:RequestCertificate",
                "acm:DescribeCertificate",
                "acm:DeleteCertificate",
            ])
            .on_all(),
        );
        role.grant(PolicyStatement::allow(&["route53:GetChange"]).on_all());
        role.grant(
            PolicyStatement::allow(&["route53:changeResourceRecordSets"])
                .on(props.hosted_zone.arn()),
        );

        let role_path = [name, "CertificateRequestorFunction", "ServiceRole"];
        let role_id = scope.add_resource(&role_path, role.role_resource())?;
        let policy_path = [name, "CertificateRequestorFunction", "ServiceRole", "DefaultPolicy"];
        let policy_id = LogicalId::from_path(&policy_path)?;
        let mut policy_ids = Vec::new();
        if let Some(policy) = role.policy_resource(&role_id, policy_id.as_str()) {
            policy_ids.push(scope.add_resource(&policy_path, policy)?);
        }

        let mut function = Resource::new("AWS::Lambda::Function")
            .property(
                "Code",
                json!({
                    "S3Bucket": asset.bucket_name(),
                    "S3Key": asset.object_key(),
                }),
            )
            .property("Handler", json!(HANDLER))
            .property("Role", fns::get_att(&role_id, "Arn"))
            .property("Runtime", json!(HANDLER_RUNTIME))
            .property("Timeout", json!(HANDLER_TIMEOUT_SECS))
            .depends_on(&role_id);
        for id in &policy_ids {
            function = function.depends_on(id);
        }
        let function_id = scope.add_resource(&[name, "CertificateRequestorFunction"], function)?;

        let certificate = Resource::new(CERTIFICATE_RESOURCE_TYPE)
            .property("DomainName", json!(props.domain_name))
            .property("HostedZoneId", json!(props.hosted_zone.zone_id))
            .property("Region", json!(CERTIFICATE_REGION))
            .property("ServiceToken", fns::get_att(&function_id, "Arn"));
        let resource = scope.add_resource(&[name, "CertificateRequestorResource"], certificate)?;

        debug!(
            domain = props.domain_name,
            zone = %props.hosted_zone.zone_id,
            certificate = %resource,
            "declared certificate"
        );

        Ok(Self {
            resource,
            function: function_id,
            asset,
        })
    }

    /// ARN of the issued certificate.
    pub fn arn(&self) -> Value {
        fns::get_att(&self.resource, "Arn")
    }
}

/// ACM rules for a requested domain: fully qualified without a trailing
/// dot, and at most one wildcard, which must be the whole first label.
pub fn validate_domain_name(domain: &str) -> sitepipe_core::Result<()> {
    let invalid = |message: String| sitepipe_core::Error::InvalidInput(message);

    if domain.is_empty() {
        return Err(invalid("certificate domain name is empty".to_string()));
    }
    if domain.len() > 253 {
        return Err(invalid(format!("domain '{}' is too long", domain)));
    }
    if domain.ends_with('.') {
        return Err(invalid(format!(
            "domain '{}' must not end with a dot",
            domain
        )));
    }
    let wildcards = domain.matches('*').count();
    if wildcards > 1 {
        return Err(invalid(format!(
            "must only provide 1 wildcard, '{}' is invalid",
            domain
        )));
    }
    if wildcards == 1 && !domain.starts_with("*.") {
        return Err(invalid(format!(
            "a wildcard must be the first label of the domain, eg: \"*.something.com\"; '{}' is invalid",
            domain
        )));
    }
    if domain.split('.').any(|label| label.is_empty() || label.len() > 63) {
        return Err(invalid(format!("domain '{}' has an invalid label", domain)));
    }
    if !domain.contains('.') {
        return Err(invalid(format!(
            "domain '{}' is not fully qualified",
            domain
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(scope: &mut Scope, domain: &str) -> SynthResult<DnsValidatedCertificate> {
        let zone = HostedZone::new("Z23ABC4XYZL05B", "example.com");
        DnsValidatedCertificate::build(
            scope,
            "WebAppCertificate",
            &CertificateProps {
                domain_name: domain,
                hosted_zone: &zone,
                handler_source: "lambda-packages/dns_validated_certificate_handler",
            },
        )
    }

    #[test]
    fn test_certificate_pinned_to_us_east_1() {
        let mut scope = Scope::new("SitePipelineStack");
        let cert = build(&mut scope, "example.com").unwrap();

        let template = scope.template();
        let certs: Vec<_> = template
            .resources_of_type(CERTIFICATE_RESOURCE_TYPE)
            .collect();
        assert_eq!(certs.len(), 1);
        let (_, resource) = certs[0];
        assert_eq!(resource.properties["Region"], "us-east-1");
        assert_eq!(resource.properties["DomainName"], "example.com");
        assert_eq!(resource.properties["HostedZoneId"], "Z23ABC4XYZL05B");
        assert_eq!(
            resource.properties["ServiceToken"],
            fns::get_att(&cert.function, "Arn")
        );
    }

    #[test]
    fn test_requestor_function() {
        let mut scope = Scope::new("SitePipelineStack");
        let cert = build(&mut scope, "example.com").unwrap();

        let function = scope.template().resource(&cert.function).unwrap();
        assert_eq!(function.properties["Runtime"], "nodejs10.x");
        assert_eq!(function.properties["Timeout"], 900);
        assert_eq!(function.properties["Handler"], HANDLER);
        assert_eq!(function.depends_on.len(), 2);
        assert_eq!(
            function.properties["Code"]["S3Bucket"],
            fns::reference(&cert.asset.bucket_parameter)
        );
    }

    #[test]
    fn test_record_change_scoped_to_zone() {
        let mut scope = Scope::new("SitePipelineStack");
        build(&mut scope, "example.com").unwrap();

        let (_, policy) = scope
            .template()
            .resources_of_type("AWS::IAM::Policy")
            .next()
            .unwrap();
        let statements = policy.properties["PolicyDocument"]["Statement"]
            .as_array()
            .unwrap();
        let change = statements
            .iter()
            .find(|s| s["Action"] == "route53:changeResourceRecordSets")
            .unwrap();
        assert_eq!(change["Resource"]["Fn::Join"][1][7], "hostedzone/Z23ABC4XYZL05B");
    }

    #[test]
    fn test_wildcard_rules() {
        assert!(validate_domain_name("*.example.com").is_ok());
        assert!(validate_domain_name("example.com").is_ok());
        assert!(validate_domain_name("*.*.example.com").is_err());
        assert!(validate_domain_name("www.*.example.com").is_err());
        assert!(validate_domain_name("*example.com").is_err());
        assert!(validate_domain_name("example.com.").is_err());
        assert!(validate_domain_name("").is_err());
        assert!(validate_domain_name("localhost").is_err());
    }

    #[test]
    fn test_invalid_domain_adds_nothing() {
        let mut scope = Scope::new("SitePipelineStack");
        assert!(build(&mut scope, "a.*.example.com").is_err());
        assert!(scope.template().resources.is_empty());
    }
}
