//! The site stack: certificate, bucket, distribution, DNS record and the
//! pipeline that deploys the site.

use serde_json::json;
use sitepipe_config::{StackConfig, VariableContext};
use sitepipe_core::graph::ResourceGraph;
use sitepipe_core::lookup::{ZoneLookup, ZoneQuery};
use sitepipe_core::template::{Template, fns};
use tracing::{debug, info};

use crate::asset::FileAsset;
use crate::certificate::{CertificateProps, DnsValidatedCertificate};
use crate::cicd::{PipelineProps, SitePipeline};
use crate::dns::AliasRecord;
use crate::scope::Scope;
use crate::site::{DistributionProps, SiteBucket, SiteDistribution};
use crate::SynthResult;

/// A synthesized stack, ready to be written as a cloud assembly.
#[derive(Debug, Clone)]
pub struct SynthesizedStack {
    pub name: String,
    pub account: String,
    pub region: String,
    pub template: Template,
    pub assets: Vec<FileAsset>,
}

impl SynthesizedStack {
    /// `aws://<account>/<region>`
    pub fn environment(&self) -> String {
        format!("aws://{}/{}", self.account, self.region)
    }

    pub fn template_file(&self) -> String {
        format!("{}.template.json", self.name)
    }

    pub fn graph(&self) -> SynthResult<ResourceGraph> {
        Ok(ResourceGraph::from_template(&self.template)?)
    }
}

pub struct SiteStack;

impl SiteStack {
    /// Hosted zone lookups the stack performs.
    pub fn lookups(config: &StackConfig) -> Vec<ZoneQuery> {
        vec![ZoneQuery::public(
            &config.account,
            &config.region,
            &config.domain,
        )]
    }

    /// Assemble and validate the stack's template.
    pub fn synthesize(config: &StackConfig, zones: &dyn ZoneLookup) -> SynthResult<SynthesizedStack> {
        info!(
            stack = %config.name,
            domain = %config.domain,
            account = %config.account,
            region = %config.region,
            "synthesizing stack"
        );

        let mut scope = Scope::new(&config.name);
        scope.set_description(config.description.clone());

        let zone_query = ZoneQuery::public(&config.account, &config.region, &config.domain);
        let zone = zones.lookup(&zone_query)?;
        debug!(zone_id = %zone.zone_id, zone_name = %zone.zone_name, "resolved hosted zone");

        let certificate = DnsValidatedCertificate::build(
            &mut scope,
            "WebAppCertificate",
            &CertificateProps {
                domain_name: &config.domain,
                hosted_zone: &zone,
                handler_source: &config.assets.certificate_handler,
            },
        )?;

        let bucket = SiteBucket::build(&mut scope, "SiteBucket", &config.domain)?;

        let aliases = vec![config.domain.clone()];
        let distribution = SiteDistribution::build(
            &mut scope,
            "WebAppDistribution",
            &DistributionProps {
                aliases: &aliases,
                certificate_arn: certificate.arn(),
                bucket: &bucket,
            },
        )?;

        AliasRecord::to_distribution(
            &mut scope,
            "ARecord",
            &zone,
            &config.domain,
            distribution.domain_name(),
        )?;

        let mut variables = VariableContext::from_config(config);
        variables.set_token("distribution.id", distribution.id());

        let pipeline = SitePipeline::build(
            &mut scope,
            &PipelineProps {
                pipeline_name: &config.pipeline_name,
                source: &config.source,
                build: &config.build,
                variables: &variables,
            },
        )?;

        scope.add_output(
            "SiteUrl",
            json!(format!("https://{}", config.domain)),
            "Public URL of the site",
        )?;
        scope.add_output(
            "BucketName",
            fns::reference(&bucket.resource),
            "Bucket holding the site",
        )?;
        scope.add_output(
            "DistributionId",
            distribution.id(),
            "Distribution serving the site",
        )?;
        scope.add_output(
            "DistributionDomainName",
            distribution.domain_name(),
            "Domain name of the distribution",
        )?;
        scope.add_output(
            "CertificateArn",
            certificate.arn(),
            "Certificate issued in us-east-1",
        )?;
        scope.add_output(
            "PipelineName",
            fns::reference(&pipeline.pipeline),
            "Pipeline deploying the site",
        )?;

        let template = scope.into_template();
        let graph = ResourceGraph::from_template(&template)?;
        info!(
            stack = %config.name,
            resources = graph.len(),
            parameters = template.parameters.len(),
            "stack synthesized"
        );

        Ok(SynthesizedStack {
            name: config.name.clone(),
            account: config.account.clone(),
            region: config.region.clone(),
            template,
            assets: vec![certificate.asset],
        })
    }
}
