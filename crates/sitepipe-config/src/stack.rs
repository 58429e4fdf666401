//! Stack configuration parsing (`sitepipe.kdl`).

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use regex::Regex;
use sitepipe_core::pipeline::SourceTrigger;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, warn};

pub const DEFAULT_STACK_NAME: &str = "SitePipelineStack";
pub const DEFAULT_PIPELINE_NAME: &str = "deploy-angular-application";
pub const DEFAULT_CERTIFICATE_HANDLER: &str = "lambda-packages/dns_validated_certificate_handler";

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$").unwrap()
});

static ACCOUNT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{12}$").unwrap());

static REGION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-gov)?-[a-z]+-\d$").unwrap());

/// Fully validated stack configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StackConfig {
    pub name: String,
    pub domain: String,
    pub account: String,
    pub region: String,
    pub description: Option<String>,
    pub source: SourceConfig,
    pub build: BuildConfig,
    pub pipeline_name: String,
    pub assets: AssetConfig,
    /// Hosted zones known ahead of time, keyed by zone name.
    pub hosted_zones: BTreeMap<String, String>,
}

/// Git source of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Secrets Manager name of the OAuth token.
    pub secret: String,
    pub trigger: SourceTrigger,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            owner: "bind-almir".to_string(),
            repo: "angular-app".to_string(),
            branch: "master".to_string(),
            secret: "cdk-pipeline-example".to_string(),
            trigger: SourceTrigger::Poll,
        }
    }
}

/// Build project settings. Empty command lists fall back to the default
/// commands for the phase.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub app: String,
    pub node_version: String,
    pub image: String,
    pub install: Vec<String>,
    pub build: Vec<String>,
    pub post_build: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            app: "angular-app".to_string(),
            node_version: "10".to_string(),
            image: "aws/codebuild/standard:2.0".to_string(),
            install: Vec::new(),
            build: Vec::new(),
            post_build: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Directory the build writes the site to, relative to the source root.
    pub fn output_dir(&self) -> String {
        format!("dist/{}", self.app)
    }

    pub fn install_commands(&self) -> Vec<String> {
        if !self.install.is_empty() {
            return self.install.clone();
        }
        [
            "echo installing dependencies",
            "npm install",
            "echo installing aws cli",
            "pip install awscli --upgrade --user",
            "echo check version",
            "aws --version",
            "echo installing angular cli",
            "npm i -g @angular/cli",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn build_commands(&self) -> Vec<String> {
        if !self.build.is_empty() {
            return self.build.clone();
        }
        [
            "echo Build started on `date`",
            "echo Building ${build.app}",
            "ng build --prod",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn post_build_commands(&self) -> Vec<String> {
        if !self.post_build.is_empty() {
            return self.post_build.clone();
        }
        [
            "echo BUILD COMPLETE running sync with s3",
            "aws s3 rm s3://${site.bucket}/ --recursive",
            "aws s3 cp ./${build.output_dir} s3://${site.bucket}/ --recursive --grants read=uri=http://acs.amazonaws.com/groups/global/AllUsers",
            "aws cloudfront create-invalidation --distribution-id ${distribution.id} --paths \"/*\"",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

/// Local paths of bundled assets.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetConfig {
    pub certificate_handler: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            certificate_handler: DEFAULT_CERTIFICATE_HANDLER.to_string(),
        }
    }
}

/// Values that take precedence over the configuration file, usually from
/// command line flags or environment variables.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub stack_name: Option<String>,
    pub domain: Option<String>,
    pub account: Option<String>,
    pub region: Option<String>,
}

/// Parse a stack configuration from KDL text.
pub fn parse_stack_config(kdl: &str) -> ConfigResult<StackConfig> {
    parse_stack_config_with(kdl, &Overrides::default())
}

/// Parse a stack configuration, applying overrides before validation.
pub fn parse_stack_config_with(kdl: &str, overrides: &Overrides) -> ConfigResult<StackConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut stack: Option<RawStack> = None;
    let mut source: Option<SourceConfig> = None;
    let mut build: Option<BuildConfig> = None;
    let mut pipeline_name: Option<String> = None;
    let mut assets = AssetConfig::default();
    let mut hosted_zones = BTreeMap::new();

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {
                if stack.is_some() {
                    return Err(ConfigError::Duplicate("stack".to_string()));
                }
                stack = Some(parse_stack(node)?);
            }
            "source" => {
                if source.is_some() {
                    return Err(ConfigError::Duplicate("source".to_string()));
                }
                source = Some(parse_source(node)?);
            }
            "build" => {
                if build.is_some() {
                    return Err(ConfigError::Duplicate("build".to_string()));
                }
                build = Some(parse_build(node)?);
            }
            "pipeline" => {
                if pipeline_name.is_some() {
                    return Err(ConfigError::Duplicate("pipeline".to_string()));
                }
                pipeline_name = Some(
                    get_first_string_arg(node)
                        .ok_or_else(|| ConfigError::MissingField("pipeline name".to_string()))?,
                );
            }
            "assets" => {
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        if child.name().value() == "certificate-handler" {
                            assets.certificate_handler =
                                get_first_string_arg(child).ok_or_else(|| {
                                    ConfigError::MissingField("certificate-handler path".to_string())
                                })?;
                        }
                    }
                }
            }
            "lookup" => parse_lookup(node, &mut hosted_zones)?,
            other => debug!(node = other, "ignoring unknown configuration node"),
        }
    }

    let raw = stack.unwrap_or_default();

    let name = overrides
        .stack_name
        .clone()
        .or(raw.name)
        .unwrap_or_else(|| DEFAULT_STACK_NAME.to_string());
    let domain = overrides
        .domain
        .clone()
        .or(raw.domain)
        .ok_or_else(|| ConfigError::MissingField("stack domain".to_string()))?;
    let account = overrides
        .account
        .clone()
        .or(raw.account)
        .ok_or_else(|| ConfigError::MissingField("stack account".to_string()))?;
    let region = overrides
        .region
        .clone()
        .or(raw.region)
        .ok_or_else(|| ConfigError::MissingField("stack region".to_string()))?;

    validate_stack_name(&name)?;
    validate_domain(&domain)?;
    if !ACCOUNT_REGEX.is_match(&account) {
        return Err(ConfigError::invalid(
            "account",
            format!("'{}' is not a 12 digit account id", account),
        ));
    }
    if !REGION_REGEX.is_match(&region) {
        return Err(ConfigError::invalid(
            "region",
            format!("'{}' is not a region name", region),
        ));
    }

    for zone in hosted_zones.keys() {
        if !zone_covers(zone, &domain) {
            warn!(zone = %zone, domain = %domain, "hosted zone does not contain the site domain");
        }
    }

    let pipeline_name = pipeline_name.unwrap_or_else(|| DEFAULT_PIPELINE_NAME.to_string());
    if pipeline_name.is_empty() || pipeline_name.len() > 100 {
        return Err(ConfigError::invalid(
            "pipeline name",
            "must be between 1 and 100 characters",
        ));
    }

    Ok(StackConfig {
        name,
        domain,
        account,
        region,
        description: raw.description,
        source: source.unwrap_or_default(),
        build: build.unwrap_or_default(),
        pipeline_name,
        assets,
        hosted_zones,
    })
}

#[derive(Debug, Default)]
struct RawStack {
    name: Option<String>,
    domain: Option<String>,
    account: Option<String>,
    region: Option<String>,
    description: Option<String>,
}

fn parse_stack(node: &KdlNode) -> ConfigResult<RawStack> {
    let mut raw = RawStack {
        name: get_first_string_arg(node),
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "domain" => raw.domain = get_first_string_arg(child),
                "account" => raw.account = get_first_scalar_arg(child),
                "region" => raw.region = get_first_string_arg(child),
                "description" => raw.description = get_first_string_arg(child),
                other => debug!(node = other, "ignoring unknown stack field"),
            }
        }
    }
    Ok(raw)
}

fn parse_source(node: &KdlNode) -> ConfigResult<SourceConfig> {
    let provider = get_first_string_arg(node).unwrap_or_else(|| "github".to_string());
    if provider != "github" {
        return Err(ConfigError::invalid(
            "source provider",
            format!("unsupported source provider: {}", provider),
        ));
    }

    let defaults = SourceConfig::default();
    let trigger = match get_string_prop(node, "trigger") {
        Some(t) => t
            .parse::<SourceTrigger>()
            .map_err(|e| ConfigError::invalid("source trigger", e.to_string()))?,
        None => defaults.trigger,
    };

    Ok(SourceConfig {
        owner: get_string_prop(node, "owner").unwrap_or(defaults.owner),
        repo: get_string_prop(node, "repo").unwrap_or(defaults.repo),
        branch: get_string_prop(node, "branch").unwrap_or(defaults.branch),
        secret: get_string_prop(node, "secret").unwrap_or(defaults.secret),
        trigger,
    })
}

fn parse_build(node: &KdlNode) -> ConfigResult<BuildConfig> {
    let mut build = BuildConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "app" => {
                    build.app = get_first_string_arg(child)
                        .ok_or_else(|| ConfigError::MissingField("build app".to_string()))?;
                }
                "node-version" | "node_version" => {
                    build.node_version = get_first_scalar_arg(child).ok_or_else(|| {
                        ConfigError::MissingField("build node-version".to_string())
                    })?;
                }
                "image" => {
                    build.image = get_first_string_arg(child)
                        .ok_or_else(|| ConfigError::MissingField("build image".to_string()))?;
                }
                "install" => build.install.extend(get_all_string_args(child)),
                "run" => build.build.extend(get_all_string_args(child)),
                "post-build" | "post_build" => build.post_build.extend(get_all_string_args(child)),
                other => debug!(node = other, "ignoring unknown build field"),
            }
        }
    }

    if build.app.is_empty() || build.app.contains(['/', ' ']) {
        return Err(ConfigError::invalid(
            "build app",
            format!("'{}' is not a project name", build.app),
        ));
    }
    Ok(build)
}

fn parse_lookup(node: &KdlNode, zones: &mut BTreeMap<String, String>) -> ConfigResult<()> {
    let Some(children) = node.children() else {
        return Ok(());
    };
    for child in children.nodes() {
        if child.name().value() != "hosted-zone" {
            debug!(node = child.name().value(), "ignoring unknown lookup entry");
            continue;
        }
        let name = get_first_string_arg(child)
            .ok_or_else(|| ConfigError::MissingField("hosted-zone name".to_string()))?;
        let id = get_string_prop(child, "id")
            .ok_or_else(|| ConfigError::MissingField(format!("id for hosted-zone '{}'", name)))?;
        let name = name.trim_end_matches('.').to_string();
        if zones.insert(name.clone(), id).is_some() {
            return Err(ConfigError::Duplicate(format!("hosted-zone '{}'", name)));
        }
    }
    Ok(())
}

fn validate_stack_name(name: &str) -> ConfigResult<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && name.len() <= 128
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(ConfigError::invalid(
            "stack name",
            format!("'{}' is not a valid stack name", name),
        ));
    }
    Ok(())
}

/// The domain doubles as the bucket name, so it must be a plain lowercase
/// host name without wildcards or a trailing dot.
fn validate_domain(domain: &str) -> ConfigResult<()> {
    if domain.len() > 63 {
        return Err(ConfigError::invalid(
            "domain",
            format!("'{}' is longer than a bucket name allows", domain),
        ));
    }
    if !DOMAIN_REGEX.is_match(domain) {
        return Err(ConfigError::invalid(
            "domain",
            format!("'{}' is not a lowercase domain name", domain),
        ));
    }
    Ok(())
}

/// True if `domain` is `zone` itself or a name below it.
pub(crate) fn zone_covers(zone: &str, domain: &str) -> bool {
    domain == zone
        || domain
            .strip_suffix(zone)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// First argument as text, accepting bare integers like `node-version 10`.
fn get_first_scalar_arg(node: &KdlNode) -> Option<String> {
    let entry = node.entries().iter().find(|e| e.name().is_none())?;
    let value = entry.value();
    value
        .as_string()
        .map(|s| s.to_string())
        .or_else(|| value.as_integer().map(|i| i.to_string()))
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}
