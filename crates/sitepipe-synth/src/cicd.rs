//! Source → Build pipeline that builds the site and publishes it.

use serde_json::{Value, json};
use sitepipe_config::VariableContext;
use sitepipe_config::stack::{BuildConfig, SourceConfig};
use sitepipe_core::LogicalId;
use sitepipe_core::buildspec::{ArtifactSelection, BuildSpec, Phase};
use sitepipe_core::iam::{ManagedPolicy, PolicyStatement, Role, ServicePrincipal};
use sitepipe_core::pipeline::{Action, ActionKind, Pipeline, Placement, SourceTrigger};
use sitepipe_core::secret::SecretValue;
use sitepipe_core::template::{RemovalPolicy, Resource, fns};
use tracing::{debug, warn};

use crate::scope::Scope;
use crate::SynthResult;

pub const SOURCE_STAGE: &str = "Source";
pub const BUILD_STAGE: &str = "Build";

const SOURCE_ACTION: &str = "GitHub";
const BUILD_ACTION: &str = "Build";
const SOURCE_ARTIFACT: &str = "Artifact_Source_GitHub";

const BUCKET_READ_WRITE: &[&str] = &[
    "s3:GetObject*",
    "s3:GetBucket*",
    "s3:List*",
    "s3:DeleteObject*",
    "s3:PutObject*",
    "s3:Abort*",
];

pub struct PipelineProps<'a> {
    pub pipeline_name: &'a str,
    pub source: &'a SourceConfig,
    pub build: &'a BuildConfig,
    pub variables: &'a VariableContext,
}

/// The synthesized pipeline and the resources it owns.
#[derive(Debug, Clone)]
pub struct SitePipeline {
    pub pipeline: LogicalId,
    pub project: LogicalId,
    pub build_role: LogicalId,
    pub artifacts_bucket: LogicalId,
    pub definition: Pipeline,
}

impl SitePipeline {
    pub fn build(scope: &mut Scope, props: &PipelineProps<'_>) -> SynthResult<Self> {
        let artifacts_bucket = scope.add_resource(
            &["FrontendPipeline", "ArtifactsBucket"],
            Resource::new("AWS::S3::Bucket")
                .property(
                    "BucketEncryption",
                    json!({
                        "ServerSideEncryptionConfiguration": [{
                            "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" }
                        }]
                    }),
                )
                .removal_policy(RemovalPolicy::Retain),
        )?;
        let bucket_arn = fns::get_att(&artifacts_bucket, "Arn");
        let bucket_objects = fns::join("", vec![bucket_arn.clone(), json!("/*")]);

        // Build project and its role
        let project_path = ["CodeBuildProject"];
        let project_id = LogicalId::from_path(&project_path)?;

        let mut build_role = Role::new(ServicePrincipal::new("codebuild.amazonaws.com"))
            .with_managed_policy(ManagedPolicy::aws_managed("AmazonS3FullAccess"))
            .with_managed_policy(ManagedPolicy::aws_managed("CloudFrontFullAccess"));
        build_role.grant(
            PolicyStatement::allow(&["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"])
                .on(log_group_arn(&project_id, false))
                .on(log_group_arn(&project_id, true)),
        );
        build_role.grant(
            PolicyStatement::allow(BUCKET_READ_WRITE)
                .on(bucket_arn.clone())
                .on(bucket_objects.clone()),
        );
        let build_role_id = scope.add_resource(&["CodeBuildRole"], build_role.role_resource())?;

        let spec = build_spec(props.build, props.variables);
        let project = Resource::new("AWS::CodeBuild::Project")
            .property("Artifacts", json!({ "Type": "CODEPIPELINE" }))
            .property(
                "Environment",
                json!({
                    "ComputeType": "BUILD_GENERAL1_SMALL",
                    "Image": props.build.image,
                    "PrivilegedMode": false,
                    "Type": "LINUX_CONTAINER",
                }),
            )
            .property("ServiceRole", fns::get_att(&build_role_id, "Arn"))
            .property(
                "Source",
                json!({
                    "BuildSpec": spec.render()?,
                    "Type": "CODEPIPELINE",
                }),
            );
        let project = scope.add_resource(&project_path, project)?;

        let build_policy_path = ["CodeBuildRole", "DefaultPolicy"];
        let build_policy_id = LogicalId::from_path(&build_policy_path)?;
        if let Some(policy) = build_role.policy_resource(&build_role_id, build_policy_id.as_str()) {
            scope.add_resource(&build_policy_path, policy)?;
        }

        // Pipeline role
        let mut pipeline_role = Role::new(ServicePrincipal::new("codepipeline.amazonaws.com"));
        pipeline_role.grant(
            PolicyStatement::allow(BUCKET_READ_WRITE)
                .on(bucket_arn)
                .on(bucket_objects),
        );
        pipeline_role.grant(
            PolicyStatement::allow(&[
                "codebuild:BatchGetBuilds",
                "codebuild:StartBuild",
                "codebuild:StopBuild",
            ])
            .on(fns::get_att(&project, "Arn")),
        );
        let pipeline_role_id =
            scope.add_resource(&["FrontendPipeline", "Role"], pipeline_role.role_resource())?;
        let pipeline_policy_path = ["FrontendPipeline", "Role", "DefaultPolicy"];
        let pipeline_policy_id = LogicalId::from_path(&pipeline_policy_path)?;
        let mut pipeline_depends = vec![pipeline_role_id.clone()];
        if let Some(policy) =
            pipeline_role.policy_resource(&pipeline_role_id, pipeline_policy_id.as_str())
        {
            pipeline_depends.push(scope.add_resource(&pipeline_policy_path, policy)?);
        }

        // Stages
        let oauth_token = SecretValue::secrets_manager(&props.source.secret);
        let mut definition = Pipeline::new(props.pipeline_name);
        definition.add_stage(SOURCE_STAGE, Placement::Append)?;
        definition.add_stage(BUILD_STAGE, Placement::JustAfter(SOURCE_STAGE.to_string()))?;
        if let Some(stage) = definition.stage_mut(SOURCE_STAGE) {
            stage.add_action(
                Action::new(
                    SOURCE_ACTION,
                    ActionKind::GitHubSource {
                        owner: props.source.owner.clone(),
                        repo: props.source.repo.clone(),
                        branch: props.source.branch.clone(),
                        oauth_token: oauth_token.clone(),
                        trigger: props.source.trigger,
                    },
                )
                .output(SOURCE_ARTIFACT),
            );
        }
        if let Some(stage) = definition.stage_mut(BUILD_STAGE) {
            stage.add_action(
                Action::new(
                    BUILD_ACTION,
                    ActionKind::CodeBuild {
                        project: project.clone(),
                    },
                )
                .input(SOURCE_ARTIFACT),
            );
        }
        definition.validate()?;

        let mut pipeline_resource = Resource::new("AWS::CodePipeline::Pipeline")
            .property(
                "ArtifactStore",
                json!({
                    "Location": fns::reference(&artifacts_bucket),
                    "Type": "S3",
                }),
            )
            .property("Name", json!(props.pipeline_name))
            .property("RoleArn", fns::get_att(&pipeline_role_id, "Arn"))
            .property("Stages", definition.stages_value());
        for id in &pipeline_depends {
            pipeline_resource = pipeline_resource.depends_on(id);
        }
        let pipeline = scope.add_resource(&["FrontendPipeline"], pipeline_resource)?;

        if props.source.trigger == SourceTrigger::Webhook {
            scope.add_resource(
                &["FrontendPipeline", "Source", "GitHub", "WebhookResource"],
                Resource::new("AWS::CodePipeline::Webhook")
                    .property("Authentication", json!("GITHUB_HMAC"))
                    .property(
                        "AuthenticationConfiguration",
                        json!({ "SecretToken": oauth_token.dynamic_reference() }),
                    )
                    .property(
                        "Filters",
                        json!([{
                            "JsonPath": "$.ref",
                            "MatchEquals": "refs/heads/{Branch}",
                        }]),
                    )
                    .property("RegisterWithThirdParty", json!(true))
                    .property("TargetAction", json!(SOURCE_ACTION))
                    .property("TargetPipeline", fns::reference(&pipeline))
                    .property("TargetPipelineVersion", json!(1)),
            )?;
        }

        debug!(
            pipeline = props.pipeline_name,
            stages = ?definition.stage_names(),
            trigger = %props.source.trigger,
            "declared pipeline"
        );

        Ok(Self {
            pipeline,
            project,
            build_role: build_role_id,
            artifacts_bucket,
            definition,
        })
    }
}

/// Build spec for the site: install toolchain, build the app, then sync
/// the output to the bucket and invalidate the distribution.
pub fn build_spec(build: &BuildConfig, variables: &VariableContext) -> BuildSpec {
    let phase = |commands: Vec<String>| {
        for command in &commands {
            let unresolved = variables.unresolved_in(command);
            if !unresolved.is_empty() {
                warn!(command = %command, variables = ?unresolved, "build command has unresolved variables");
            }
        }
        Phase::new().commands(variables.interpolate_vec(&commands))
    };

    BuildSpec {
        install: phase(build.install_commands()).runtime("nodejs", &build.node_version),
        build: phase(build.build_commands()),
        post_build: phase(build.post_build_commands()),
        artifacts: Some(ArtifactSelection {
            files: vec!["**/*".to_string()],
            base_directory: Some(build.output_dir()),
            discard_paths: true,
        }),
    }
}

/// `arn:<partition>:logs:<region>:<account>:log-group:/aws/codebuild/<project>[:*]`
fn log_group_arn(project: &LogicalId, streams: bool) -> Value {
    let mut parts = vec![json!("log-group:/aws/codebuild/"), fns::reference(project)];
    if streams {
        parts.push(json!(":*"));
    }
    fns::arn(
        "logs",
        fns::pseudo(fns::Pseudo::Region),
        fns::pseudo(fns::Pseudo::AccountId),
        fns::join("", parts),
    )
}
