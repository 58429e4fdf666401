//! Inline build specifications for the managed build runner.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Result;
use crate::token::{TokenJson, TokenString};

pub const BUILDSPEC_VERSION: &str = "0.2";

/// A build phase: optional runtime versions plus commands run in order.
/// The first failing command fails the phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Phase {
    pub runtime_versions: BTreeMap<String, String>,
    pub commands: Vec<TokenString>,
}

impl Phase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runtime(mut self, name: &str, version: &str) -> Self {
        self.runtime_versions
            .insert(name.to_string(), version.to_string());
        self
    }

    pub fn command(mut self, command: impl Into<TokenString>) -> Self {
        self.commands.push(command.into());
        self
    }

    pub fn commands<I, C>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<TokenString>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }
}

/// Which files the build hands back to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactSelection {
    pub files: Vec<String>,
    #[serde(rename = "base-directory", skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<String>,
    #[serde(rename = "discard-paths", serialize_with = "yes_no")]
    pub discard_paths: bool,
}

fn yes_no<S: serde::Serializer>(flag: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(if *flag { "yes" } else { "no" })
}

/// A build specification with `install`, `build` and `post_build` phases.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSpec {
    pub install: Phase,
    pub build: Phase,
    pub post_build: Phase,
    pub artifacts: Option<ArtifactSelection>,
}

#[derive(Serialize)]
struct RenderedPhase {
    #[serde(rename = "runtime-versions", skip_serializing_if = "BTreeMap::is_empty")]
    runtime_versions: BTreeMap<String, String>,
    commands: Vec<String>,
}

#[derive(Serialize)]
struct RenderedSpec {
    version: &'static str,
    phases: BTreeMap<&'static str, RenderedPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifacts: Option<ArtifactSelection>,
}

impl BuildSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// All phases with their names, in execution order.
    pub fn phases(&self) -> [(&'static str, &Phase); 3] {
        [
            ("install", &self.install),
            ("build", &self.build),
            ("post_build", &self.post_build),
        ]
    }

    /// Render to the JSON string the build project carries. Commands that
    /// contain deploy-time tokens turn the whole string into an `Fn::Join`.
    pub fn render(&self) -> Result<Value> {
        let mut tokens = TokenJson::new();
        let mut phases = BTreeMap::new();
        for (name, phase) in self.phases() {
            if phase.commands.is_empty() && phase.runtime_versions.is_empty() {
                continue;
            }
            let runtime_versions = phase
                .runtime_versions
                .iter()
                .map(|(runtime, version)| (tokens.escape(runtime), tokens.escape(version)))
                .collect();
            let commands = phase.commands.iter().map(|c| tokens.embed(c)).collect();
            phases.insert(
                name,
                RenderedPhase {
                    runtime_versions,
                    commands,
                },
            );
        }
        let artifacts = self.artifacts.as_ref().map(|a| ArtifactSelection {
            files: a.files.iter().map(|f| tokens.escape(f)).collect(),
            base_directory: a.base_directory.as_deref().map(|d| tokens.escape(d)),
            discard_paths: a.discard_paths,
        });
        let spec = RenderedSpec {
            version: BUILDSPEC_VERSION,
            phases,
            artifacts,
        };
        tokens.render(&spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_spec_renders_string() {
        let spec = BuildSpec {
            install: Phase::new().runtime("nodejs", "10").command("npm install"),
            build: Phase::new().command("ng build --prod"),
            ..Default::default()
        };
        let rendered = spec.render().unwrap();
        let text = rendered.as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed["version"], BUILDSPEC_VERSION);
        assert_eq!(parsed["phases"]["install"]["runtime-versions"]["nodejs"], "10");
        assert_eq!(parsed["phases"]["install"]["commands"], json!(["npm install"]));
        assert!(parsed["phases"].get("post_build").is_none());
    }

    #[test]
    fn test_artifacts_serialization() {
        let spec = BuildSpec {
            build: Phase::new().command("ng build --prod"),
            artifacts: Some(ArtifactSelection {
                files: vec!["**/*".to_string()],
                base_directory: Some("dist/angular-app".to_string()),
                discard_paths: true,
            }),
            ..Default::default()
        };
        let rendered = spec.render().unwrap();
        let parsed: Value = serde_json::from_str(rendered.as_str().unwrap()).unwrap();
        assert_eq!(parsed["artifacts"]["files"], json!(["**/*"]));
        assert_eq!(parsed["artifacts"]["base-directory"], "dist/angular-app");
        assert_eq!(parsed["artifacts"]["discard-paths"], "yes");
    }

    #[test]
    fn test_token_command_renders_join() {
        let mut invalidate = TokenString::literal("aws cloudfront create-invalidation --distribution-id ");
        invalidate.push_token(json!({ "Ref": "Dist" }));
        invalidate.push_literal(" --paths \"/*\"");
        let spec = BuildSpec {
            post_build: Phase::new().command(invalidate),
            ..Default::default()
        };
        let rendered = spec.render().unwrap();
        let parts = rendered["Fn::Join"][1].as_array().unwrap();
        assert_eq!(parts[1], json!({ "Ref": "Dist" }));
        assert!(parts[0].as_str().unwrap().ends_with("--distribution-id "));
        // quotes inside the command are escaped as JSON
        assert!(parts[2].as_str().unwrap().starts_with(" --paths \\\"/*\\\""));
    }

    #[test]
    fn test_marker_lookalike_command_kept_verbatim() {
        let spec = BuildSpec {
            build: Phase::new().command("echo '${Token[TOKEN.0]}'"),
            artifacts: Some(ArtifactSelection {
                files: vec!["**/*".to_string()],
                base_directory: Some("dist/${Token[TOKEN.3]}".to_string()),
                discard_paths: true,
            }),
            ..Default::default()
        };
        let rendered = spec.render().unwrap();
        let parsed: Value = serde_json::from_str(rendered.as_str().unwrap()).unwrap();
        assert_eq!(
            parsed["phases"]["build"]["commands"],
            json!(["echo '${Token[TOKEN.0]}'"])
        );
        assert_eq!(parsed["artifacts"]["base-directory"], "dist/${Token[TOKEN.3]}");
    }

    #[test]
    fn test_phase_order_is_execution_order() {
        let spec = BuildSpec::new();
        let names: Vec<_> = spec.phases().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["install", "build", "post_build"]);
    }
}
