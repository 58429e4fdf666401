//! Pipeline, stage and action definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

use crate::secret::SecretValue;
use crate::template::fns;
use crate::{Error, LogicalId, Result};

/// A CI/CD pipeline definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name (e.g., "deploy-angular-application").
    pub name: String,
    /// Stages, executed strictly in this order.
    pub stages: Vec<Stage>,
}

/// A stage in a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name.
    pub name: String,
    /// Actions of this stage.
    pub actions: Vec<Action>,
}

/// Where a new stage goes relative to the existing ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// After every existing stage.
    Append,
    /// Immediately after the named stage.
    JustAfter(String),
    /// Immediately before the named stage.
    RightBefore(String),
}

/// How the source action notices new commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceTrigger {
    /// Never start automatically.
    None,
    /// CodePipeline periodically polls the repository.
    Poll,
    /// A webhook registered with the Git host.
    Webhook,
}

impl std::fmt::Display for SourceTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTrigger::None => write!(f, "none"),
            SourceTrigger::Poll => write!(f, "poll"),
            SourceTrigger::Webhook => write!(f, "webhook"),
        }
    }
}

impl std::str::FromStr for SourceTrigger {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SourceTrigger::None),
            "poll" => Ok(SourceTrigger::Poll),
            "webhook" => Ok(SourceTrigger::Webhook),
            _ => Err(format!("Unknown source trigger: {}", s)),
        }
    }
}

/// What an action does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActionKind {
    /// Pull a branch from GitHub.
    GitHubSource {
        owner: String,
        repo: String,
        branch: String,
        oauth_token: SecretValue,
        trigger: SourceTrigger,
    },
    /// Run a CodeBuild project.
    CodeBuild { project: LogicalId },
}

impl ActionKind {
    /// `(Category, Owner, Provider, Version)`
    pub fn action_type_id(&self) -> (&'static str, &'static str, &'static str, &'static str) {
        match self {
            ActionKind::GitHubSource { .. } => ("Source", "ThirdParty", "GitHub", "1"),
            ActionKind::CodeBuild { .. } => ("Build", "AWS", "CodeBuild", "1"),
        }
    }

    pub fn configuration(&self) -> Value {
        match self {
            ActionKind::GitHubSource {
                owner,
                repo,
                branch,
                oauth_token,
                trigger,
            } => json!({
                "Owner": owner,
                "Repo": repo,
                "Branch": branch,
                "OAuthToken": oauth_token.dynamic_reference(),
                "PollForSourceChanges": *trigger == SourceTrigger::Poll,
            }),
            ActionKind::CodeBuild { project } => json!({
                "ProjectName": fns::reference(project),
            }),
        }
    }
}

/// A single action inside a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    /// Actions with a lower run order finish before higher ones start.
    pub run_order: u32,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl Action {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            run_order: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, artifact: impl Into<String>) -> Self {
        self.inputs.push(artifact.into());
        self
    }

    pub fn output(mut self, artifact: impl Into<String>) -> Self {
        self.outputs.push(artifact.into());
        self
    }

    pub fn to_value(&self) -> Value {
        let (category, owner, provider, version) = self.kind.action_type_id();
        let mut action = Map::new();
        action.insert(
            "ActionTypeId".to_string(),
            json!({
                "Category": category,
                "Owner": owner,
                "Provider": provider,
                "Version": version,
            }),
        );
        action.insert("Configuration".to_string(), self.kind.configuration());
        if !self.inputs.is_empty() {
            action.insert(
                "InputArtifacts".to_string(),
                Value::Array(self.inputs.iter().map(|n| json!({ "Name": n })).collect()),
            );
        }
        action.insert("Name".to_string(), json!(self.name));
        if !self.outputs.is_empty() {
            action.insert(
                "OutputArtifacts".to_string(),
                Value::Array(self.outputs.iter().map(|n| json!({ "Name": n })).collect()),
            );
        }
        action.insert("RunOrder".to_string(), json!(self.run_order));
        Value::Object(action)
    }
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
        }
    }

    pub fn add_action(&mut self, action: Action) -> &mut Self {
        self.actions.push(action);
        self
    }

    pub fn to_value(&self) -> Value {
        json!({
            "Actions": self.actions.iter().map(Action::to_value).collect::<Vec<_>>(),
            "Name": self.name,
        })
    }
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Insert a stage at `placement` and return it for adding actions.
    pub fn add_stage(&mut self, name: &str, placement: Placement) -> Result<&mut Stage> {
        if self.stage(name).is_some() {
            return Err(Error::Placement(format!("duplicate stage '{}'", name)));
        }
        let index = match &placement {
            Placement::Append => self.stages.len(),
            Placement::JustAfter(anchor) => self.position(anchor)? + 1,
            Placement::RightBefore(anchor) => self.position(anchor)?,
        };
        self.stages.insert(index, Stage::new(name));
        Ok(&mut self.stages[index])
    }

    fn position(&self, anchor: &str) -> Result<usize> {
        self.stages
            .iter()
            .position(|s| s.name == anchor)
            .ok_or_else(|| {
                Error::Placement(format!("anchor stage '{}' does not exist", anchor))
            })
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Check the structure CodePipeline requires: at least two stages, no
    /// empty stage, unique action names per stage, unique artifact names,
    /// and every input artifact produced by an earlier stage.
    pub fn validate(&self) -> Result<()> {
        if self.stages.len() < 2 {
            return Err(Error::InvalidInput(format!(
                "pipeline '{}' needs at least two stages, found {}",
                self.name,
                self.stages.len()
            )));
        }
        if self.stages[0]
            .actions
            .iter()
            .any(|a| !matches!(a.kind, ActionKind::GitHubSource { .. }))
        {
            return Err(Error::Placement(format!(
                "first stage '{}' may only contain source actions",
                self.stages[0].name
            )));
        }

        // artifact name -> index of the producing stage
        let mut produced: HashMap<&str, usize> = HashMap::new();
        for (index, stage) in self.stages.iter().enumerate() {
            if stage.actions.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "stage '{}' has no actions",
                    stage.name
                )));
            }
            let mut action_names = Vec::new();
            for action in &stage.actions {
                if action_names.contains(&action.name.as_str()) {
                    return Err(Error::InvalidInput(format!(
                        "duplicate action '{}' in stage '{}'",
                        action.name, stage.name
                    )));
                }
                action_names.push(action.name.as_str());

                if index > 0 && matches!(action.kind, ActionKind::GitHubSource { .. }) {
                    return Err(Error::Placement(format!(
                        "source action '{}' must be in the first stage",
                        action.name
                    )));
                }

                for output in &action.outputs {
                    if produced.insert(output.as_str(), index).is_some() {
                        return Err(Error::InvalidInput(format!(
                            "artifact '{}' is produced more than once",
                            output
                        )));
                    }
                }
            }
        }

        for (index, stage) in self.stages.iter().enumerate() {
            for action in &stage.actions {
                for input in &action.inputs {
                    match produced.get(input.as_str()) {
                        Some(&producer) if producer < index => {}
                        Some(_) => {
                            return Err(Error::Placement(format!(
                                "action '{}' in stage '{}' consumes '{}' before it is produced",
                                action.name, stage.name, input
                            )));
                        }
                        None => {
                            return Err(Error::DanglingReference {
                                from: format!("{}/{}", stage.name, action.name),
                                to: input.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// The `Stages` property of an `AWS::CodePipeline::Pipeline`.
    pub fn stages_value(&self) -> Value {
        Value::Array(self.stages.iter().map(Stage::to_value).collect())
    }
}
