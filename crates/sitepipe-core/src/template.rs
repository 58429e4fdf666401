//! CloudFormation template model.
//!
//! Every map in the template is ordered, so serializing the same template
//! twice always yields the same bytes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::{Error, LogicalId, Result};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Intrinsic function and pseudo parameter helpers.
pub mod fns {
    use super::*;

    /// Pseudo parameters resolved by CloudFormation at deploy time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Pseudo {
        AccountId,
        Partition,
        Region,
    }

    impl Pseudo {
        pub fn name(&self) -> &'static str {
            match self {
                Pseudo::AccountId => "AWS::AccountId",
                Pseudo::Partition => "AWS::Partition",
                Pseudo::Region => "AWS::Region",
            }
        }
    }

    pub fn reference(id: &LogicalId) -> Value {
        json!({ "Ref": id.as_str() })
    }

    pub fn pseudo(p: Pseudo) -> Value {
        json!({ "Ref": p.name() })
    }

    pub fn get_att(id: &LogicalId, attribute: &str) -> Value {
        json!({ "Fn::GetAtt": [id.as_str(), attribute] })
    }

    pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
        json!({ "Fn::Join": [delimiter, parts] })
    }

    pub fn select(index: usize, list: Value) -> Value {
        json!({ "Fn::Select": [index, list] })
    }

    pub fn split(delimiter: &str, source: Value) -> Value {
        json!({ "Fn::Split": [delimiter, source] })
    }

    /// `arn:<partition>:<service>:<region>:<account>:<resource>` with the
    /// partition always taken from the deployment.
    pub fn arn(service: &str, region: Value, account: Value, resource: Value) -> Value {
        join(
            "",
            vec![
                json!("arn:"),
                pseudo(Pseudo::Partition),
                json!(format!(":{service}:")),
                region,
                json!(":"),
                account,
                json!(":"),
                resource,
            ],
        )
    }
}

/// What happens to a resource when it is removed from the stack or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    Delete,
    Retain,
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalPolicy::Delete => write!(f, "Delete"),
            RemovalPolicy::Retain => write!(f, "Retain"),
        }
    }
}

/// A single resource declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<LogicalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: Vec::new(),
            update_replace_policy: None,
            deletion_policy: None,
            metadata: Map::new(),
        }
    }

    pub fn property(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    pub fn depends_on(mut self, id: &LogicalId) -> Self {
        if !self.depends_on.contains(id) {
            self.depends_on.push(id.clone());
        }
        self
    }

    /// Sets both the deletion and the update-replace policy.
    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.update_replace_policy = Some(policy);
        self.deletion_policy = Some(policy);
        self
    }

    /// Records the construct path the resource was declared at.
    pub fn path(mut self, path: &str) -> Self {
        self.metadata
            .insert("sitepipe:path".to_string(), Value::String(path.to_string()));
        self
    }

    pub fn construct_path(&self) -> Option<&str> {
        self.metadata.get("sitepipe:path").and_then(|v| v.as_str())
    }
}

/// A template parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Parameter {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            parameter_type: "String".to_string(),
            description: Some(description.into()),
        }
    }
}

/// A stack output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A complete CloudFormation template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Parameters", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<LogicalId, Parameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<LogicalId, Resource>,
    #[serde(rename = "Outputs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<LogicalId, Output>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(&mut self, id: LogicalId, resource: Resource) -> Result<()> {
        if self.resources.contains_key(&id) || self.parameters.contains_key(&id) {
            return Err(Error::InvalidInput(format!(
                "duplicate logical id '{}'",
                id
            )));
        }
        self.resources.insert(id, resource);
        Ok(())
    }

    pub fn add_parameter(&mut self, id: LogicalId, parameter: Parameter) -> Result<()> {
        if self.resources.contains_key(&id) || self.parameters.contains_key(&id) {
            return Err(Error::InvalidInput(format!(
                "duplicate logical id '{}'",
                id
            )));
        }
        self.parameters.insert(id, parameter);
        Ok(())
    }

    pub fn add_output(&mut self, id: LogicalId, output: Output) -> Result<()> {
        if self.outputs.contains_key(&id) {
            return Err(Error::InvalidInput(format!("duplicate output '{}'", id)));
        }
        self.outputs.insert(id, output);
        Ok(())
    }

    pub fn resource(&self, id: &LogicalId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// All resources of a given type, in logical id order.
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a LogicalId, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Logical ids referenced from a value through `Ref`, `Fn::GetAtt` or
/// `Fn::Sub`. Pseudo parameters (`AWS::*`) are not included.
pub fn references(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_references(value, &mut out);
    out
}

fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    push_target(target, out);
                    return;
                }
                if let Some(att) = map.get("Fn::GetAtt") {
                    match att {
                        Value::Array(parts) => {
                            if let Some(Value::String(target)) = parts.first() {
                                push_target(target, out);
                            }
                        }
                        Value::String(dotted) => {
                            if let Some((target, _)) = dotted.split_once('.') {
                                push_target(target, out);
                            }
                        }
                        _ => {}
                    }
                    return;
                }
                if let Some(sub) = map.get("Fn::Sub") {
                    let template = match sub {
                        Value::String(s) => Some(s.as_str()),
                        Value::Array(parts) => parts.first().and_then(|v| v.as_str()),
                        _ => None,
                    };
                    if let Some(template) = template {
                        for name in sub_variables(template) {
                            let target = name.split('.').next().unwrap_or(name);
                            push_target(target, out);
                        }
                    }
                    // variable map values can reference too
                    if let Value::Array(parts) = sub {
                        for part in parts.iter().skip(1) {
                            collect_references(part, out);
                        }
                    }
                    return;
                }
            }
            for v in map.values() {
                collect_references(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_references(v, out);
            }
        }
        _ => {}
    }
}

fn push_target(target: &str, out: &mut Vec<String>) {
    if target.starts_with("AWS::") {
        return;
    }
    if !out.iter().any(|t| t == target) {
        out.push(target.to_string());
    }
}

/// Variable names inside an `Fn::Sub` template. `${!Literal}` escapes are skipped.
fn sub_variables(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.starts_with('!') && !name.is_empty() {
            names.push(name);
        }
        rest = &after[end + 1..];
    }
    names
}
