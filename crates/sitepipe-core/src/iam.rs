//! IAM roles and policy documents.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::template::{Resource, fns};
use crate::LogicalId;

pub const POLICY_VERSION: &str = "2012-10-17";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
}

/// One statement of a policy document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
    #[serde(serialize_with = "single_or_list")]
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "single_or_list")]
    pub resource: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str]) -> Self {
        Self {
            effect: Effect::Allow,
            principal: None,
            action: actions.iter().map(|a| a.to_string()).collect(),
            resource: Vec::new(),
        }
    }

    pub fn on(mut self, resource: Value) -> Self {
        self.resource.push(resource);
        self
    }

    pub fn on_all(self) -> Self {
        self.on(json!("*"))
    }

    pub fn principal(mut self, principal: Value) -> Self {
        self.principal = Some(principal);
        self
    }
}

/// CloudFormation collapses one-element lists; do the same so templates
/// stay readable.
#[allow(clippy::ptr_arg)]
fn single_or_list<S, T>(items: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: Serialize,
{
    if items.len() == 1 {
        items[0].serialize(serializer)
    } else {
        items.serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new() -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: Vec::new(),
        }
    }

    pub fn with(mut self, statement: PolicyStatement) -> Self {
        self.statement.push(statement);
        self
    }

    pub fn push(&mut self, statement: PolicyStatement) {
        self.statement.push(statement);
    }

    pub fn is_empty(&self) -> bool {
        self.statement.is_empty()
    }

    pub fn to_value(&self) -> Value {
        // a derived Serialize over strings and json values cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// An AWS service that can assume a role, e.g. `codebuild.amazonaws.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePrincipal(String);

impl ServicePrincipal {
    pub fn new(service: impl Into<String>) -> Self {
        Self(service.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn assume_role_policy(&self) -> PolicyDocument {
        PolicyDocument::new().with(
            PolicyStatement::allow(&["sts:AssumeRole"])
                .principal(json!({ "Service": self.0 })),
        )
    }
}

/// An AWS managed policy referenced by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedPolicy(String);

impl ManagedPolicy {
    pub fn aws_managed(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// `arn:<partition>:iam::aws:policy/<name>`
    pub fn arn(&self) -> Value {
        fns::join(
            "",
            vec![
                json!("arn:"),
                fns::pseudo(fns::Pseudo::Partition),
                json!(format!(":iam::aws:policy/{}", self.0)),
            ],
        )
    }
}

/// A role plus its inline default policy.
#[derive(Debug, Clone)]
pub struct Role {
    pub assumed_by: ServicePrincipal,
    pub managed_policies: Vec<ManagedPolicy>,
    pub default_policy: PolicyDocument,
}

impl Role {
    pub fn new(assumed_by: ServicePrincipal) -> Self {
        Self {
            assumed_by,
            managed_policies: Vec::new(),
            default_policy: PolicyDocument::new(),
        }
    }

    pub fn with_managed_policy(mut self, policy: ManagedPolicy) -> Self {
        self.managed_policies.push(policy);
        self
    }

    pub fn grant(&mut self, statement: PolicyStatement) {
        self.default_policy.push(statement);
    }

    pub fn role_resource(&self) -> Resource {
        let mut resource = Resource::new("AWS::IAM::Role").property(
            "AssumeRolePolicyDocument",
            self.assumed_by.assume_role_policy().to_value(),
        );
        if !self.managed_policies.is_empty() {
            resource = resource.property(
                "ManagedPolicyArns",
                Value::Array(self.managed_policies.iter().map(|p| p.arn()).collect()),
            );
        }
        resource
    }

    /// The `AWS::IAM::Policy` attaching the default policy, or `None` when
    /// nothing was granted.
    pub fn policy_resource(&self, role_id: &LogicalId, policy_name: &str) -> Option<Resource> {
        if self.default_policy.is_empty() {
            return None;
        }
        Some(
            Resource::new("AWS::IAM::Policy")
                .property("PolicyDocument", self.default_policy.to_value())
                .property("PolicyName", json!(policy_name))
                .property("Roles", json!([fns::reference(role_id)])),
        )
    }
}
