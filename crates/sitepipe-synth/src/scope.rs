//! Construct scope: adds resources to a template under construct paths.

use serde_json::Value;
use sitepipe_core::LogicalId;
use sitepipe_core::template::{Output, Parameter, Resource, Template};

use crate::SynthResult;

/// A template being assembled for one stack. Every resource is added under
/// a construct path; its logical id is derived from that path.
#[derive(Debug)]
pub struct Scope {
    stack_name: String,
    template: Template,
}

impl Scope {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            template: Template::new(),
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.template.description = description;
    }

    /// Absolute construct path, e.g. `/SitePipelineStack/SiteBucket`.
    pub fn full_path(&self, path: &[&str]) -> String {
        format!("/{}/{}", self.stack_name, path.join("/"))
    }

    pub fn add_resource(&mut self, path: &[&str], resource: Resource) -> SynthResult<LogicalId> {
        let id = LogicalId::from_path(path)?;
        let full_path = self.full_path(path);
        self.template
            .add_resource(id.clone(), resource.path(&full_path))?;
        Ok(id)
    }

    pub fn add_parameter(&mut self, path: &[&str], parameter: Parameter) -> SynthResult<LogicalId> {
        let id = LogicalId::from_path(path)?;
        self.template.add_parameter(id.clone(), parameter)?;
        Ok(id)
    }

    pub fn add_output(&mut self, name: &str, value: Value, description: &str) -> SynthResult<()> {
        self.template.add_output(
            LogicalId::new(name)?,
            Output {
                value,
                description: Some(description.to_string()),
            },
        )?;
        Ok(())
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn into_template(self) -> Template {
        self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_gets_path_metadata() {
        let mut scope = Scope::new("SitePipelineStack");
        let id = scope
            .add_resource(&["SiteBucket"], Resource::new("AWS::S3::Bucket"))
            .unwrap();
        let resource = scope.template().resource(&id).unwrap();
        assert_eq!(
            resource.construct_path(),
            Some("/SitePipelineStack/SiteBucket")
        );
        assert!(id.as_str().starts_with("SiteBucket"));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut scope = Scope::new("S");
        scope
            .add_resource(&["A"], Resource::new("AWS::SNS::Topic"))
            .unwrap();
        assert!(
            scope
                .add_resource(&["A"], Resource::new("AWS::SNS::Topic"))
                .is_err()
        );
    }
}
