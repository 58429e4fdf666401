//! Resource dependency graph of a template.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::template::{Template, references};
use crate::{Error, LogicalId, Result};

/// Edges from each resource to the resources it depends on, through
/// intrinsic references or `DependsOn`.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl ResourceGraph {
    /// Build the graph and check that every reference resolves to a
    /// resource or parameter of the template.
    pub fn from_template(template: &Template) -> Result<Self> {
        let mut edges = BTreeMap::new();

        for (id, resource) in &template.resources {
            let mut deps = BTreeSet::new();
            let mut targets: Vec<String> = resource
                .properties
                .values()
                .flat_map(references)
                .collect();
            targets.extend(resource.depends_on.iter().map(|d| d.to_string()));

            for target in targets {
                let target_id = LogicalId::new(target.clone()).map_err(|_| {
                    Error::DanglingReference {
                        from: id.to_string(),
                        to: target.clone(),
                    }
                })?;
                if template.parameters.contains_key(&target_id) {
                    continue;
                }
                if !template.resources.contains_key(&target_id) {
                    return Err(Error::DanglingReference {
                        from: id.to_string(),
                        to: target,
                    });
                }
                if target_id == *id {
                    return Err(Error::CycleDetected(format!("{} -> {}", id, id)));
                }
                deps.insert(target);
            }
            edges.insert(id.to_string(), deps);
        }

        for (id, output) in &template.outputs {
            for target in references(&output.value) {
                let known = LogicalId::new(target.clone())
                    .map(|t| {
                        template.resources.contains_key(&t) || template.parameters.contains_key(&t)
                    })
                    .unwrap_or(false);
                if !known {
                    return Err(Error::DanglingReference {
                        from: format!("output {}", id),
                        to: target,
                    });
                }
            }
        }

        let graph = Self { edges };
        graph.detect_cycle()?;
        Ok(graph)
    }

    pub fn dependencies(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(id)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Resources in creation order: every resource comes after everything
    /// it depends on. Ties break alphabetically so the order is stable.
    pub fn topological_order(&self) -> Vec<String> {
        let mut remaining: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, deps) in &self.edges {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(id.as_str());
            }
        }

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(next) = ready.pop_first() {
            order.push(next.to_string());
            if let Some(children) = dependents.get(next) {
                for child in children {
                    if let Some(count) = remaining.get_mut(child) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(child);
                        }
                    }
                }
            }
        }
        order
    }

    /// Detect cycles in the dependency graph using DFS.
    fn detect_cycle(&self) -> Result<()> {
        let mut visited = HashMap::new();
        let mut rec_stack = HashMap::new();

        for id in self.edges.keys() {
            if !visited.contains_key(id.as_str()) {
                if let Some(cycle) = self.dfs_detect_cycle(id, &mut visited, &mut rec_stack) {
                    return Err(Error::CycleDetected(cycle));
                }
            }
        }
        Ok(())
    }

    fn dfs_detect_cycle<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashMap<&'a str, bool>,
        rec_stack: &mut HashMap<&'a str, bool>,
    ) -> Option<String> {
        visited.insert(node, true);
        rec_stack.insert(node, true);

        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                let dep_str: &'a str = dep.as_str();
                if !visited.contains_key(dep_str) {
                    if let Some(cycle) = self.dfs_detect_cycle(dep_str, visited, rec_stack) {
                        return Some(cycle);
                    }
                } else if rec_stack.get(dep_str).copied().unwrap_or(false) {
                    return Some(format!("{} -> {}", node, dep));
                }
            }
        }

        rec_stack.insert(node, false);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Output, Parameter, Resource, fns};

    fn id(s: &str) -> LogicalId {
        LogicalId::new(s).unwrap()
    }

    fn chain() -> Template {
        let mut template = Template::new();
        template
            .add_resource(id("Zone"), Resource::new("AWS::Route53::HostedZone"))
            .unwrap();
        template
            .add_resource(
                id("Cert"),
                Resource::new("AWS::CertificateManager::Certificate")
                    .property("HostedZoneId", fns::reference(&id("Zone"))),
            )
            .unwrap();
        template
            .add_resource(
                id("Dist"),
                Resource::new("AWS::CloudFront::Distribution")
                    .property("Cert", fns::reference(&id("Cert")))
                    .depends_on(&id("Zone")),
            )
            .unwrap();
        template
    }

    #[test]
    fn test_topological_order() {
        let graph = ResourceGraph::from_template(&chain()).unwrap();
        assert_eq!(graph.topological_order(), vec!["Zone", "Cert", "Dist"]);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_dangling_reference() {
        let mut template = chain();
        template
            .add_resource(
                id("Record"),
                Resource::new("AWS::Route53::RecordSet")
                    .property("Target", fns::get_att(&id("Missing"), "DomainName")),
            )
            .unwrap();
        let err = ResourceGraph::from_template(&template).unwrap_err();
        assert!(matches!(err, Error::DanglingReference { .. }));
    }

    #[test]
    fn test_parameter_reference_is_not_an_edge() {
        let mut template = chain();
        template
            .add_parameter(id("AssetBucket"), Parameter::string("bucket"))
            .unwrap();
        template
            .add_resource(
                id("Fn"),
                Resource::new("AWS::Lambda::Function")
                    .property("Code", fns::reference(&id("AssetBucket"))),
            )
            .unwrap();
        let graph = ResourceGraph::from_template(&template).unwrap();
        assert!(graph.dependencies("Fn").unwrap().is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let mut template = Template::new();
        template
            .add_resource(
                id("A"),
                Resource::new("AWS::SNS::Topic").property("X", fns::reference(&id("B"))),
            )
            .unwrap();
        template
            .add_resource(
                id("B"),
                Resource::new("AWS::SNS::Topic").depends_on(&id("A")),
            )
            .unwrap();
        let err = ResourceGraph::from_template(&template).unwrap_err();
        assert!(matches!(err, Error::CycleDetected(_)));
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let mut template = Template::new();
        template
            .add_resource(
                id("A"),
                Resource::new("AWS::SNS::Topic").property("X", fns::reference(&id("A"))),
            )
            .unwrap();
        assert!(matches!(
            ResourceGraph::from_template(&template).unwrap_err(),
            Error::CycleDetected(_)
        ));
    }

    #[test]
    fn test_output_reference_checked() {
        let mut template = chain();
        template
            .add_output(
                id("Url"),
                Output {
                    value: fns::get_att(&id("Nope"), "DomainName"),
                    description: None,
                },
            )
            .unwrap();
        assert!(ResourceGraph::from_template(&template).is_err());
    }
}
