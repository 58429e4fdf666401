//! Cloud assembly output: template, manifest and construct tree.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::asset;
use crate::stack::SynthesizedStack;
use crate::SynthResult;

pub const MANIFEST_VERSION: &str = "1.10.0";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const TREE_FILE: &str = "tree.json";

/// Writes synthesized stacks into an output directory.
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    out_dir: PathBuf,
    /// Asset sources are resolved against this directory.
    base_dir: PathBuf,
}

impl CloudAssembly {
    pub fn new(out_dir: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            base_dir: base_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write the stack and its assets. Returns every file or directory
    /// written, in write order.
    pub fn write(&self, stack: &SynthesizedStack) -> SynthResult<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.out_dir)?;
        let mut written = Vec::new();

        let mut asset_metadata = Vec::new();
        for file_asset in &stack.assets {
            let source = self.base_dir.join(&file_asset.source);
            let hash = asset::fingerprint(&source)?;
            let staged = self.out_dir.join(format!("asset.{}", hash));
            if !staged.exists() {
                asset::stage(&source, &staged)?;
            }
            debug!(source = %source.display(), hash = %hash, "staged asset");
            asset_metadata.push(file_asset.metadata(&hash));
            written.push(staged);
        }

        let template_path = self.out_dir.join(stack.template_file());
        std::fs::write(&template_path, stack.template.to_json_pretty()?)?;
        info!(path = %template_path.display(), "wrote template");
        written.push(template_path);

        let tree_path = self.out_dir.join(TREE_FILE);
        std::fs::write(&tree_path, serde_json::to_string_pretty(&tree(stack))?)?;
        written.push(tree_path);

        let manifest_path = self.out_dir.join(MANIFEST_FILE);
        let manifest = manifest(stack, asset_metadata);
        std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
        info!(path = %manifest_path.display(), "wrote manifest");
        written.push(manifest_path);

        Ok(written)
    }
}

/// The cloud assembly manifest for one stack.
pub fn manifest(stack: &SynthesizedStack, asset_metadata: Vec<Value>) -> Value {
    let mut metadata: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    if !asset_metadata.is_empty() {
        metadata.insert(format!("/{}", stack.name), asset_metadata);
    }
    for (id, resource) in &stack.template.resources {
        if let Some(path) = resource.construct_path() {
            metadata.entry(path.to_string()).or_default().push(json!({
                "type": "aws:cdk:logicalId",
                "data": id.as_str(),
            }));
        }
    }

    let mut artifacts = Map::new();
    artifacts.insert(
        stack.name.clone(),
        json!({
            "type": "aws:cloudformation:stack",
            "environment": stack.environment(),
            "properties": {
                "templateFile": stack.template_file(),
            },
            "metadata": metadata,
        }),
    );
    artifacts.insert(
        "Tree".to_string(),
        json!({
            "type": "cdk:tree",
            "properties": { "file": TREE_FILE },
        }),
    );

    json!({
        "version": MANIFEST_VERSION,
        "artifacts": artifacts,
    })
}

/// Construct tree: every construct path with the resource declared there.
pub fn tree(stack: &SynthesizedStack) -> Value {
    let mut root = TreeNode::default();
    for (id, resource) in &stack.template.resources {
        let Some(path) = resource.construct_path() else {
            continue;
        };
        let mut node = &mut root;
        for component in path.trim_start_matches('/').split('/') {
            node = node.children.entry(component.to_string()).or_default();
        }
        node.resource = Some((id.to_string(), resource.resource_type.clone()));
    }
    json!({
        "version": "tree-0.1",
        "tree": root.to_value("App", ""),
    })
}

#[derive(Debug, Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
    resource: Option<(String, String)>,
}

impl TreeNode {
    fn to_value(&self, id: &str, path: &str) -> Value {
        let mut node = Map::new();
        node.insert("id".to_string(), json!(id));
        node.insert("path".to_string(), json!(path));
        if let Some((logical_id, resource_type)) = &self.resource {
            node.insert(
                "attributes".to_string(),
                json!({
                    "aws:cdk:cloudformation:type": resource_type,
                    "aws:cdk:logicalId": logical_id,
                }),
            );
        }
        if !self.children.is_empty() {
            let children = self
                .children
                .iter()
                .map(|(name, child)| {
                    let child_path = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{}/{}", path, name)
                    };
                    (name.clone(), child.to_value(name, &child_path))
                })
                .collect();
            node.insert("children".to_string(), Value::Object(children));
        }
        Value::Object(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepipe_config::{ContextLookup, parse_stack_config};
    use crate::stack::SiteStack;

    fn stack() -> SynthesizedStack {
        let config = parse_stack_config(
            r#"
stack "SitePipelineStack" {
    domain "example.com"
    account "123456789012"
    region "eu-central-1"
}
lookup {
    hosted-zone "example.com" id="Z23ABC4XYZL05B"
}
"#,
        )
        .unwrap();
        SiteStack::synthesize(&config, &ContextLookup::from_config(&config)).unwrap()
    }

    #[test]
    fn test_manifest_shape() {
        let stack = stack();
        let manifest = manifest(&stack, vec![stack.assets[0].metadata("abc123")]);
        let artifact = &manifest["artifacts"]["SitePipelineStack"];
        assert_eq!(artifact["type"], "aws:cloudformation:stack");
        assert_eq!(artifact["environment"], "aws://123456789012/eu-central-1");
        assert_eq!(
            artifact["properties"]["templateFile"],
            "SitePipelineStack.template.json"
        );
        assert_eq!(
            artifact["metadata"]["/SitePipelineStack"][0]["type"],
            "aws:cdk:asset"
        );
        assert_eq!(
            artifact["metadata"]["/SitePipelineStack/SiteBucket"][0]["type"],
            "aws:cdk:logicalId"
        );
    }

    #[test]
    fn test_tree_nests_construct_paths() {
        let stack = stack();
        let tree = tree(&stack);
        let cert = &tree["tree"]["children"]["SitePipelineStack"]["children"]["WebAppCertificate"];
        assert_eq!(cert["path"], "SitePipelineStack/WebAppCertificate");
        let resource = &cert["children"]["CertificateRequestorResource"];
        assert_eq!(
            resource["attributes"]["aws:cdk:cloudformation:type"],
            "Custom::DnsValidatedCertificate"
        );
    }

    #[test]
    fn test_write_assembly() {
        let base = std::env::temp_dir().join(format!("sitepipe-assembly-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&base);
        let handler = base.join("lambda-packages/dns_validated_certificate_handler");
        std::fs::create_dir_all(&handler).unwrap();
        std::fs::write(handler.join("index.js"), "exports.certificateRequestHandler = () => {};")
            .unwrap();

        let out = base.join("cdk.out");
        let assembly = CloudAssembly::new(&out, &base);
        let stack = stack();
        let written = assembly.write(&stack).unwrap();
        assert_eq!(written.len(), 4);

        let read_outputs = || {
            ["SitePipelineStack.template.json", TREE_FILE, MANIFEST_FILE]
                .map(|file| std::fs::read_to_string(out.join(file)).unwrap())
        };
        let first = read_outputs();
        let template = &first[0];
        assert_eq!(template, &stack.template.to_json_pretty().unwrap());

        let manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(MANIFEST_FILE)).unwrap()).unwrap();
        let hash = manifest["artifacts"]["SitePipelineStack"]["metadata"]["/SitePipelineStack"][0]
            ["data"]["sourceHash"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(out.join(format!("asset.{}", hash)).join("index.js").exists());

        // a second synthesis and write produces identical files
        assembly.write(&self::stack()).unwrap();
        assert_eq!(first, read_outputs());

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_repository_config_synthesizes() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let text = std::fs::read_to_string(root.join("sitepipe.kdl")).unwrap();
        let config = parse_stack_config(&text).unwrap();
        let stack = SiteStack::synthesize(&config, &ContextLookup::from_config(&config)).unwrap();

        let out = std::env::temp_dir().join(format!("sitepipe-repo-config-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&out);
        let written = CloudAssembly::new(&out, &root).write(&stack).unwrap();
        assert_eq!(written.len(), 4);
        assert!(out.join(stack.template_file()).exists());
        assert!(out.join(TREE_FILE).exists());

        let manifest: Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(MANIFEST_FILE)).unwrap()).unwrap();
        let hash = manifest["artifacts"][stack.name.as_str()]["metadata"][format!("/{}", stack.name)][0]
            ["data"]["sourceHash"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(out.join(format!("asset.{}", hash)).join("index.js").exists());

        std::fs::remove_dir_all(&out).unwrap();
    }

    #[test]
    fn test_missing_asset_fails() {
        let base = std::env::temp_dir().join(format!("sitepipe-noasset-{}", std::process::id()));
        let assembly = CloudAssembly::new(base.join("cdk.out"), &base);
        assert!(assembly.write(&stack()).is_err());
        let _ = std::fs::remove_dir_all(&base);
    }
}
