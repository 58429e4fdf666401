//! File assets shipped alongside a template.
//!
//! The template only carries parameters for an asset's S3 location; the
//! content hash is computed when the cloud assembly is written, so the
//! template bytes never depend on the asset contents.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use sitepipe_core::LogicalId;
use sitepipe_core::template::{Parameter, fns};
use std::path::{Path, PathBuf};

use crate::scope::Scope;
use crate::{SynthError, SynthResult};

/// A local directory packaged as a zip and uploaded before deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct FileAsset {
    /// Source path as configured, relative to the configuration directory.
    pub source: String,
    pub bucket_parameter: LogicalId,
    pub key_parameter: LogicalId,
    pub hash_parameter: LogicalId,
}

impl FileAsset {
    /// Declare the asset parameters in `scope` under `name`.
    pub fn declare(scope: &mut Scope, name: &str, source: &str) -> SynthResult<Self> {
        let bucket_parameter = scope.add_parameter(
            &["AssetParameters", name, "S3Bucket"],
            Parameter::string(format!("S3 bucket for asset \"{}\"", name)),
        )?;
        let key_parameter = scope.add_parameter(
            &["AssetParameters", name, "S3VersionKey"],
            Parameter::string(format!("S3 key for asset version \"{}\"", name)),
        )?;
        let hash_parameter = scope.add_parameter(
            &["AssetParameters", name, "ArtifactHash"],
            Parameter::string(format!("Artifact hash for asset \"{}\"", name)),
        )?;
        Ok(Self {
            source: source.to_string(),
            bucket_parameter,
            key_parameter,
            hash_parameter,
        })
    }

    pub fn bucket_name(&self) -> Value {
        fns::reference(&self.bucket_parameter)
    }

    /// The object key. The key parameter holds `<prefix>||<key>`.
    pub fn object_key(&self) -> Value {
        let split = || fns::split("||", fns::reference(&self.key_parameter));
        fns::join(
            "",
            vec![fns::select(0, split()), fns::select(1, split())],
        )
    }

    /// Cloud-assembly metadata entry announcing the asset.
    pub fn metadata(&self, source_hash: &str) -> Value {
        json!({
            "type": "aws:cdk:asset",
            "data": {
                "path": format!("asset.{}", source_hash),
                "id": source_hash,
                "packaging": "zip",
                "sourceHash": source_hash,
                "s3BucketParameter": self.bucket_parameter.as_str(),
                "s3KeyParameter": self.key_parameter.as_str(),
                "artifactHashParameter": self.hash_parameter.as_str(),
            }
        })
    }
}

/// SHA-256 over every file below `path`, covering relative paths and
/// contents. Files are visited in sorted order so the hash is stable.
pub fn fingerprint(path: &Path) -> SynthResult<String> {
    if !path.exists() {
        return Err(SynthError::Asset {
            path: path.to_path_buf(),
            message: "does not exist".to_string(),
        });
    }

    let mut hasher = Sha256::new();
    if path.is_file() {
        hasher.update(std::fs::read(path)?);
        return Ok(hex::encode(hasher.finalize()));
    }

    for file in list_files(path)? {
        let relative = file.strip_prefix(path).unwrap_or(&file);
        hasher.update(relative.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update([0u8]);
        hasher.update(std::fs::read(&file)?);
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Copy an asset directory (or file) into `dest`.
pub fn stage(source: &Path, dest: &Path) -> SynthResult<()> {
    if source.is_file() {
        std::fs::create_dir_all(dest)?;
        let name = source.file_name().ok_or_else(|| SynthError::Asset {
            path: source.to_path_buf(),
            message: "has no file name".to_string(),
        })?;
        std::fs::copy(source, dest.join(name))?;
        return Ok(());
    }
    for file in list_files(source)? {
        let relative = file.strip_prefix(source).unwrap_or(&file);
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&file, &target)?;
    }
    Ok(())
}

fn list_files(dir: &Path) -> SynthResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
