//! Logical identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum length CloudFormation accepts for a logical id.
const MAX_LOGICAL_ID_LEN: usize = 255;

/// A CloudFormation logical id.
///
/// Ids are derived from a construct path so that renaming an unrelated
/// resource never changes them. The last component of the path is kept
/// readable and an 8 character md5 suffix of the full path keeps ids unique.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Use `id` verbatim. Fails if it is not a valid logical id.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate(&id)?;
        Ok(Self(id))
    }

    /// Derive a logical id from a construct path.
    ///
    /// `["WebAppCertificate", "CertificateRequestorFunction"]` becomes
    /// `WebAppCertificateCertificateRequestorFunction` followed by the first
    /// eight hex digits of `md5("WebAppCertificate/CertificateRequestorFunction")`.
    pub fn from_path(path: &[&str]) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::InvalidInput("empty construct path".to_string()));
        }
        let human: String = path
            .iter()
            .flat_map(|component| component.chars())
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let digest = format!("{:x}", md5::compute(path.join("/")));
        let suffix = digest[..8].to_uppercase();

        // keep the hash intact when the readable part is too long
        let budget = MAX_LOGICAL_ID_LEN - suffix.len();
        let human: String = human.chars().take(budget).collect();
        Self::new(format!("{human}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for LogicalId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

fn validate(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::InvalidInput("logical id cannot be empty".to_string()));
    }
    if id.len() > MAX_LOGICAL_ID_LEN {
        return Err(Error::InvalidInput(format!(
            "logical id '{}' is longer than {} characters",
            id, MAX_LOGICAL_ID_LEN
        )));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidInput(format!(
            "logical id '{}' must be alphanumeric",
            id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_id() {
        let id = LogicalId::new("ARecord").unwrap();
        assert_eq!(id.as_str(), "ARecord");
        assert_eq!(id.to_string(), "ARecord");
    }

    #[test]
    fn test_rejects_non_alphanumeric() {
        assert!(LogicalId::new("Site-Bucket").is_err());
        assert!(LogicalId::new("").is_err());
    }

    #[test]
    fn test_path_id_is_deterministic() {
        let a = LogicalId::from_path(&["SiteBucket"]).unwrap();
        let b = LogicalId::from_path(&["SiteBucket"]).unwrap();
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("SiteBucket"));
        assert_eq!(a.as_str().len(), "SiteBucket".len() + 8);
    }

    #[test]
    fn test_path_id_suffix_matches_md5() {
        let id = LogicalId::from_path(&["WebAppDistribution", "CFDistribution"]).unwrap();
        let digest = format!("{:x}", md5::compute("WebAppDistribution/CFDistribution"));
        assert!(id.as_str().ends_with(&digest[..8].to_uppercase()));
        assert!(id.as_str().starts_with("WebAppDistributionCFDistribution"));
    }

    #[test]
    fn test_path_id_distinguishes_paths() {
        // same characters, different nesting
        let a = LogicalId::from_path(&["Code", "BuildRole"]).unwrap();
        let b = LogicalId::from_path(&["CodeBuild", "Role"]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_path_id_strips_separators() {
        let id = LogicalId::from_path(&["Frontend-Pipeline", "Artifacts_Bucket"]).unwrap();
        assert!(id.as_str().starts_with("FrontendPipelineArtifactsBucket"));
    }

    #[test]
    fn test_long_path_is_truncated_but_keeps_hash() {
        let long = "A".repeat(400);
        let id = LogicalId::from_path(&[long.as_str()]).unwrap();
        assert_eq!(id.as_str().len(), MAX_LOGICAL_ID_LEN);
    }
}
