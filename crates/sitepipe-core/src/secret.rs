//! Secret references.
//!
//! Secrets never appear in a synthesized template. Instead the template
//! carries a dynamic reference that CloudFormation resolves at deploy time.

use serde::{Deserialize, Serialize};

/// A Secrets Manager secret whose `SecretString` is used as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretValue {
    secret_id: String,
}

impl SecretValue {
    pub fn secrets_manager(secret_id: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
        }
    }

    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }

    /// The `{{resolve:secretsmanager:...}}` dynamic reference string.
    pub fn dynamic_reference(&self) -> String {
        format!(
            "{{{{resolve:secretsmanager:{}:SecretString:::}}}}",
            self.secret_id
        )
    }
}

impl std::fmt::Display for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dynamic_reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_manager_reference() {
        let secret = SecretValue::secrets_manager("cdk-pipeline-example");
        assert_eq!(secret.secret_id(), "cdk-pipeline-example");
        assert_eq!(
            secret.dynamic_reference(),
            "{{resolve:secretsmanager:cdk-pipeline-example:SecretString:::}}"
        );
        assert_eq!(secret.to_string(), secret.dynamic_reference());
    }
}
