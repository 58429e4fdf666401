//! Variable interpolation for build commands.
//!
//! Supports variables like:
//! - `${site.domain}` - Site domain name
//! - `${site.bucket}` - Name of the bucket serving the site
//! - `${build.app}` - Application project name
//! - `${build.output_dir}` - Build output directory
//! - `${stack.name}` - Stack name
//! - `${stack.account}` - Target account
//! - `${stack.region}` - Target region
//! - `${distribution.id}` - Distribution id, known only at deploy time
//!
//! Literal variables are substituted in place. Deploy-time variables become
//! tokens of the resulting [`TokenString`].

use crate::stack::StackConfig;
use regex::Regex;
use serde_json::Value;
use sitepipe_core::token::TokenString;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// Site-related variables
    pub site: SiteContext,
    /// Build-related variables
    pub build: BuildContext,
    /// Stack-related variables
    pub stack: StackContext,
    /// Deploy-time values, keyed by full variable name
    pub tokens: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SiteContext {
    pub domain: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub app: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Default)]
pub struct StackContext {
    pub name: String,
    pub account: String,
    pub region: String,
}

/// What a variable resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Literal(String),
    Token(Value),
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

impl VariableContext {
    /// Create a new empty variable context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with the literal variables of a stack config. The
    /// bucket is named after the domain.
    pub fn from_config(config: &StackConfig) -> Self {
        VariableContextBuilder::new()
            .with_site(&config.domain, &config.domain)
            .with_build(&config.build.app, config.build.output_dir())
            .with_stack(&config.name, &config.account, &config.region)
            .build()
    }

    /// Bind a variable to a deploy-time value.
    pub fn set_token(&mut self, name: &str, token: Value) {
        self.tokens.insert(name.to_string(), token);
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<Resolved> {
        if let Some(token) = self.tokens.get(var_name) {
            return Some(Resolved::Token(token.clone()));
        }

        let parts: Vec<&str> = var_name.split('.').collect();

        let literal = match parts.as_slice() {
            ["site", "domain"] => Some(self.site.domain.clone()),
            ["site", "bucket"] => Some(self.site.bucket.clone()),

            ["build", "app"] => Some(self.build.app.clone()),
            ["build", "output_dir"] => Some(self.build.output_dir.clone()),

            ["stack", "name"] => Some(self.stack.name.clone()),
            ["stack", "account"] => Some(self.stack.account.clone()),
            ["stack", "region"] => Some(self.stack.region.clone()),

            _ => None,
        };
        literal.map(Resolved::Literal)
    }

    /// Interpolate all variables in a string.
    /// Unknown variables are kept as written.
    pub fn interpolate(&self, input: &str) -> TokenString {
        let mut out = TokenString::new();
        let mut last = 0;
        for caps in VAR_REGEX.captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_literal(&input[last..whole.start()]);
            match self.resolve(&caps[1]) {
                Some(Resolved::Literal(value)) => out.push_literal(value),
                Some(Resolved::Token(token)) => out.push_token(token),
                None => out.push_literal(whole.as_str()),
            }
            last = whole.end();
        }
        out.push_literal(&input[last..]);
        out
    }

    /// Interpolate variables in a list of strings.
    pub fn interpolate_vec(&self, inputs: &[String]) -> Vec<TokenString> {
        inputs.iter().map(|s| self.interpolate(s)).collect()
    }

    /// Names of variables used in a string that this context cannot resolve.
    pub fn unresolved_in(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .filter_map(|caps| {
                let var_name = &caps[1];
                if self.resolve(var_name).is_none() {
                    Some(var_name.to_string())
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_site(mut self, domain: impl Into<String>, bucket: impl Into<String>) -> Self {
        self.ctx.site.domain = domain.into();
        self.ctx.site.bucket = bucket.into();
        self
    }

    pub fn with_build(mut self, app: impl Into<String>, output_dir: impl Into<String>) -> Self {
        self.ctx.build.app = app.into();
        self.ctx.build.output_dir = output_dir.into();
        self
    }

    pub fn with_stack(
        mut self,
        name: impl Into<String>,
        account: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        self.ctx.stack.name = name.into();
        self.ctx.stack.account = account.into();
        self.ctx.stack.region = region.into();
        self
    }

    pub fn with_token(mut self, name: impl Into<String>, token: Value) -> Self {
        self.ctx.tokens.insert(name.into(), token);
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sitepipe_core::token::Fragment;

    fn site() -> VariableContext {
        VariableContextBuilder::new()
            .with_site("example.com", "example.com")
            .with_build("angular-app", "dist/angular-app")
            .with_stack("SitePipelineStack", "123456789012", "eu-central-1")
            .build()
    }

    #[test]
    fn test_literal_interpolation() {
        let result = site().interpolate("aws s3 rm s3://${site.bucket}/ --recursive");
        assert_eq!(
            result.as_literal().as_deref(),
            Some("aws s3 rm s3://example.com/ --recursive")
        );
    }

    #[test]
    fn test_build_variables() {
        let result = site().interpolate("aws s3 cp ./${build.output_dir} s3://${site.domain}/");
        assert_eq!(
            result.as_literal().as_deref(),
            Some("aws s3 cp ./dist/angular-app s3://example.com/")
        );
    }

    #[test]
    fn test_token_variable() {
        let mut ctx = site();
        ctx.set_token("distribution.id", json!({ "Ref": "Dist" }));

        let result = ctx.interpolate("--distribution-id ${distribution.id} --paths \"/*\"");
        assert!(result.has_tokens());
        assert_eq!(
            result.fragments(),
            &[
                Fragment::Literal("--distribution-id ".to_string()),
                Fragment::Token(json!({ "Ref": "Dist" })),
                Fragment::Literal(" --paths \"/*\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let ctx = VariableContext::new();
        let result = ctx.interpolate("Unknown: ${unknown.var}");
        assert_eq!(result.as_literal().as_deref(), Some("Unknown: ${unknown.var}"));
        assert_eq!(ctx.unresolved_in("${unknown.var} ${x}"), vec!["unknown.var", "x"]);
    }

    #[test]
    fn test_shell_text_untouched() {
        let result = site().interpolate("echo Build started on `date`");
        assert_eq!(
            result.as_literal().as_deref(),
            Some("echo Build started on `date`")
        );
    }

    #[test]
    fn test_interpolate_vec() {
        let ctx = site();
        let inputs = vec![
            "echo Building ${build.app}".to_string(),
            "echo ${stack.region}".to_string(),
        ];
        let results = ctx.interpolate_vec(&inputs);
        assert_eq!(results[0].as_literal().as_deref(), Some("echo Building angular-app"));
        assert_eq!(results[1].as_literal().as_deref(), Some("echo eu-central-1"));
    }
}
