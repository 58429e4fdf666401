//! CLI command implementations.

pub mod context;
pub mod graph;
pub mod synth;

use anyhow::{Context, Result};
use sitepipe_config::context::DEFAULT_CONTEXT_FILE;
use sitepipe_config::{ContextLookup, Overrides, StackConfig, parse_stack_config_with};
use sitepipe_synth::SiteStack;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the configuration comes from.
pub struct Input {
    pub config_path: PathBuf,
    pub context_path: Option<PathBuf>,
    pub overrides: Overrides,
}

impl Input {
    pub fn new(config_path: PathBuf, context_path: Option<PathBuf>, overrides: Overrides) -> Self {
        Self {
            config_path,
            context_path,
            overrides,
        }
    }

    /// Directory containing the config file; relative paths in the config
    /// resolve against it.
    pub fn base_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf()
    }

    pub fn load_config(&self) -> Result<StackConfig> {
        let content = std::fs::read_to_string(&self.config_path).with_context(|| {
            format!("Failed to read config file: {}", self.config_path.display())
        })?;
        parse_stack_config_with(&content, &self.overrides).with_context(|| {
            format!("Failed to parse stack config: {}", self.config_path.display())
        })
    }

    /// Lookup context from the config's `lookup` block plus the context
    /// file. An explicitly given context file must exist.
    pub fn load_lookup(&self, config: &StackConfig) -> Result<ContextLookup> {
        let mut lookup = ContextLookup::from_config(config);
        let path = match &self.context_path {
            Some(path) => Some(path.clone()),
            None => {
                let default = self.base_dir().join(DEFAULT_CONTEXT_FILE);
                default.exists().then_some(default)
            }
        };
        if let Some(path) = path {
            lookup
                .load_file(&path)
                .with_context(|| format!("Failed to load context file: {}", path.display()))?;
        } else {
            debug!("no context file, using lookup block only");
        }
        Ok(lookup)
    }
}

pub fn validate(input: &Input) -> Result<()> {
    let result = input.load_config().and_then(|config| {
        let lookup = input.load_lookup(&config)?;
        let stack = SiteStack::synthesize(&config, &lookup)?;
        Ok(stack)
    });
    match result {
        Ok(stack) => {
            debug!(
                stack = %stack.name,
                resources = stack.template.resources.len(),
                "stack is valid"
            );
            println!("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}
