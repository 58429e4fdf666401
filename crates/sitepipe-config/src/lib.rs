//! KDL configuration parsing for sitepipe stacks.
//!
//! This crate handles parsing of:
//! - Stack definitions (sitepipe.kdl)
//! - Lookup context for hosted zones
//! - Variable interpolation in build commands

pub mod context;
pub mod error;
pub mod stack;
pub mod variables;

pub use context::ContextLookup;
pub use error::{ConfigError, ConfigResult};
pub use stack::{Overrides, StackConfig, parse_stack_config, parse_stack_config_with};
pub use variables::{VariableContext, VariableContextBuilder};
