//! Core domain types for sitepipe infrastructure synthesis.
//!
//! This crate contains:
//! - Logical identifiers and the CloudFormation template model
//! - Strings carrying deploy-time tokens
//! - IAM roles and policy documents
//! - Pipeline, stage and action definitions
//! - Build specifications
//! - Secret references and external lookups
//! - Resource dependency graph validation

pub mod buildspec;
pub mod error;
pub mod graph;
pub mod iam;
pub mod id;
pub mod lookup;
pub mod pipeline;
pub mod secret;
pub mod template;
pub mod token;

pub use error::{Error, Result};
pub use id::LogicalId;
