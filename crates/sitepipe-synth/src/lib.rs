//! Stack synthesis for sitepipe.
//!
//! Provides the constructs of a static site stack:
//! - DNS-validated certificate pinned to us-east-1
//! - Website bucket and distribution
//! - Alias record
//! - Source → Build pipeline
//!
//! and writes the result as a cloud assembly.

pub mod assembly;
pub mod asset;
pub mod certificate;
pub mod cicd;
pub mod dns;
pub mod error;
pub mod scope;
pub mod site;
pub mod stack;

pub use assembly::CloudAssembly;
pub use error::{SynthError, SynthResult};
pub use stack::{SiteStack, SynthesizedStack};
