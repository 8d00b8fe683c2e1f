//! pb-core: Core abstractions for pbuild
//!
//! This crate provides:
//! - Domain types shared by every pbuild crate (host targets, tags)
//! - Configuration loading, settings and build option resolution
//! - The catalog of buildable projects
//! - Log file naming and rotation
//! - Error types

pub mod config;
pub mod error;
pub mod logfile;
pub mod projects;
pub mod time;
pub mod types;

pub use config::{BuildOptions, BuildRequest, BuildType, Configuration, Settings};
pub use error::{ConfigError, LogError, OptionsError, PbError};
pub use logfile::{LogNaming, LogPhase};
pub use projects::{Project, ProjectKind, ProjectTemplate};
pub use types::{HostTag, HostTarget, SubprojectBranch};
