//! Core error types for pbuild

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for pbuild
#[derive(Error, Debug)]
pub enum PbError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid combination of build options
    #[error("Option error: {0}")]
    Options(#[from] OptionsError),

    /// Log directory error
    #[error("Log error: {0}")]
    Log(#[from] LogError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two hosts share a tag
    #[error("Duplicate host tag '{0}' in configuration")]
    DuplicateTag(String),

    /// Two hosts share an address
    #[error("Duplicate host address '{0}' in configuration")]
    DuplicateAddress(String),

    /// Selector filtering left nothing to build
    #[error("No hosts defined for selector '{}'", .0.as_deref().unwrap_or("<none>"))]
    NoHosts(Option<String>),

    /// Host spec matches neither a tag nor an address
    #[error("Host '{0}' is not defined in the configuration")]
    UnknownHost(String),

    /// Unknown project kind
    #[error("Unknown project '{0}'")]
    UnknownProject(String),

    /// Unrecognized setting name
    #[error("Invalid setting '{setting}' in {origin}")]
    InvalidSetting { origin: String, setting: String },

    /// Test attributes outside the accepted set
    #[error("Invalid test attributes '{0}' (expected '', 'SLOW' or '-SLOW')")]
    InvalidTestAttributes(String),
}

/// Errors raised while validating build options
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OptionsError {
    /// --debug and --nodebug together
    #[error("Options --debug and --nodebug are mutually exclusive")]
    ConflictingDebug,

    /// --command combined with a build-only option
    #[error("Option --command conflicts with option --{0}")]
    ConflictsWithCommand(&'static str),

    /// Subproject list entry is not `dir:branch`
    #[error("Malformed subproject specification '{0}' (expected dir:branch)")]
    MalformedSubproject(String),

    /// Subproject directory not declared by the project
    #[error("Subproject '{directory}' is not valid for project '{project}'")]
    UnknownSubproject { project: String, directory: String },

    /// Container payload missing
    #[error("Container payload not found: {0}")]
    ContainerNotFound(PathBuf),
}

/// Log directory errors
#[derive(Error, Debug)]
pub enum LogError {
    /// Probe file could not be created
    #[error("Log directory {path} is not writable: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error while moving or removing logs
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
