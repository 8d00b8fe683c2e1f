//! pbuild: Command-line interface for pbuild
//!
//! Provides the `pbuild` CLI: build on many hosts at once, list the
//! configured hosts and check that they are reachable.

pub mod commands;
pub mod output;
