//! CLI command implementations

mod build;
mod check;
mod list;

pub use build::{BuildArgs, BuildPlan};
pub use check::check_command;
pub use list::list_command;
