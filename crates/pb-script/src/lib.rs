//! pb-script: Remote build scripts for pbuild
//!
//! This crate generates the shell script each build host runs and defines
//! the line protocol used to follow that script's progress:
//! - [`ScriptBuilder`] / [`ScriptDocument`]: two-phase script construction
//! - [`assemble`]: the fixed build recipe for one host
//! - [`marker`]: activity marker lines and clock-skew detection
//! - [`LogLineCodec`]: line framing for remote output

pub mod assembler;
pub mod codec;
pub mod document;
pub mod marker;

pub use assembler::{assemble, ScriptContext};
pub use codec::LogLineCodec;
pub use document::{LengthMarkers, ScriptBuilder, ScriptDocument};
pub use marker::{ActivityTracker, LineKind, ACTIVITY_PREFIX, CLOCK_SKEW_WARNING};
