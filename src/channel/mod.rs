//! Channel configuration, compilation, and the compiled channel record.

pub mod compiled;
pub mod compiler;
pub mod config;

pub use compiled::{CompiledChannel, DebounceState, Mode, StageKind, TransientState};
pub use compiler::{compile, CompileReport, CompileWarning};
pub use config::{ChannelConfig, Priority, Repeat, Required};
