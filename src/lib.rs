//! A time-travel state engine for instrumented C programs: a binary
//! append-only event trace, a memory-fragment store with overwrite
//! history, and a bidirectional replay engine over both.

pub mod commands;
pub mod dsa;
pub mod error;
pub mod logging;
pub mod memory;
pub mod record;
pub mod replay;
pub mod runtime_error;
pub mod trace;

pub use error::{EngineError, Result};
