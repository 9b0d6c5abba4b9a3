//! Logging setup shared by the library and the `seec-trace` binary.
//!
//! The original C++ `TraceThreadListener`/`TraceProcessListener` log at
//! lock acquisition, synchronized exit, and malformed-record recovery;
//! this crate keeps those call sites but routes them through the `log`
//! facade and `env_logger`, matching how the rest of the pack wires up
//! logging rather than a bespoke macro.

/// Install the `env_logger` backend. Safe to call more than once; only the
/// first call has an effect.
pub fn init() {
    let _ = env_logger::builder().is_test(cfg!(test)).try_init();
}
