//! Crate-wide error type for trace-structural failures (spec §7.1).
//!
//! Recording-side run-time errors observed in the *traced* program are a
//! separate, non-exception value type — see [`crate::runtime_error`].
//! Engine-internal invariant violations (overlapping fragments, unknown
//! event kind) are programming errors and `panic!`/`debug_assert!` rather
//! than flow through this enum.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("trace stream truncated at offset {offset}")]
    TruncatedStream { offset: u64 },

    #[error("malformed event record at offset {offset}: {reason}")]
    MalformedRecord { offset: u64, reason: String },

    #[error("trace format version mismatch: trace={trace}, engine={engine}")]
    VersionMismatch { trace: u32, engine: u32 },

    #[error("unknown event kind tag {tag} at offset {offset}")]
    UnknownEventKind { tag: u8, offset: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
