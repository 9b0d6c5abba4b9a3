//! Recording-side run-time errors observed in the *traced* program
//! (spec §3 "Runtime error", §7.2). This is a data type captured into the
//! trace, not a Rust `Error` — see [`crate::error::EngineError`] for
//! trace-structural failures, which are the only thing that flows through
//! `Result`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeErrorKind {
    InvalidPointer { address: u64 },
    OutOfBoundsAccess { address: u64, length: u64 },
    UninitialisedRead { address: u64, length: u64 },
    FormatSpecifierTypeMismatch { specifier: String },
    InsufficientBuffer { required: u64, available: u64 },
    InvalidFileStream { handle: u64 },
    InvalidCString { address: u64 },
    /// spec §8 scenario 4: a `%Ns` scan conversion matched more
    /// characters than the destination buffer could hold.
    ScanFormattedStringOverflow { writable: u64, matched_chars: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub severity: Severity,
    /// True if the error occurred at the program's top-level function
    /// (no caller recorded in this trace), matching spec §3's
    /// `is_top_level` field.
    pub is_top_level: bool,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, severity: Severity, is_top_level: bool) -> Self {
        RuntimeError {
            kind,
            severity,
            is_top_level,
        }
    }

    pub fn severity_byte(&self) -> u8 {
        match self.severity {
            Severity::Warning => 0,
            Severity::Fatal => 1,
        }
    }

    pub fn severity_from_byte(byte: u8) -> Option<Severity> {
        match byte {
            0 => Some(Severity::Warning),
            1 => Some(Severity::Fatal),
            _ => None,
        }
    }

    /// Serialize the kind + top-level flag to bytes for storage in an
    /// `Event::RuntimeError` payload (severity is carried as its own
    /// field on that event, not duplicated here).
    pub fn encode_payload(&self) -> Vec<u8> {
        #[derive(Serialize)]
        struct Payload<'a> {
            kind: &'a RuntimeErrorKind,
            is_top_level: bool,
        }
        serde_json::to_vec(&Payload {
            kind: &self.kind,
            is_top_level: self.is_top_level,
        })
        .expect("RuntimeErrorKind always serializes")
    }

    pub fn decode_payload(payload: &[u8], severity: Severity) -> Result<RuntimeError, String> {
        #[derive(Deserialize)]
        struct Payload {
            kind: RuntimeErrorKind,
            is_top_level: bool,
        }
        let parsed: Payload =
            serde_json::from_slice(payload).map_err(|e| format!("bad runtime error payload: {e}"))?;
        Ok(RuntimeError {
            kind: parsed.kind,
            severity,
            is_top_level: parsed.is_top_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_overflow_round_trips_through_payload_bytes() {
        let err = RuntimeError::new(
            RuntimeErrorKind::ScanFormattedStringOverflow {
                writable: 2,
                matched_chars: 3,
            },
            Severity::Fatal,
            false,
        );
        let payload = err.encode_payload();
        let decoded = RuntimeError::decode_payload(&payload, err.severity).unwrap();
        assert_eq!(decoded, err);
    }
}
