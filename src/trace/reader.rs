//! On-disk trace layout (spec §6).
//!
//! A trace directory contains:
//!
//! - `module` — the compiled program, opaque to the engine.
//! - `process.events` — the global event stream.
//! - `thread.N.events` for `N` in `[1, thread_count]` — per-thread streams.
//! - `thread.N.functions` — per-thread function-record table, prefixed by
//!   a byte offset to the top-level-function list.
//! - `header.json` — `thread_count`, the final process time, and each
//!   thread's final time, so `move_to_end` is O(1) (spec §6: "recorded in
//!   headers or well-known offsets").
//!
//! Endianness and pointer width match the recorder (spec §6); we hard-code
//! little-endian and 64-bit offsets (`offset_uint` per spec is 64-bit).

use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::trace::stream::TraceStreamReader;

pub const FUNCTION_RECORD_LEN: usize = 4 + 8 + 8 + 8 + 8 + 8;

/// Fixed-layout function invocation record (spec §6):
/// `u32 function_index; offset_uint event_start; offset_uint event_end;
///  u64 thread_entered; u64 thread_exited; offset_uint child_list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionRecord {
    pub function_index: u32,
    pub event_start: u64,
    pub event_end: u64,
    pub thread_entered: u64,
    pub thread_exited: u64,
    pub child_list: u64,
}

impl FunctionRecord {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.write_u32::<LittleEndian>(self.function_index).unwrap();
        buf.write_u64::<LittleEndian>(self.event_start).unwrap();
        buf.write_u64::<LittleEndian>(self.event_end).unwrap();
        buf.write_u64::<LittleEndian>(self.thread_entered).unwrap();
        buf.write_u64::<LittleEndian>(self.thread_exited).unwrap();
        buf.write_u64::<LittleEndian>(self.child_list).unwrap();
    }

    pub fn decode(data: &[u8]) -> Result<FunctionRecord> {
        if data.len() < FUNCTION_RECORD_LEN {
            return Err(EngineError::TruncatedStream { offset: 0 });
        }
        let mut cur = std::io::Cursor::new(data);
        Ok(FunctionRecord {
            function_index: cur.read_u32::<LittleEndian>().unwrap(),
            event_start: cur.read_u64::<LittleEndian>().unwrap(),
            event_end: cur.read_u64::<LittleEndian>().unwrap(),
            thread_entered: cur.read_u64::<LittleEndian>().unwrap(),
            thread_exited: cur.read_u64::<LittleEndian>().unwrap(),
            child_list: cur.read_u64::<LittleEndian>().unwrap(),
        })
    }
}

/// Per-thread table of completed function invocations plus the list of
/// top-level (not nested in any other recorded call) function offsets.
pub struct FunctionTable {
    pub records: Vec<FunctionRecord>,
    /// Byte offsets (within the original `.functions` file) of records
    /// that are top-level, i.e. spec §3's `top_level_functions[tid]`.
    pub top_level_offsets: Vec<u64>,
}

impl FunctionTable {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // Placeholder for the top-level-list offset, patched below.
        buf.write_u64::<LittleEndian>(0).unwrap();
        for record in &self.records {
            record.encode(&mut buf);
        }
        let top_level_offset = buf.len() as u64;
        buf.write_u32::<LittleEndian>(self.top_level_offsets.len() as u32)
            .unwrap();
        for offset in &self.top_level_offsets {
            buf.write_u64::<LittleEndian>(*offset).unwrap();
        }
        buf[0..8].copy_from_slice(&top_level_offset.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<FunctionTable> {
        if data.len() < 8 {
            return Err(EngineError::TruncatedStream { offset: 0 });
        }
        let top_level_offset = u64::from_le_bytes(data[0..8].try_into().unwrap()) as usize;
        let mut records = Vec::new();
        let mut pos = 8usize;
        while pos + FUNCTION_RECORD_LEN <= top_level_offset {
            records.push(FunctionRecord::decode(&data[pos..pos + FUNCTION_RECORD_LEN])?);
            pos += FUNCTION_RECORD_LEN;
        }
        if top_level_offset + 4 > data.len() {
            return Err(EngineError::TruncatedStream {
                offset: top_level_offset as u64,
            });
        }
        let count =
            u32::from_le_bytes(data[top_level_offset..top_level_offset + 4].try_into().unwrap())
                as usize;
        let mut top_level_offsets = Vec::with_capacity(count);
        let mut cur = std::io::Cursor::new(&data[top_level_offset + 4..]);
        for _ in 0..count {
            top_level_offsets.push(
                cur.read_u64::<LittleEndian>()
                    .map_err(|_| EngineError::TruncatedStream {
                        offset: top_level_offset as u64,
                    })?,
            );
        }
        Ok(FunctionTable {
            records,
            top_level_offsets,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceHeader {
    pub thread_count: u32,
    pub final_process_time: u64,
    pub thread_final_times: Vec<u64>,
}

pub fn module_path(dir: &Path) -> PathBuf {
    dir.join("module")
}

pub fn process_events_path(dir: &Path) -> PathBuf {
    dir.join("process.events")
}

pub fn thread_events_path(dir: &Path, tid: u32) -> PathBuf {
    dir.join(format!("thread.{}.events", tid))
}

pub fn thread_functions_path(dir: &Path, tid: u32) -> PathBuf {
    dir.join(format!("thread.{}.functions", tid))
}

pub fn header_path(dir: &Path) -> PathBuf {
    dir.join("header.json")
}

pub fn write_header(dir: &Path, header: &TraceHeader) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(header).expect("TraceHeader always serializes");
    std::fs::write(header_path(dir), json)
}

fn read_header(dir: &Path) -> Result<TraceHeader> {
    let bytes = std::fs::read(header_path(dir))?;
    serde_json::from_slice(&bytes).map_err(|e| EngineError::MalformedRecord {
        offset: 0,
        reason: format!("header.json: {e}"),
    })
}

/// Read-only view over a whole trace directory (spec §6), used by replay.
pub struct TraceReader {
    dir: PathBuf,
    header: TraceHeader,
    process_events: TraceStreamReader,
    thread_events: Vec<TraceStreamReader>,
    thread_functions: Vec<FunctionTable>,
}

impl TraceReader {
    pub fn open(dir: &Path) -> Result<TraceReader> {
        let header = read_header(dir)?;
        let process_events = TraceStreamReader::open(&process_events_path(dir))?;

        let mut thread_events = Vec::with_capacity(header.thread_count as usize);
        let mut thread_functions = Vec::with_capacity(header.thread_count as usize);
        for tid in 1..=header.thread_count {
            thread_events.push(TraceStreamReader::open(&thread_events_path(dir, tid))?);
            let raw = std::fs::read(thread_functions_path(dir, tid))?;
            thread_functions.push(FunctionTable::decode(&raw).map_err(|e| {
                log::warn!("thread {tid} function table failed to decode: {e}");
                e
            })?);
        }

        log::debug!("opened trace at {:?} ({} thread(s))", dir, header.thread_count);
        Ok(TraceReader {
            dir: dir.to_path_buf(),
            header,
            process_events,
            thread_events,
            thread_functions,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn thread_count(&self) -> u32 {
        self.header.thread_count
    }

    pub fn final_process_time(&self) -> u64 {
        self.header.final_process_time
    }

    pub fn thread_final_time(&self, tid: u32) -> u64 {
        self.header.thread_final_times[(tid - 1) as usize]
    }

    pub fn process_events(&self) -> &TraceStreamReader {
        &self.process_events
    }

    pub fn thread_events(&self, tid: u32) -> &TraceStreamReader {
        &self.thread_events[(tid - 1) as usize]
    }

    pub fn function_table(&self, tid: u32) -> &FunctionTable {
        &self.thread_functions[(tid - 1) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_table_round_trips() {
        let table = FunctionTable {
            records: vec![
                FunctionRecord {
                    function_index: 1,
                    event_start: 0,
                    event_end: 100,
                    thread_entered: 0,
                    thread_exited: 10,
                    child_list: 0,
                },
                FunctionRecord {
                    function_index: 2,
                    event_start: 100,
                    event_end: 200,
                    thread_entered: 3,
                    thread_exited: 8,
                    child_list: 44,
                },
            ],
            top_level_offsets: vec![8],
        };
        let encoded = table.encode();
        let decoded = FunctionTable::decode(&encoded).unwrap();
        assert_eq!(decoded.records, table.records);
        assert_eq!(decoded.top_level_offsets, table.top_level_offsets);
    }
}
