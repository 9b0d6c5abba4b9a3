//! Append-only event streams (spec §2 "Trace storage", spec §4.1).
//!
//! Recording side: [`TraceStreamWriter`] appends framed records to a file
//! (or, for tests, an in-memory buffer) and returns the byte offset each
//! record was written at — callers (the thread/process listeners) stash
//! that offset in other records (e.g. a memory fragment's `event_offset`).
//!
//! Replay side: [`TraceStreamReader`] loads a stream in full (these traces
//! are meant to be walked randomly and backward, so we don't stream them)
//! and exposes `read_at`/`read_before`, matching spec §4.1's bidirectional
//! walk requirement, plus forward/backward iterators built on top.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::trace::codec;
use crate::trace::event::Event;

enum Sink {
    File(BufWriter<File>),
    Memory(Vec<u8>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::File(f) => f.write(buf),
            Sink::Memory(v) => v.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::File(f) => f.flush(),
            Sink::Memory(_) => Ok(()),
        }
    }
}

/// Single append-only stream. One instance exists per traced thread, plus
/// one for the process-wide stream (spec §3 "Trace").
pub struct TraceStreamWriter {
    sink: Sink,
    offset: u64,
}

impl TraceStreamWriter {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(TraceStreamWriter {
            sink: Sink::File(BufWriter::new(file)),
            offset: 0,
        })
    }

    pub fn in_memory() -> Self {
        TraceStreamWriter {
            sink: Sink::Memory(Vec::new()),
            offset: 0,
        }
    }

    /// Append `event`, returning the byte offset at which the record
    /// begins (spec §4.1: "append to the per-thread or process stream,
    /// return the stream offset at which the record begins").
    pub fn append(&mut self, event: &Event) -> std::io::Result<u64> {
        let record = codec::encode(event);
        let start = self.offset;
        self.sink.write_all(&record)?;
        self.offset += record.len() as u64;
        Ok(start)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.sink.flush()
    }

    /// Close the stream, flushing any buffered writes. Used on every exit
    /// path of the recorder, including the synchronized-exit barrier on a
    /// fatal run-time error (spec §5).
    pub fn close(mut self) -> std::io::Result<()> {
        self.flush()
    }

    /// Drain the in-memory buffer. Panics on a file-backed writer; this is
    /// a test convenience for round-tripping writer output into a reader
    /// without touching disk.
    pub fn into_bytes(self) -> Vec<u8> {
        match self.sink {
            Sink::Memory(v) => v,
            Sink::File(_) => panic!("into_bytes() is only valid for an in-memory writer"),
        }
    }
}

/// Random-access reader over a fully-loaded stream (spec §4.1).
pub struct TraceStreamReader {
    data: Vec<u8>,
}

impl TraceStreamReader {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        Ok(TraceStreamReader {
            data: std::fs::read(path)?,
        })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        TraceStreamReader { data }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn read_at(&self, offset: u64) -> Result<(Event, u64)> {
        codec::decode_at(&self.data, offset)
    }

    pub fn read_before(&self, offset: u64) -> Result<(Event, u64)> {
        codec::decode_before(&self.data, offset)
    }

    pub fn iter_forward(&self, from: u64) -> ForwardIter<'_> {
        ForwardIter {
            reader: self,
            offset: from,
        }
    }

    pub fn iter_backward(&self, from: u64) -> BackwardIter<'_> {
        BackwardIter {
            reader: self,
            offset: from,
        }
    }
}

pub struct ForwardIter<'a> {
    reader: &'a TraceStreamReader,
    offset: u64,
}

impl<'a> Iterator for ForwardIter<'a> {
    type Item = Result<(Event, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.reader.len() {
            return None;
        }
        match self.reader.read_at(self.offset) {
            Ok((event, next)) => {
                let start = self.offset;
                self.offset = next;
                Some(Ok((event, start)))
            }
            Err(e) => {
                self.offset = self.reader.len();
                Some(Err(e))
            }
        }
    }
}

pub struct BackwardIter<'a> {
    reader: &'a TraceStreamReader,
    offset: u64,
}

impl<'a> Iterator for BackwardIter<'a> {
    type Item = Result<(Event, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset == 0 {
            return None;
        }
        match self.reader.read_before(self.offset) {
            Ok((event, start)) => {
                self.offset = start;
                Some(Ok((event, start)))
            }
            Err(e) => {
                self.offset = 0;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_offsets_match_reader_walk() {
        let mut writer = TraceStreamWriter::in_memory();
        let o1 = writer.append(&Event::FunctionStart { function_index: 1 }).unwrap();
        let o2 = writer
            .append(&Event::NewThreadTime { time: 5 })
            .unwrap();
        let o3 = writer.append(&Event::FunctionEnd).unwrap();
        assert_eq!(o1, 0);

        let bytes = writer.into_bytes();
        let reader = TraceStreamReader::from_bytes(bytes);

        let forward: Vec<_> = reader
            .iter_forward(0)
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(forward.len(), 3);
        assert_eq!(forward[0].1, o1);
        assert_eq!(forward[1].1, o2);
        assert_eq!(forward[2].1, o3);

        let backward: Vec<_> = reader
            .iter_backward(reader.len())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(backward.len(), 3);
        // Backward walk yields events in reverse order.
        assert_eq!(backward[0].0, Event::FunctionEnd);
        assert_eq!(backward[2].0, Event::FunctionStart { function_index: 1 });
    }
}
