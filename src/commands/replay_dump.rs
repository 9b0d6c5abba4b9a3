//! `seec-trace dump` — print one line per event, in stream order, for a
//! trace directory. Grounded on the raw-events mode (`-R`) of
//! `original_source/tools/seec-trace-print/main.cpp`, without that tool's
//! Clang-mapped source-level rendering (`-C`/`-G`), which depends on the
//! compiler-front-end collaborator this engine treats as out of scope.

use std::io;
use std::path::PathBuf;

use crate::commands::SeecCommand;
use crate::trace::reader::TraceReader;

pub struct ReplayDumpCommand {
    trace_dir: PathBuf,
}

impl ReplayDumpCommand {
    pub fn new(trace_dir: PathBuf) -> ReplayDumpCommand {
        ReplayDumpCommand { trace_dir }
    }
}

impl SeecCommand for ReplayDumpCommand {
    fn run(&mut self) -> io::Result<()> {
        let trace = TraceReader::open(&self.trace_dir)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        println!("= process.events =");
        for entry in trace.process_events().iter_forward(0) {
            let (event, offset) = entry.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            println!("  @{offset}: {:?}", event);
        }

        for tid in 1..=trace.thread_count() {
            println!("= thread.{tid}.events =");
            for entry in trace.thread_events(tid).iter_forward(0) {
                let (event, offset) =
                    entry.map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
                println!("  @{offset}: {:?}", event);
            }
        }

        Ok(())
    }
}
