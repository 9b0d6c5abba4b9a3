//! `seec-trace info` — dump a trace's header as JSON (spec §6's on-disk
//! layout): one struct built from the trace directory, serialized with
//! `serde_json` and printed.

use std::io;
use std::path::PathBuf;

use serde::Serialize;

use crate::commands::SeecCommand;
use crate::trace::reader::TraceReader;

pub struct TraceInfoCommand {
    trace_dir: PathBuf,
}

impl TraceInfoCommand {
    pub fn new(trace_dir: PathBuf) -> TraceInfoCommand {
        TraceInfoCommand { trace_dir }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TraceInfo {
    thread_count: u32,
    final_process_time: u64,
    thread_final_times: Vec<u64>,
    process_event_bytes: u64,
    thread_event_bytes: Vec<u64>,
    argv: Vec<String>,
}

impl SeecCommand for TraceInfoCommand {
    fn run(&mut self) -> io::Result<()> {
        let trace = TraceReader::open(&self.trace_dir)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

        let thread_count = trace.thread_count();
        let final_process_time = trace.final_process_time();
        let thread_final_times = (1..=thread_count).map(|tid| trace.thread_final_time(tid)).collect();
        let thread_event_bytes = (1..=thread_count).map(|tid| trace.thread_events(tid).len()).collect();
        let process_event_bytes = trace.process_events().len();

        let argv = crate::replay::ProcessState::open(trace)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?
            .argv()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect();

        let info = TraceInfo {
            thread_count,
            final_process_time,
            thread_final_times,
            process_event_bytes,
            thread_event_bytes,
            argv,
        };

        let serialized = serde_json::to_string_pretty(&info).expect("TraceInfo always serializes");
        println!("{}", serialized);
        Ok(())
    }
}
