//! Per-thread recording state (spec §4.5), ported from
//! `original_source/include/seec/Trace/TraceThreadListener.hpp`: a thread's
//! own `thread_time`, its in-flight function stack, and the lazily
//! allocated `process_time` for whichever instruction is currently being
//! recorded.
//!
//! `ThreadListener` borrows its [`ProcessListener`] for the listener's
//! whole lifetime and stores the lock guards it's currently holding
//! directly, matching the original's `std::unique_lock` members rather
//! than re-acquiring a lock on every call.

use std::collections::HashMap;
use std::path::Path;
use std::sync::MutexGuard;

use crate::memory::fragment::Overwrite;
use crate::memory::fragment_store::MemoryFragmentStore;
use crate::record::process_listener::{DynamicAllocation, OpenStreamRecord, ProcessListener};
use crate::runtime_error::{RuntimeError, Severity};
use crate::trace::event::{Event, EventLocation, OldFragment, Permission};
use crate::trace::reader::FunctionRecord;
use crate::trace::stream::TraceStreamWriter;

fn to_old_fragment(frag: crate::memory::fragment::MemoryFragment) -> OldFragment {
    OldFragment {
        start: frag.area.start(),
        last: frag.area.last(),
        thread_id: frag.thread_id,
        event_offset: frag.event_offset,
        process_time: frag.process_time,
    }
}

struct InFlightFrame {
    function_index: u32,
    event_start_offset: u64,
    thread_entered: u64,
}

pub struct ThreadListener<'p> {
    process: &'p ProcessListener,
    tid: u32,
    thread_time: u64,
    /// Cleared on every `increment_thread_time`; set the first time the
    /// current instruction touches process-owned shared state (spec §4.4
    /// "allocates a fresh process_time ... on the first shared-state
    /// mutation of the current instruction").
    current_instruction_process_time: Option<u64>,
    stack: Vec<InFlightFrame>,
    completed_functions: Vec<FunctionRecord>,
    top_level_offsets: Vec<u64>,
    events: TraceStreamWriter,
    memory_lock: Option<MutexGuard<'p, MemoryFragmentStore>>,
    dynamic_memory_lock: Option<MutexGuard<'p, HashMap<u64, DynamicAllocation>>>,
    streams_lock: Option<MutexGuard<'p, HashMap<u64, OpenStreamRecord>>>,
}

impl<'p> ThreadListener<'p> {
    pub fn create(process: &'p ProcessListener, tid: u32, events_path: &Path) -> std::io::Result<Self> {
        process.synchronized_exit().register();
        Ok(ThreadListener {
            process,
            tid,
            thread_time: 0,
            current_instruction_process_time: None,
            stack: Vec::new(),
            completed_functions: Vec::new(),
            top_level_offsets: Vec::new(),
            events: TraceStreamWriter::create(events_path)?,
            memory_lock: None,
            dynamic_memory_lock: None,
            streams_lock: None,
        })
    }

    #[cfg(test)]
    pub fn in_memory(process: &'p ProcessListener, tid: u32) -> Self {
        process.synchronized_exit().register();
        ThreadListener {
            process,
            tid,
            thread_time: 0,
            current_instruction_process_time: None,
            stack: Vec::new(),
            completed_functions: Vec::new(),
            top_level_offsets: Vec::new(),
            events: TraceStreamWriter::in_memory(),
            memory_lock: None,
            dynamic_memory_lock: None,
            streams_lock: None,
        }
    }

    pub fn tid(&self) -> u32 {
        self.tid
    }

    pub fn thread_time(&self) -> u64 {
        self.thread_time
    }

    fn write_event(&mut self, event: Event) -> u64 {
        self.events.append(&event).expect("event stream write failed")
    }

    /// Advance local time and emit `NewThreadTime` (spec §4.5). Called at
    /// the start of every newly observed instruction.
    pub fn increment_thread_time(&mut self) -> u64 {
        self.thread_time += 1;
        self.current_instruction_process_time = None;
        self.write_event(Event::NewThreadTime { time: self.thread_time });
        self.thread_time
    }

    pub fn enter_notification(&mut self) {
        self.increment_thread_time();
    }

    /// Release every lock this thread is holding. Called both at the
    /// normal end of an instruction and, on a fatal run-time error,
    /// before the thread exits (spec §5: locks must be released on every
    /// exit path).
    pub fn exit_notification(&mut self) {
        self.streams_lock = None;
        self.dynamic_memory_lock = None;
        self.memory_lock = None;
    }

    /// Lazily assign this instruction's `process_time`, emitting
    /// `NewProcessTime` the first time it's needed (spec §4.4/§4.5).
    fn current_process_time(&mut self) -> u64 {
        if let Some(time) = self.current_instruction_process_time {
            return time;
        }
        let time = self.process.new_time();
        self.current_instruction_process_time = Some(time);
        self.write_event(Event::NewProcessTime { time });
        time
    }

    fn acquire_memory_lock(&mut self) {
        if self.memory_lock.is_none() {
            self.memory_lock = Some(self.process.lock_memory());
        }
    }

    fn acquire_dynamic_memory_lock(&mut self) {
        if self.dynamic_memory_lock.is_none() {
            self.dynamic_memory_lock = Some(self.process.lock_dynamic_memory());
        }
    }

    fn acquire_streams_lock(&mut self) {
        if self.streams_lock.is_none() {
            self.streams_lock = Some(self.process.lock_streams());
        }
    }

    fn emit_overwrites(&mut self, overwritten: Vec<Overwrite>) {
        for ow in overwritten {
            let event = match ow {
                Overwrite::Replace { old } => Event::StateOverwriteReplace { old: to_old_fragment(old) },
                Overwrite::SplitFragment { old, overwrite_area } => Event::StateOverwriteSplitFragment {
                    old: to_old_fragment(old),
                    overwrite_start: overwrite_area.start(),
                    overwrite_last: overwrite_area.last(),
                },
                Overwrite::TrimLeft { old, new_start } => {
                    Event::StateOverwriteTrimLeft { old: to_old_fragment(old), new_start }
                }
                Overwrite::TrimRight { old, new_last } => {
                    Event::StateOverwriteTrimRight { old: to_old_fragment(old), new_last }
                }
            };
            self.write_event(event);
        }
    }

    pub fn notify_function_begin(&mut self, function_index: u32) {
        let offset = self.write_event(Event::FunctionStart { function_index });
        self.stack.push(InFlightFrame {
            function_index,
            event_start_offset: offset,
            thread_entered: self.thread_time,
        });
    }

    pub fn notify_function_end(&mut self, function_index: u32) {
        let frame = self.stack.pop().expect("FunctionEnd with no matching FunctionStart");
        debug_assert_eq!(frame.function_index, function_index);
        let offset = self.write_event(Event::FunctionEnd);
        let record_offset = self.completed_functions.len() as u64;
        if self.stack.is_empty() {
            self.top_level_offsets.push(record_offset);
        }
        self.completed_functions.push(FunctionRecord {
            function_index: frame.function_index,
            event_start: frame.event_start_offset,
            event_end: offset,
            thread_entered: frame.thread_entered,
            thread_exited: self.thread_time,
            child_list: 0,
        });
    }

    pub fn notify_pre_instruction(&mut self, instruction_index: u32) {
        self.write_event(Event::PreInstruction { instruction_index });
    }

    pub fn notify_instruction(&mut self, instruction_index: u32) {
        self.write_event(Event::Instruction { instruction_index });
    }

    pub fn notify_value_i8(&mut self, instruction_index: u32, value: i8) {
        self.write_event(Event::InstructionWithI8 { instruction_index, value });
    }

    pub fn notify_value_i16(&mut self, instruction_index: u32, value: i16) {
        self.write_event(Event::InstructionWithI16 { instruction_index, value });
    }

    pub fn notify_value_i32(&mut self, instruction_index: u32, value: i32) {
        self.write_event(Event::InstructionWithI32 { instruction_index, value });
    }

    pub fn notify_value_i64(&mut self, instruction_index: u32, value: i64) {
        self.write_event(Event::InstructionWithI64 { instruction_index, value });
    }

    pub fn notify_value_f32(&mut self, instruction_index: u32, value: f32) {
        self.write_event(Event::InstructionWithF32 { instruction_index, value });
    }

    pub fn notify_value_f64(&mut self, instruction_index: u32, value: f64) {
        self.write_event(Event::InstructionWithF64 { instruction_index, value });
    }

    pub fn notify_value_ptr(&mut self, instruction_index: u32, value: u64) {
        self.write_event(Event::InstructionWithPtr { instruction_index, value });
    }

    pub fn notify_alloca(&mut self, instruction_index: u32, address: u64, element_size: u64, element_count: u64) {
        self.write_event(Event::Alloca { instruction_index, address, element_size, element_count });
    }

    pub fn notify_byval_arg_begin(&mut self, address: u64, size: u64) {
        self.write_event(Event::ByValArgBegin { address, size });
    }

    pub fn notify_byval_arg_end(&mut self, address: u64) {
        self.write_event(Event::ByValArgEnd { address });
    }

    pub fn notify_malloc(&mut self, address: u64, size: u64, allocating_instruction: u32) {
        self.current_process_time();
        self.acquire_dynamic_memory_lock();
        let offset = self.write_event(Event::Malloc { address, size, allocating_instruction });
        self.dynamic_memory_lock.as_mut().unwrap().insert(
            address,
            DynamicAllocation {
                address,
                size,
                malloc_event_location: EventLocation { thread_id: self.tid, event_offset: offset },
                allocating_instruction,
            },
        );
    }

    /// Free a dynamic allocation, clearing whatever memory fragments it
    /// still covers (spec §4.2/§4.5; mirrors `recordFreeAndClear` in
    /// `original_source/include/seec/Trace/TraceThreadListener.hpp`).
    pub fn notify_free(&mut self, address: u64) {
        self.current_process_time();
        self.acquire_memory_lock();
        self.acquire_dynamic_memory_lock();
        let freed = self.dynamic_memory_lock.as_mut().unwrap().remove(&address);
        self.write_event(Event::Free { address });
        if let Some(allocation) = freed {
            let overwritten = self.memory_lock.as_mut().unwrap().clear(address, allocation.size);
            self.emit_overwrites(overwritten);
        }
    }

    pub fn notify_state_untyped(&mut self, address: u64, data: &[u8]) {
        let time = self.current_process_time();
        self.acquire_memory_lock();
        let offset = self.write_event(Event::StateUntyped { address, data: data.to_vec() });
        let overwritten = self
            .memory_lock
            .as_mut()
            .unwrap()
            .add(address, data.len() as u64, self.tid, offset, time);
        self.emit_overwrites(overwritten);
    }

    pub fn notify_state_typed(&mut self, address: u64, data: &[u8], value_descriptor_offset: u64) {
        let time = self.current_process_time();
        self.acquire_memory_lock();
        let offset = self.write_event(Event::StateTyped {
            address,
            data: data.to_vec(),
            value_descriptor_offset,
        });
        let overwritten = self
            .memory_lock
            .as_mut()
            .unwrap()
            .add(address, data.len() as u64, self.tid, offset, time);
        self.emit_overwrites(overwritten);
    }

    pub fn notify_state_clear(&mut self, address: u64, length: u64) {
        self.current_process_time();
        self.acquire_memory_lock();
        self.write_event(Event::StateClear { address, length });
        let overwritten = self.memory_lock.as_mut().unwrap().clear(address, length);
        self.emit_overwrites(overwritten);
    }

    pub fn notify_stream_open(&mut self, handle: u64, mode: &str) {
        self.acquire_streams_lock();
        let offset = self.write_event(Event::StreamOpen { handle, mode: mode.to_string() });
        self.streams_lock.as_mut().unwrap().insert(
            handle,
            OpenStreamRecord {
                opened_event_location: EventLocation { thread_id: self.tid, event_offset: offset },
            },
        );
    }

    pub fn notify_stream_close(&mut self, handle: u64) {
        self.acquire_streams_lock();
        self.streams_lock.as_mut().unwrap().remove(&handle);
        self.write_event(Event::StreamClose { handle });
    }

    pub fn notify_stream_write(&mut self, handle: u64, data: &[u8]) {
        self.acquire_streams_lock();
        self.write_event(Event::StreamWrite { handle, data: data.to_vec() });
    }

    pub fn notify_dir_open(&mut self, handle: u64) {
        self.acquire_streams_lock();
        self.write_event(Event::DirOpen { handle });
    }

    pub fn notify_dir_close(&mut self, handle: u64) {
        self.acquire_streams_lock();
        self.write_event(Event::DirClose { handle });
    }

    pub fn notify_known_region_add(&mut self, address: u64, length: u64, permission: Permission) {
        self.acquire_memory_lock();
        self.write_event(Event::KnownRegionAdd { address, length, permission: permission.bits() });
    }

    pub fn notify_known_region_remove(&mut self, address: u64) {
        self.acquire_memory_lock();
        self.write_event(Event::KnownRegionRemove { address });
    }

    /// Record a run-time error observed in the traced program. A fatal
    /// error releases this thread's locks and asks every other thread to
    /// exit before returning (spec §5, §7.2).
    pub fn handle_run_error(&mut self, instruction_index: u32, error: &RuntimeError) {
        self.write_event(Event::RuntimeError {
            instruction_index,
            severity: error.severity_byte(),
            payload: error.encode_payload(),
        });
        if error.severity == Severity::Fatal {
            log::error!("fatal run-time error on thread {} at instruction {instruction_index}: {:?}", self.tid, error.kind);
            self.exit_notification();
            self.events.flush().ok();
            self.process.synchronized_exit().request();
        }
    }

    /// Flush and close this thread's event stream, unregistering from the
    /// synchronized-exit barrier, and hand back the data needed to write
    /// its `.functions` file (spec §6).
    pub fn finish(mut self) -> std::io::Result<(Vec<FunctionRecord>, Vec<u64>)> {
        self.exit_notification();
        self.events.flush()?;
        self.process.synchronized_exit().unregister();
        Ok((self.completed_functions, self.top_level_offsets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::stream::TraceStreamWriter;

    #[test]
    fn malloc_then_free_clears_the_fragment_it_wrote() {
        let process = ProcessListener::new(TraceStreamWriter::in_memory());
        let mut thread = ThreadListener::in_memory(&process, 1);
        thread.enter_notification();
        thread.notify_malloc(0x1000, 16, 7);
        thread.notify_state_untyped(0x1000, &[1, 2, 3, 4]);
        thread.exit_notification();
        assert!(process.lock_memory().contains_known(0x1000, 4));

        thread.enter_notification();
        thread.notify_free(0x1000);
        thread.exit_notification();
        assert!(!process.lock_memory().contains_known(0x1000, 4));
        thread.finish().unwrap();
    }

    #[test]
    fn function_begin_and_end_produce_a_record() {
        let process = ProcessListener::new(TraceStreamWriter::in_memory());
        let mut thread = ThreadListener::in_memory(&process, 1);
        thread.notify_function_begin(3);
        thread.notify_function_end(3);
        let (records, top_level) = thread.finish().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].function_index, 3);
        assert_eq!(top_level, vec![0]);
    }

    #[test]
    fn fatal_error_releases_locks_and_requests_synchronized_exit() {
        let process = ProcessListener::new(TraceStreamWriter::in_memory());
        let mut thread = ThreadListener::in_memory(&process, 1);
        thread.notify_known_region_add(0x7000, 32, Permission::READ);
        assert!(thread.memory_lock.is_some());

        let error = RuntimeError::new(
            crate::runtime_error::RuntimeErrorKind::InvalidPointer { address: 0 },
            Severity::Fatal,
            true,
        );
        thread.handle_run_error(5, &error);
        assert!(thread.memory_lock.is_none());
        assert!(process.synchronized_exit().is_requested());
    }
}
