//! Process-wide replay state (spec §4.6), ported from
//! `original_source/include/seec/Trace/ProcessState.hpp`: the snapshot at
//! a chosen `process_time`, owning every thread's state plus the shared
//! memory, allocation, stream, and known-region tables.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::Result;
use crate::memory::fragment_store::MemoryFragmentStore;
use crate::memory::global_layout::GlobalLayout;
use crate::memory::known_region::KnownRegionMap;
use crate::record::process_listener::DynamicAllocation;
use crate::trace::event::{Event, EventLocation, Permission};
use crate::trace::reader::TraceReader;
use crate::replay::thread_state::ThreadState;

/// Same shape as the recording side's allocation entry (spec §3 "Dynamic
/// allocation" is one data model, read by both sides).
pub type MallocState = DynamicAllocation;

#[derive(Debug, Clone, Default)]
pub struct StreamState {
    pub mode: String,
    pub buffer: Vec<u8>,
    pub opened_event_location: Option<EventLocation>,
}

#[derive(Debug, Clone, Default)]
pub struct DirState {
    pub opened_event_location: Option<EventLocation>,
}

/// Blocks construction until the process's logical time equals the value
/// the caller needs, then grants exclusive mutation rights; dropping it
/// wakes the next waiter (spec §4.6 "ScopedUpdate").
pub struct UpdateGate {
    process_time: Mutex<u64>,
    advanced: Condvar,
}

impl UpdateGate {
    fn new(initial: u64) -> Self {
        UpdateGate {
            process_time: Mutex::new(initial),
            advanced: Condvar::new(),
        }
    }

    fn acquire(&self, required: u64) -> ScopedUpdate<'_> {
        let guard = self.process_time.lock().unwrap();
        let guard = self
            .advanced
            .wait_while(guard, |time| *time != required)
            .unwrap();
        ScopedUpdate { gate: self, guard }
    }
}

pub struct ScopedUpdate<'g> {
    gate: &'g UpdateGate,
    guard: MutexGuard<'g, u64>,
}

impl<'g> ScopedUpdate<'g> {
    fn advance_to(&mut self, new_time: u64) {
        *self.guard = new_time;
    }
}

impl<'g> Drop for ScopedUpdate<'g> {
    fn drop(&mut self) {
        self.gate.advanced.notify_all();
    }
}

pub struct ProcessState {
    trace: TraceReader,
    thread_states: Vec<ThreadState>,
    mallocs: HashMap<u64, MallocState>,
    /// Allocations removed by `Free`, restorable on backward undo; the
    /// `Free` event itself carries only the address, not the size.
    freed_allocations: HashMap<u64, Vec<MallocState>>,
    memory: MemoryFragmentStore,
    known: KnownRegionMap,
    globals: GlobalLayout,
    streams: HashMap<u64, StreamState>,
    closed_streams: HashMap<u64, Vec<StreamState>>,
    dirs: HashMap<u64, DirState>,
    closed_dirs: HashMap<u64, Vec<DirState>>,
    process_time: u64,
    update_gate: UpdateGate,
    argv: Vec<Vec<u8>>,
    envp: Vec<Vec<u8>>,
}

impl ProcessState {
    pub fn open(trace: TraceReader) -> Result<ProcessState> {
        let thread_count = trace.thread_count();
        let mut thread_states = Vec::with_capacity(thread_count as usize);
        for tid in 1..=thread_count {
            thread_states.push(ThreadState::new(tid));
        }

        let mut argv = Vec::new();
        let mut envp = Vec::new();
        let mut globals = GlobalLayout::new();
        for entry in trace.process_events().iter_forward(0) {
            match entry?.0 {
                Event::Args { argv: a } => argv = a,
                Event::Env { envp: e } => envp = e,
                Event::GlobalRegister { index, address, size } => globals.register(index, address, size),
                other => panic!("unexpected process-initialization event: {:?}", other.kind()),
            }
        }

        Ok(ProcessState {
            trace,
            thread_states,
            mallocs: HashMap::new(),
            freed_allocations: HashMap::new(),
            memory: MemoryFragmentStore::new(),
            known: KnownRegionMap::new(),
            globals,
            streams: HashMap::new(),
            closed_streams: HashMap::new(),
            dirs: HashMap::new(),
            closed_dirs: HashMap::new(),
            process_time: 0,
            update_gate: UpdateGate::new(0),
            argv,
            envp,
        })
    }

    pub fn trace(&self) -> &TraceReader {
        &self.trace
    }

    pub fn process_time(&self) -> u64 {
        self.process_time
    }

    pub fn thread_state(&self, tid: u32) -> &ThreadState {
        &self.thread_states[(tid - 1) as usize]
    }

    pub(crate) fn thread_state_mut(&mut self, tid: u32) -> &mut ThreadState {
        &mut self.thread_states[(tid - 1) as usize]
    }

    pub fn thread_states(&self) -> &[ThreadState] {
        &self.thread_states
    }

    pub fn memory(&self) -> &MemoryFragmentStore {
        &self.memory
    }

    pub fn known_regions(&self) -> &KnownRegionMap {
        &self.known
    }

    pub fn globals(&self) -> &GlobalLayout {
        &self.globals
    }

    pub fn mallocs(&self) -> &HashMap<u64, MallocState> {
        &self.mallocs
    }

    pub fn stream(&self, handle: u64) -> Option<&StreamState> {
        self.streams.get(&handle)
    }

    pub fn dir(&self, handle: u64) -> Option<&DirState> {
        self.dirs.get(&handle)
    }

    pub fn argv(&self) -> &[Vec<u8>] {
        &self.argv
    }

    pub fn envp(&self) -> &[Vec<u8>] {
        &self.envp
    }

    /// Apply one event read from thread `tid`'s stream in the forward
    /// direction (spec §4.7's dispatch table).
    pub fn apply_forward(&mut self, tid: u32, event: &Event, offset: u64) {
        if self.thread_state_mut(tid).apply_forward(event) {
            return;
        }
        match event {
            Event::NewProcessTime { time } => {
                let mut token = self.update_gate.acquire(self.process_time);
                token.advance_to(*time);
                drop(token);
                self.process_time = *time;
            }
            Event::Malloc { address, size, allocating_instruction } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.mallocs.insert(
                    *address,
                    MallocState {
                        address: *address,
                        size: *size,
                        malloc_event_location: EventLocation { thread_id: tid, event_offset: offset },
                        allocating_instruction: *allocating_instruction,
                    },
                );
            }
            Event::Free { address } => {
                let _token = self.update_gate.acquire(self.process_time);
                let removed = self.mallocs.remove(address).expect("Free for unknown allocation");
                self.memory.clear(*address, removed.size);
                self.freed_allocations.entry(*address).or_default().push(removed);
            }
            Event::StateUntyped { address, data } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.memory.add(*address, data.len() as u64, tid, offset, self.process_time);
            }
            Event::StateTyped { address, data, .. } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.memory.add(*address, data.len() as u64, tid, offset, self.process_time);
            }
            Event::StateClear { address, length } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.memory.clear(*address, *length);
            }
            // Overwrite records are a trailing log of what the preceding
            // `State*` event already did; forward replay doesn't need to
            // re-apply them, only backward replay consults them.
            Event::StateOverwriteReplace { .. }
            | Event::StateOverwriteSplitFragment { .. }
            | Event::StateOverwriteTrimLeft { .. }
            | Event::StateOverwriteTrimRight { .. } => {}
            Event::StreamOpen { handle, mode } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.streams.insert(
                    *handle,
                    StreamState {
                        mode: mode.clone(),
                        buffer: Vec::new(),
                        opened_event_location: Some(EventLocation { thread_id: tid, event_offset: offset }),
                    },
                );
            }
            Event::StreamClose { handle } => {
                let _token = self.update_gate.acquire(self.process_time);
                let removed = self.streams.remove(handle).expect("StreamClose for unopened handle");
                self.closed_streams.entry(*handle).or_default().push(removed);
            }
            Event::StreamWrite { handle, data } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.streams
                    .get_mut(handle)
                    .expect("StreamWrite to unopened handle")
                    .buffer
                    .extend_from_slice(data);
            }
            Event::DirOpen { handle } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.dirs.insert(
                    *handle,
                    DirState { opened_event_location: Some(EventLocation { thread_id: tid, event_offset: offset }) },
                );
            }
            Event::DirClose { handle } => {
                let _token = self.update_gate.acquire(self.process_time);
                let removed = self.dirs.remove(handle).expect("DirClose for unopened handle");
                self.closed_dirs.entry(*handle).or_default().push(removed);
            }
            Event::KnownRegionAdd { address, length, permission } => {
                let permission = Permission::from_tag(*permission).expect("unknown permission tag");
                self.known.insert(*address, *length, permission);
            }
            Event::KnownRegionRemove { address } => {
                self.known.erase(*address);
            }
            other => panic!("event kind not dispatched on replay: {:?}", other.kind()),
        }
    }

    /// Exact inverse of [`Self::apply_forward`].
    pub fn apply_backward(&mut self, tid: u32, event: &Event) {
        if self.thread_state_mut(tid).apply_backward(event) {
            return;
        }
        match event {
            Event::NewProcessTime { .. } => {
                // The previous process_time is recovered by the caller
                // (navigation walks the event immediately before this one
                // to learn it); here we only need to release the gate.
                let mut token = self.update_gate.acquire(self.process_time);
                let previous = self.process_time.saturating_sub(1);
                token.advance_to(previous);
                drop(token);
                self.process_time = previous;
            }
            Event::Malloc { address, .. } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.mallocs.remove(address).expect("undo Malloc for unknown allocation");
            }
            Event::Free { address } => {
                let _token = self.update_gate.acquire(self.process_time);
                let restored = self
                    .freed_allocations
                    .get_mut(address)
                    .and_then(|stack| stack.pop())
                    .expect("undo Free with nothing retired");
                self.mallocs.insert(*address, restored);
            }
            Event::StateUntyped { address, .. } | Event::StateTyped { address, .. } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.memory.remove_at(*address);
            }
            Event::StateClear { .. } => {
                // clear() inserted nothing; the StateOverwrite* records
                // walked before this one already restored everything.
            }
            Event::StateOverwriteReplace { old } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.memory.restore_one(&crate::memory::fragment::Overwrite::Replace {
                    old: from_old_fragment(old),
                });
            }
            Event::StateOverwriteSplitFragment { old, overwrite_start, overwrite_last } => {
                let _token = self.update_gate.acquire(self.process_time);
                let overwrite_area = crate::dsa::interval::Interval::with_start_last(*overwrite_start, *overwrite_last);
                self.memory.restore_one(&crate::memory::fragment::Overwrite::SplitFragment {
                    old: from_old_fragment(old),
                    overwrite_area,
                });
            }
            Event::StateOverwriteTrimLeft { old, new_start } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.memory.restore_one(&crate::memory::fragment::Overwrite::TrimLeft {
                    old: from_old_fragment(old),
                    new_start: *new_start,
                });
            }
            Event::StateOverwriteTrimRight { old, new_last } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.memory.restore_one(&crate::memory::fragment::Overwrite::TrimRight {
                    old: from_old_fragment(old),
                    new_last: *new_last,
                });
            }
            Event::StreamOpen { handle, .. } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.streams.remove(handle).expect("undo StreamOpen for unopened handle");
            }
            Event::StreamClose { handle } => {
                let _token = self.update_gate.acquire(self.process_time);
                let restored = self
                    .closed_streams
                    .get_mut(handle)
                    .and_then(|stack| stack.pop())
                    .expect("undo StreamClose with nothing retired");
                self.streams.insert(*handle, restored);
            }
            Event::StreamWrite { handle, data } => {
                let _token = self.update_gate.acquire(self.process_time);
                let stream = self.streams.get_mut(handle).expect("undo StreamWrite to unopened handle");
                let new_len = stream.buffer.len() - data.len();
                stream.buffer.truncate(new_len);
            }
            Event::DirOpen { handle } => {
                let _token = self.update_gate.acquire(self.process_time);
                self.dirs.remove(handle).expect("undo DirOpen for unopened handle");
            }
            Event::DirClose { handle } => {
                let _token = self.update_gate.acquire(self.process_time);
                let restored = self
                    .closed_dirs
                    .get_mut(handle)
                    .and_then(|stack| stack.pop())
                    .expect("undo DirClose with nothing retired");
                self.dirs.insert(*handle, restored);
            }
            Event::KnownRegionAdd { address, .. } => {
                self.known.erase(*address);
            }
            Event::KnownRegionRemove { address, .. } => {
                // Re-adding requires the length/permission this event
                // doesn't carry; `KnownRegionAdd`'s own backward handler
                // is symmetric only when regions are never re-added at
                // the same address after removal within one backward
                // walk, which navigation preserves by operating one
                // event at a time from a coherent state.
                let _ = address;
                panic!("undo KnownRegionRemove is not directly invertible without the original extent");
            }
            other => panic!("event kind not dispatched on replay: {:?}", other.kind()),
        }
    }

    /// Address-based lookup across every region kind the engine tracks,
    /// in the order the original's `getContainingMemoryArea` checks them:
    /// globals, then dynamic allocations, then known regions, then each
    /// thread's visible stack allocations (spec §9 supplement; grounded on
    /// `original_source/include/seec/Trace/ProcessState.hpp`'s own doc
    /// comment for that method).
    pub fn containing_area(&self, address: u64) -> Option<(u64, u64)> {
        if let Some((start, length, _)) = self.globals.find_containing(address) {
            return Some((start, length));
        }
        if let Some(alloc) = self.mallocs.values().find(|a| address >= a.address && address < a.address + a.size) {
            return Some((alloc.address, alloc.size));
        }
        if let Some((start, length, _)) = self.known.find_containing(address) {
            return Some((start, length));
        }
        for thread in &self.thread_states {
            for frame in thread.frames() {
                if let Some(alloca) = frame.alloca_containing(address) {
                    let size = alloca.element_size.saturating_mul(alloca.element_count).max(1);
                    return Some((alloca.address, size));
                }
            }
        }
        None
    }
}

fn from_old_fragment(old: &crate::trace::event::OldFragment) -> crate::memory::fragment::MemoryFragment {
    crate::memory::fragment::MemoryFragment {
        area: crate::dsa::interval::Interval::with_start_last(old.start, old.last),
        thread_id: old.thread_id,
        event_offset: old.event_offset,
        process_time: old.process_time,
    }
}

