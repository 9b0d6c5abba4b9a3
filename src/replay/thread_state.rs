//! Per-thread replay state and function stack (spec §4.7), ported from
//! `original_source/include/seec/Trace/FunctionState.hpp`'s frame layout.
//!
//! Forward dispatch mutates the live stack directly. Backward dispatch is
//! the exact inverse: every mutation that isn't simply invertible from its
//! own fields (the active-instruction index, a frame's runtime value at a
//! given instruction, a byval area's size) pushes what it displaced onto a
//! small per-frame shadow stack, so undoing it is a pop rather than a
//! re-derivation (spec §4.7, §9 "current-instruction process time cache").

use std::collections::HashMap;

use crate::runtime_error::RuntimeError;
use crate::trace::event::Event;

/// One instruction's recorded runtime value. The engine does not interpret
/// these beyond storing and handing them back; `F80` keeps its raw bytes
/// since the engine never computes with x87 extended values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    F80([u8; 10]),
    Ptr(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocaRecord {
    pub instruction_index: u32,
    pub address: u64,
    pub element_size: u64,
    pub element_count: u64,
}

/// One live call frame (spec §3 "Function frame (replay)").
#[derive(Debug, Default)]
pub struct FunctionFrame {
    pub function_index: u32,
    pub active_instruction_index: Option<u32>,
    pub runtime_values: HashMap<u32, RuntimeValue>,
    pub allocas: Vec<AllocaRecord>,
    pub byval_areas: Vec<(u64, u64)>,
    pub runtime_errors: Vec<RuntimeError>,
    /// Shadow of `active_instruction_index` before each change made by
    /// `PreInstruction`, `Instruction`, or the clearing done at
    /// `NewThreadTime`; popped on backward undo of whichever caused it.
    active_index_shadow: Vec<Option<u32>>,
    /// Shadow of each instruction's value before it was overwritten, keyed
    /// by instruction index.
    value_shadow: HashMap<u32, Vec<Option<RuntimeValue>>>,
    /// Byval areas removed by `ByValArgEnd`, restorable on backward undo
    /// (the `ByValArgEnd` event itself only carries the address, not the
    /// size needed to restore the area).
    retired_byval: Vec<(u64, u64)>,
}

impl FunctionFrame {
    fn new(function_index: u32) -> Self {
        FunctionFrame {
            function_index,
            ..Default::default()
        }
    }

    /// Spec §4.7: "if `active_instruction` is set and `k > active`, report
    /// no value; otherwise report `runtime_values[k]`".
    pub fn current_value(&self, instruction_index: u32) -> Option<&RuntimeValue> {
        if let Some(active) = self.active_instruction_index {
            if instruction_index > active {
                return None;
            }
        }
        self.runtime_values.get(&instruction_index)
    }

    pub fn visible_allocas(&self) -> &[AllocaRecord] {
        &self.allocas
    }

    pub fn alloca_containing(&self, address: u64) -> Option<&AllocaRecord> {
        self.allocas.iter().rev().find(|a| {
            let size = a.element_size.saturating_mul(a.element_count).max(1);
            address >= a.address && address < a.address + size
        })
    }

    fn set_active(&mut self, index: Option<u32>) {
        self.active_index_shadow.push(self.active_instruction_index);
        self.active_instruction_index = index;
    }

    fn undo_active(&mut self) {
        self.active_instruction_index = self
            .active_index_shadow
            .pop()
            .expect("active-instruction shadow underflow");
    }

    fn set_value(&mut self, instruction_index: u32, value: RuntimeValue) {
        let previous = self.runtime_values.get(&instruction_index).copied();
        self.value_shadow.entry(instruction_index).or_default().push(previous);
        self.runtime_values.insert(instruction_index, value);
        self.set_active(Some(instruction_index));
    }

    fn undo_value(&mut self, instruction_index: u32) {
        self.undo_active();
        let previous = self
            .value_shadow
            .get_mut(&instruction_index)
            .and_then(|stack| stack.pop())
            .expect("value shadow underflow");
        match previous {
            Some(value) => {
                self.runtime_values.insert(instruction_index, value);
            }
            None => {
                self.runtime_values.remove(&instruction_index);
            }
        }
    }
}

pub struct ThreadState {
    tid: u32,
    cursor_offset: u64,
    thread_time: u64,
    thread_time_shadow: Vec<u64>,
    frames: Vec<FunctionFrame>,
    retired_frames: Vec<FunctionFrame>,
}

impl ThreadState {
    pub fn new(tid: u32) -> Self {
        ThreadState {
            tid,
            cursor_offset: 0,
            thread_time: 0,
            thread_time_shadow: Vec::new(),
            frames: Vec::new(),
            retired_frames: Vec::new(),
        }
    }

    pub fn tid(&self) -> u32 {
        self.tid
    }

    pub fn cursor_offset(&self) -> u64 {
        self.cursor_offset
    }

    pub fn set_cursor_offset(&mut self, offset: u64) {
        self.cursor_offset = offset;
    }

    pub fn thread_time(&self) -> u64 {
        self.thread_time
    }

    pub fn top_frame(&self) -> Option<&FunctionFrame> {
        self.frames.last()
    }

    pub fn frames(&self) -> &[FunctionFrame] {
        &self.frames
    }

    fn top_frame_mut(&mut self) -> &mut FunctionFrame {
        self.frames.last_mut().expect("no active function frame")
    }

    /// True if this event kind is handled entirely here (thread-local
    /// frame/clock state); process-level events return `false` so the
    /// caller (`ProcessState`) knows to handle them instead.
    pub fn apply_forward(&mut self, event: &Event) -> bool {
        match event {
            Event::FunctionStart { function_index } => {
                self.frames.push(FunctionFrame::new(*function_index));
                true
            }
            Event::FunctionEnd => {
                let frame = self.frames.pop().expect("FunctionEnd with no open frame");
                self.retired_frames.push(frame);
                true
            }
            Event::NewThreadTime { time } => {
                self.thread_time_shadow.push(self.thread_time);
                self.thread_time = *time;
                if let Some(frame) = self.frames.last_mut() {
                    frame.set_active(None);
                }
                true
            }
            Event::PreInstruction { instruction_index } | Event::Instruction { instruction_index } => {
                self.top_frame_mut().set_active(Some(*instruction_index));
                true
            }
            Event::InstructionWithI8 { instruction_index, value } => {
                self.top_frame_mut().set_value(*instruction_index, RuntimeValue::I8(*value));
                true
            }
            Event::InstructionWithI16 { instruction_index, value } => {
                self.top_frame_mut().set_value(*instruction_index, RuntimeValue::I16(*value));
                true
            }
            Event::InstructionWithI32 { instruction_index, value } => {
                self.top_frame_mut().set_value(*instruction_index, RuntimeValue::I32(*value));
                true
            }
            Event::InstructionWithI64 { instruction_index, value } => {
                self.top_frame_mut().set_value(*instruction_index, RuntimeValue::I64(*value));
                true
            }
            Event::InstructionWithF32 { instruction_index, value } => {
                self.top_frame_mut().set_value(*instruction_index, RuntimeValue::F32(*value));
                true
            }
            Event::InstructionWithF64 { instruction_index, value } => {
                self.top_frame_mut().set_value(*instruction_index, RuntimeValue::F64(*value));
                true
            }
            Event::InstructionWithF80 { instruction_index, value } => {
                self.top_frame_mut().set_value(*instruction_index, RuntimeValue::F80(*value));
                true
            }
            Event::InstructionWithPtr { instruction_index, value } => {
                self.top_frame_mut().set_value(*instruction_index, RuntimeValue::Ptr(*value));
                true
            }
            Event::Alloca { instruction_index, address, element_size, element_count } => {
                self.top_frame_mut().allocas.push(AllocaRecord {
                    instruction_index: *instruction_index,
                    address: *address,
                    element_size: *element_size,
                    element_count: *element_count,
                });
                true
            }
            Event::ByValArgBegin { address, size } => {
                self.top_frame_mut().byval_areas.push((*address, *size));
                true
            }
            Event::ByValArgEnd { address } => {
                let frame = self.top_frame_mut();
                let position = frame
                    .byval_areas
                    .iter()
                    .rposition(|(a, _)| a == address)
                    .expect("ByValArgEnd for an area never begun");
                let removed = frame.byval_areas.remove(position);
                frame.retired_byval.push(removed);
                true
            }
            Event::RuntimeError { payload, severity, .. } => {
                let severity = crate::runtime_error::RuntimeError::severity_from_byte(*severity)
                    .expect("unknown severity byte");
                let error = crate::runtime_error::RuntimeError::decode_payload(payload, severity)
                    .expect("malformed runtime error payload");
                self.top_frame_mut().runtime_errors.push(error);
                true
            }
            _ => false,
        }
    }

    /// Exact inverse of [`Self::apply_forward`] for the same event.
    pub fn apply_backward(&mut self, event: &Event) -> bool {
        match event {
            Event::FunctionStart { .. } => {
                self.frames.pop().expect("undo FunctionStart with no frame");
                true
            }
            Event::FunctionEnd => {
                let frame = self.retired_frames.pop().expect("undo FunctionEnd with nothing retired");
                self.frames.push(frame);
                true
            }
            Event::NewThreadTime { .. } => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.undo_active();
                }
                self.thread_time = self
                    .thread_time_shadow
                    .pop()
                    .expect("thread-time shadow underflow");
                true
            }
            Event::PreInstruction { .. } | Event::Instruction { .. } => {
                self.top_frame_mut().undo_active();
                true
            }
            Event::InstructionWithI8 { instruction_index, .. }
            | Event::InstructionWithI16 { instruction_index, .. }
            | Event::InstructionWithI32 { instruction_index, .. }
            | Event::InstructionWithI64 { instruction_index, .. }
            | Event::InstructionWithF32 { instruction_index, .. }
            | Event::InstructionWithF64 { instruction_index, .. }
            | Event::InstructionWithF80 { instruction_index, .. }
            | Event::InstructionWithPtr { instruction_index, .. } => {
                self.top_frame_mut().undo_value(*instruction_index);
                true
            }
            Event::Alloca { .. } => {
                self.top_frame_mut().allocas.pop().expect("undo Alloca with none pushed");
                true
            }
            Event::ByValArgBegin { .. } => {
                self.top_frame_mut().byval_areas.pop().expect("undo ByValArgBegin with none pushed");
                true
            }
            Event::ByValArgEnd { .. } => {
                let frame = self.top_frame_mut();
                let restored = frame.retired_byval.pop().expect("undo ByValArgEnd with nothing retired");
                frame.byval_areas.push(restored);
                true
            }
            Event::RuntimeError { .. } => {
                self.top_frame_mut().runtime_errors.pop().expect("undo RuntimeError with none recorded");
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_value_round_trips_through_forward_and_backward() {
        let mut thread = ThreadState::new(1);
        thread.apply_forward(&Event::FunctionStart { function_index: 0 });
        thread.apply_forward(&Event::InstructionWithI32 { instruction_index: 2, value: 42 });
        assert_eq!(
            thread.top_frame().unwrap().current_value(2),
            Some(&RuntimeValue::I32(42))
        );

        thread.apply_backward(&Event::InstructionWithI32 { instruction_index: 2, value: 42 });
        assert_eq!(thread.top_frame().unwrap().current_value(2), None);
        assert_eq!(thread.top_frame().unwrap().active_instruction_index, None);
    }

    #[test]
    fn active_instruction_masks_later_values() {
        let mut thread = ThreadState::new(1);
        thread.apply_forward(&Event::FunctionStart { function_index: 0 });
        thread.apply_forward(&Event::InstructionWithI32 { instruction_index: 0, value: 1 });
        thread.apply_forward(&Event::InstructionWithI32 { instruction_index: 1, value: 2 });
        thread.apply_forward(&Event::PreInstruction { instruction_index: 2 });

        let frame = thread.top_frame().unwrap();
        assert_eq!(frame.current_value(0), Some(&RuntimeValue::I32(1)));
        assert_eq!(frame.current_value(1), Some(&RuntimeValue::I32(2)));
        assert_eq!(frame.current_value(5), None);
    }

    #[test]
    fn function_start_and_end_round_trip() {
        let mut thread = ThreadState::new(1);
        thread.apply_forward(&Event::FunctionStart { function_index: 7 });
        thread.apply_forward(&Event::FunctionEnd);
        assert!(thread.top_frame().is_none());

        thread.apply_backward(&Event::FunctionEnd);
        assert_eq!(thread.top_frame().unwrap().function_index, 7);
        thread.apply_backward(&Event::FunctionStart { function_index: 7 });
        assert!(thread.top_frame().is_none());
    }
}
