//! Event records (spec §3, "Event record") and the compile-time schema
//! table (spec §4.1: "a compile-time table of event kinds, each mapping to
//! a fixed field layout").
//!
//! Every kind either has a fixed encoded length, or is variable-length and
//! suffixes its own length so a reverse scan can recover the start offset
//! without re-parsing forward (spec §9's resolved open question: "recommended:
//! length-suffix on every variable record").

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Permission bits for a tracked-but-unowned memory region (spec §3
    /// "Known region"). A plain enum would lose `READ | WRITE`, which is
    /// the common case for a region the traced program can both read and
    /// write through (e.g. a `getenv` buffer).
    pub struct Permission: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

impl Permission {
    pub fn from_tag(tag: u8) -> Option<Self> {
        Permission::from_bits(tag)
    }
}

/// A location within a trace: which thread's stream, and the byte offset
/// of the record within it. Used to point back at the record that created
/// a piece of process-owned bookkeeping (e.g. a dynamic allocation's
/// `Malloc` record) without duplicating its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLocation {
    pub thread_id: u32,
    pub event_offset: u64,
}

/// A single displaced fragment, as carried by a `StateOverwrite*` record.
/// Fields mirror [`crate::memory::fragment::MemoryFragment`] exactly so the
/// record alone is sufficient to reconstruct the fragment it displaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OldFragment {
    pub start: u64,
    pub last: u64,
    pub thread_id: u32,
    pub event_offset: u64,
    pub process_time: u64,
}

/// Tagged variant over the closed set of event kinds (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    FunctionStart {
        function_index: u32,
    },
    FunctionEnd,
    NewThreadTime {
        time: u64,
    },
    NewProcessTime {
        time: u64,
    },
    PreInstruction {
        instruction_index: u32,
    },
    Instruction {
        instruction_index: u32,
    },
    InstructionWithI8 {
        instruction_index: u32,
        value: i8,
    },
    InstructionWithI16 {
        instruction_index: u32,
        value: i16,
    },
    InstructionWithI32 {
        instruction_index: u32,
        value: i32,
    },
    InstructionWithI64 {
        instruction_index: u32,
        value: i64,
    },
    InstructionWithF32 {
        instruction_index: u32,
        value: f32,
    },
    InstructionWithF64 {
        instruction_index: u32,
        value: f64,
    },
    /// 80-bit x87 extended precision, stored as its raw bytes; the engine
    /// does not interpret the bit pattern.
    InstructionWithF80 {
        instruction_index: u32,
        value: [u8; 10],
    },
    InstructionWithPtr {
        instruction_index: u32,
        value: u64,
    },
    Alloca {
        instruction_index: u32,
        address: u64,
        element_size: u64,
        element_count: u64,
    },
    ByValArgBegin {
        address: u64,
        size: u64,
    },
    ByValArgEnd {
        address: u64,
    },
    Malloc {
        address: u64,
        size: u64,
        allocating_instruction: u32,
    },
    Free {
        address: u64,
    },
    StateUntyped {
        address: u64,
        data: Vec<u8>,
    },
    StateTyped {
        address: u64,
        data: Vec<u8>,
        /// Offset of the typed-value descriptor elsewhere in the trace.
        value_descriptor_offset: u64,
    },
    StateClear {
        address: u64,
        length: u64,
    },
    StateOverwriteReplace {
        old: OldFragment,
    },
    StateOverwriteSplitFragment {
        old: OldFragment,
        overwrite_start: u64,
        overwrite_last: u64,
    },
    StateOverwriteTrimLeft {
        old: OldFragment,
        new_start: u64,
    },
    StateOverwriteTrimRight {
        old: OldFragment,
        new_last: u64,
    },
    StreamOpen {
        handle: u64,
        mode: String,
    },
    StreamClose {
        handle: u64,
    },
    StreamWrite {
        handle: u64,
        data: Vec<u8>,
    },
    DirOpen {
        handle: u64,
    },
    DirClose {
        handle: u64,
    },
    RuntimeError {
        instruction_index: u32,
        severity: u8,
        payload: Vec<u8>,
    },
    KnownRegionAdd {
        address: u64,
        length: u64,
        permission: u8,
    },
    KnownRegionRemove {
        address: u64,
    },
    Args {
        argv: Vec<Vec<u8>>,
    },
    Env {
        envp: Vec<Vec<u8>>,
    },
    /// Binds a compiled module's global variable to its runtime address and
    /// size, so replay can classify addresses that fall inside it (spec §9
    /// supplement, "`getContainingMemoryArea` search order"). Written to the
    /// process-wide stream alongside `Args`/`Env`, before any thread's first
    /// event.
    GlobalRegister {
        index: u32,
        address: u64,
        size: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventKind {
    FunctionStart = 0,
    FunctionEnd = 1,
    NewThreadTime = 2,
    NewProcessTime = 3,
    PreInstruction = 4,
    Instruction = 5,
    InstructionWithI8 = 6,
    InstructionWithI16 = 7,
    InstructionWithI32 = 8,
    InstructionWithI64 = 9,
    InstructionWithF32 = 10,
    InstructionWithF64 = 11,
    InstructionWithF80 = 12,
    InstructionWithPtr = 13,
    Alloca = 14,
    ByValArgBegin = 15,
    ByValArgEnd = 16,
    Malloc = 17,
    Free = 18,
    StateUntyped = 19,
    StateTyped = 20,
    StateClear = 21,
    StateOverwriteReplace = 22,
    StateOverwriteSplitFragment = 23,
    StateOverwriteTrimLeft = 24,
    StateOverwriteTrimRight = 25,
    StreamOpen = 26,
    StreamClose = 27,
    StreamWrite = 28,
    DirOpen = 29,
    DirClose = 30,
    RuntimeError = 31,
    KnownRegionAdd = 32,
    KnownRegionRemove = 33,
    Args = 34,
    Env = 35,
    GlobalRegister = 36,
}

impl EventKind {
    pub fn from_tag(tag: u8) -> Option<EventKind> {
        use EventKind::*;
        const ALL: &[EventKind] = &[
            FunctionStart,
            FunctionEnd,
            NewThreadTime,
            NewProcessTime,
            PreInstruction,
            Instruction,
            InstructionWithI8,
            InstructionWithI16,
            InstructionWithI32,
            InstructionWithI64,
            InstructionWithF32,
            InstructionWithF64,
            InstructionWithF80,
            InstructionWithPtr,
            Alloca,
            ByValArgBegin,
            ByValArgEnd,
            Malloc,
            Free,
            StateUntyped,
            StateTyped,
            StateClear,
            StateOverwriteReplace,
            StateOverwriteSplitFragment,
            StateOverwriteTrimLeft,
            StateOverwriteTrimRight,
            StreamOpen,
            StreamClose,
            StreamWrite,
            DirOpen,
            DirClose,
            RuntimeError,
            KnownRegionAdd,
            KnownRegionRemove,
            Args,
            Env,
            GlobalRegister,
        ];
        ALL.get(tag as usize).copied()
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::FunctionStart { .. } => EventKind::FunctionStart,
            Event::FunctionEnd => EventKind::FunctionEnd,
            Event::NewThreadTime { .. } => EventKind::NewThreadTime,
            Event::NewProcessTime { .. } => EventKind::NewProcessTime,
            Event::PreInstruction { .. } => EventKind::PreInstruction,
            Event::Instruction { .. } => EventKind::Instruction,
            Event::InstructionWithI8 { .. } => EventKind::InstructionWithI8,
            Event::InstructionWithI16 { .. } => EventKind::InstructionWithI16,
            Event::InstructionWithI32 { .. } => EventKind::InstructionWithI32,
            Event::InstructionWithI64 { .. } => EventKind::InstructionWithI64,
            Event::InstructionWithF32 { .. } => EventKind::InstructionWithF32,
            Event::InstructionWithF64 { .. } => EventKind::InstructionWithF64,
            Event::InstructionWithF80 { .. } => EventKind::InstructionWithF80,
            Event::InstructionWithPtr { .. } => EventKind::InstructionWithPtr,
            Event::Alloca { .. } => EventKind::Alloca,
            Event::ByValArgBegin { .. } => EventKind::ByValArgBegin,
            Event::ByValArgEnd { .. } => EventKind::ByValArgEnd,
            Event::Malloc { .. } => EventKind::Malloc,
            Event::Free { .. } => EventKind::Free,
            Event::StateUntyped { .. } => EventKind::StateUntyped,
            Event::StateTyped { .. } => EventKind::StateTyped,
            Event::StateClear { .. } => EventKind::StateClear,
            Event::StateOverwriteReplace { .. } => EventKind::StateOverwriteReplace,
            Event::StateOverwriteSplitFragment { .. } => EventKind::StateOverwriteSplitFragment,
            Event::StateOverwriteTrimLeft { .. } => EventKind::StateOverwriteTrimLeft,
            Event::StateOverwriteTrimRight { .. } => EventKind::StateOverwriteTrimRight,
            Event::StreamOpen { .. } => EventKind::StreamOpen,
            Event::StreamClose { .. } => EventKind::StreamClose,
            Event::StreamWrite { .. } => EventKind::StreamWrite,
            Event::DirOpen { .. } => EventKind::DirOpen,
            Event::DirClose { .. } => EventKind::DirClose,
            Event::RuntimeError { .. } => EventKind::RuntimeError,
            Event::KnownRegionAdd { .. } => EventKind::KnownRegionAdd,
            Event::KnownRegionRemove { .. } => EventKind::KnownRegionRemove,
            Event::Args { .. } => EventKind::Args,
            Event::Env { .. } => EventKind::Env,
            Event::GlobalRegister { .. } => EventKind::GlobalRegister,
        }
    }
}

/// Schema entry for one event kind: its human-readable name and, if the
/// kind has a fixed encoded length (tag byte excluded), that length.
/// `None` marks a variable-length kind whose record is length-suffixed.
pub struct EventKindInfo {
    pub name: &'static str,
    pub fixed_len: Option<usize>,
}

lazy_static::lazy_static! {
    /// Compile-time-shaped schema table (spec §4.1), built once at
    /// startup rather than as a `const fn` because it's indexed by
    /// [`EventKind`] discriminant via a `Vec`.
    pub static ref EVENT_KIND_TABLE: Vec<EventKindInfo> = vec![
        EventKindInfo { name: "FunctionStart", fixed_len: Some(4) },
        EventKindInfo { name: "FunctionEnd", fixed_len: Some(0) },
        EventKindInfo { name: "NewThreadTime", fixed_len: Some(8) },
        EventKindInfo { name: "NewProcessTime", fixed_len: Some(8) },
        EventKindInfo { name: "PreInstruction", fixed_len: Some(4) },
        EventKindInfo { name: "Instruction", fixed_len: Some(4) },
        EventKindInfo { name: "InstructionWithI8", fixed_len: Some(5) },
        EventKindInfo { name: "InstructionWithI16", fixed_len: Some(6) },
        EventKindInfo { name: "InstructionWithI32", fixed_len: Some(8) },
        EventKindInfo { name: "InstructionWithI64", fixed_len: Some(12) },
        EventKindInfo { name: "InstructionWithF32", fixed_len: Some(8) },
        EventKindInfo { name: "InstructionWithF64", fixed_len: Some(12) },
        EventKindInfo { name: "InstructionWithF80", fixed_len: Some(14) },
        EventKindInfo { name: "InstructionWithPtr", fixed_len: Some(12) },
        EventKindInfo { name: "Alloca", fixed_len: Some(28) },
        EventKindInfo { name: "ByValArgBegin", fixed_len: Some(16) },
        EventKindInfo { name: "ByValArgEnd", fixed_len: Some(8) },
        EventKindInfo { name: "Malloc", fixed_len: Some(20) },
        EventKindInfo { name: "Free", fixed_len: Some(8) },
        EventKindInfo { name: "StateUntyped", fixed_len: None },
        EventKindInfo { name: "StateTyped", fixed_len: None },
        EventKindInfo { name: "StateClear", fixed_len: Some(16) },
        // OldFragment's encoding is start:8 + last:8 + thread_id:4 +
        // event_offset:8 + process_time:8 = 36 bytes.
        EventKindInfo { name: "StateOverwriteReplace", fixed_len: Some(36) },
        EventKindInfo { name: "StateOverwriteSplitFragment", fixed_len: Some(52) },
        EventKindInfo { name: "StateOverwriteTrimLeft", fixed_len: Some(44) },
        EventKindInfo { name: "StateOverwriteTrimRight", fixed_len: Some(44) },
        EventKindInfo { name: "StreamOpen", fixed_len: None },
        EventKindInfo { name: "StreamClose", fixed_len: Some(8) },
        EventKindInfo { name: "StreamWrite", fixed_len: None },
        EventKindInfo { name: "DirOpen", fixed_len: Some(8) },
        EventKindInfo { name: "DirClose", fixed_len: Some(8) },
        EventKindInfo { name: "RuntimeError", fixed_len: None },
        EventKindInfo { name: "KnownRegionAdd", fixed_len: Some(17) },
        EventKindInfo { name: "KnownRegionRemove", fixed_len: Some(8) },
        EventKindInfo { name: "Args", fixed_len: None },
        EventKindInfo { name: "Env", fixed_len: None },
        // index:4 + address:8 + size:8 = 20 bytes.
        EventKindInfo { name: "GlobalRegister", fixed_len: Some(20) },
    ];
}

pub fn kind_info(kind: EventKind) -> &'static EventKindInfo {
    &EVENT_KIND_TABLE[kind as usize]
}
