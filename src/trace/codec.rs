//! Event codec: `encode`/`decode_at`/`decode_before` (spec §4.1).
//!
//! Record framing, chosen to satisfy spec §9's open question ("the codec
//! needs a normative rule for backward-scan on variable-length records...
//! recommended: length-suffix on every variable record") while still
//! letting *fixed*-length records be walked backward without having
//! already read them forward:
//!
//! ```text
//! [tag: u8] [body...] [total_len: u32, variable-length kinds only] [tag: u8]
//! ```
//!
//! Every record — fixed or variable — carries a duplicate tag byte at its
//! tail. `read_before` reads that trailing tag, looks up the kind's fixed
//! length in [`EVENT_KIND_TABLE`], and if the kind is variable also reads
//! the four bytes before the trailing tag as the record's total length.
//! Either way the record's start offset falls out without needing to have
//! seen it going forward.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::{EngineError, Result};
use crate::trace::event::{kind_info, Event, EventKind, OldFragment};

fn write_bytes_field(buf: &mut Vec<u8>, data: &[u8]) {
    buf.write_u32::<LittleEndian>(data.len() as u32).unwrap();
    buf.extend_from_slice(data);
}

fn read_bytes_field(cur: &mut Cursor<&[u8]>, offset: u64) -> Result<Vec<u8>> {
    let len = cur
        .read_u32::<LittleEndian>()
        .map_err(|_| truncated(offset))? as usize;
    let start = cur.position() as usize;
    let data = cur.get_ref();
    if start + len > data.len() {
        return Err(truncated(offset));
    }
    let out = data[start..start + len].to_vec();
    cur.set_position((start + len) as u64);
    Ok(out)
}

fn write_vec_bytes_field(buf: &mut Vec<u8>, items: &[Vec<u8>]) {
    buf.write_u32::<LittleEndian>(items.len() as u32).unwrap();
    for item in items {
        write_bytes_field(buf, item);
    }
}

fn read_vec_bytes_field(cur: &mut Cursor<&[u8]>, offset: u64) -> Result<Vec<Vec<u8>>> {
    let count = cur
        .read_u32::<LittleEndian>()
        .map_err(|_| truncated(offset))? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_bytes_field(cur, offset)?);
    }
    Ok(out)
}

fn write_old_fragment(buf: &mut Vec<u8>, old: &OldFragment) {
    buf.write_u64::<LittleEndian>(old.start).unwrap();
    buf.write_u64::<LittleEndian>(old.last).unwrap();
    buf.write_u32::<LittleEndian>(old.thread_id).unwrap();
    buf.write_u64::<LittleEndian>(old.event_offset).unwrap();
    buf.write_u64::<LittleEndian>(old.process_time).unwrap();
}

fn read_old_fragment(cur: &mut Cursor<&[u8]>, offset: u64) -> Result<OldFragment> {
    let err = || truncated(offset);
    Ok(OldFragment {
        start: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        last: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        thread_id: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
        event_offset: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        process_time: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
    })
}

fn truncated(offset: u64) -> EngineError {
    EngineError::TruncatedStream { offset }
}

fn malformed(offset: u64, reason: impl Into<String>) -> EngineError {
    EngineError::MalformedRecord {
        offset,
        reason: reason.into(),
    }
}

/// Encode `event` as a complete framed record (tag + body + optional
/// length suffix + trailing tag).
pub fn encode(event: &Event) -> Vec<u8> {
    let kind = event.kind();
    let mut body = Vec::new();

    match event {
        Event::FunctionStart { function_index } => {
            body.write_u32::<LittleEndian>(*function_index).unwrap();
        }
        Event::FunctionEnd => {}
        Event::NewThreadTime { time } | Event::NewProcessTime { time } => {
            body.write_u64::<LittleEndian>(*time).unwrap();
        }
        Event::PreInstruction { instruction_index } | Event::Instruction { instruction_index } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
        }
        Event::InstructionWithI8 {
            instruction_index,
            value,
        } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
            body.write_i8(*value).unwrap();
        }
        Event::InstructionWithI16 {
            instruction_index,
            value,
        } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
            body.write_i16::<LittleEndian>(*value).unwrap();
        }
        Event::InstructionWithI32 {
            instruction_index,
            value,
        } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
            body.write_i32::<LittleEndian>(*value).unwrap();
        }
        Event::InstructionWithI64 {
            instruction_index,
            value,
        } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
            body.write_i64::<LittleEndian>(*value).unwrap();
        }
        Event::InstructionWithF32 {
            instruction_index,
            value,
        } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
            body.write_f32::<LittleEndian>(*value).unwrap();
        }
        Event::InstructionWithF64 {
            instruction_index,
            value,
        } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
            body.write_f64::<LittleEndian>(*value).unwrap();
        }
        Event::InstructionWithF80 {
            instruction_index,
            value,
        } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
            body.extend_from_slice(value);
        }
        Event::InstructionWithPtr {
            instruction_index,
            value,
        } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
            body.write_u64::<LittleEndian>(*value).unwrap();
        }
        Event::Alloca {
            instruction_index,
            address,
            element_size,
            element_count,
        } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
            body.write_u64::<LittleEndian>(*address).unwrap();
            body.write_u64::<LittleEndian>(*element_size).unwrap();
            body.write_u64::<LittleEndian>(*element_count).unwrap();
        }
        Event::ByValArgBegin { address, size } => {
            body.write_u64::<LittleEndian>(*address).unwrap();
            body.write_u64::<LittleEndian>(*size).unwrap();
        }
        Event::ByValArgEnd { address } => {
            body.write_u64::<LittleEndian>(*address).unwrap();
        }
        Event::Malloc {
            address,
            size,
            allocating_instruction,
        } => {
            body.write_u64::<LittleEndian>(*address).unwrap();
            body.write_u64::<LittleEndian>(*size).unwrap();
            body.write_u32::<LittleEndian>(*allocating_instruction).unwrap();
        }
        Event::Free { address } => {
            body.write_u64::<LittleEndian>(*address).unwrap();
        }
        Event::StateUntyped { address, data } => {
            body.write_u64::<LittleEndian>(*address).unwrap();
            write_bytes_field(&mut body, data);
        }
        Event::StateTyped {
            address,
            data,
            value_descriptor_offset,
        } => {
            body.write_u64::<LittleEndian>(*address).unwrap();
            write_bytes_field(&mut body, data);
            body.write_u64::<LittleEndian>(*value_descriptor_offset)
                .unwrap();
        }
        Event::StateClear { address, length } => {
            body.write_u64::<LittleEndian>(*address).unwrap();
            body.write_u64::<LittleEndian>(*length).unwrap();
        }
        Event::StateOverwriteReplace { old } => {
            write_old_fragment(&mut body, old);
        }
        Event::StateOverwriteSplitFragment {
            old,
            overwrite_start,
            overwrite_last,
        } => {
            write_old_fragment(&mut body, old);
            body.write_u64::<LittleEndian>(*overwrite_start).unwrap();
            body.write_u64::<LittleEndian>(*overwrite_last).unwrap();
        }
        Event::StateOverwriteTrimLeft { old, new_start } => {
            write_old_fragment(&mut body, old);
            body.write_u64::<LittleEndian>(*new_start).unwrap();
        }
        Event::StateOverwriteTrimRight { old, new_last } => {
            write_old_fragment(&mut body, old);
            body.write_u64::<LittleEndian>(*new_last).unwrap();
        }
        Event::StreamOpen { handle, mode } => {
            body.write_u64::<LittleEndian>(*handle).unwrap();
            write_bytes_field(&mut body, mode.as_bytes());
        }
        Event::StreamClose { handle } => {
            body.write_u64::<LittleEndian>(*handle).unwrap();
        }
        Event::StreamWrite { handle, data } => {
            body.write_u64::<LittleEndian>(*handle).unwrap();
            write_bytes_field(&mut body, data);
        }
        Event::DirOpen { handle } | Event::DirClose { handle } => {
            body.write_u64::<LittleEndian>(*handle).unwrap();
        }
        Event::RuntimeError {
            instruction_index,
            severity,
            payload,
        } => {
            body.write_u32::<LittleEndian>(*instruction_index).unwrap();
            body.write_u8(*severity).unwrap();
            write_bytes_field(&mut body, payload);
        }
        Event::KnownRegionAdd {
            address,
            length,
            permission,
        } => {
            body.write_u64::<LittleEndian>(*address).unwrap();
            body.write_u64::<LittleEndian>(*length).unwrap();
            body.write_u8(*permission).unwrap();
        }
        Event::KnownRegionRemove { address } => {
            body.write_u64::<LittleEndian>(*address).unwrap();
        }
        Event::Args { argv } => {
            write_vec_bytes_field(&mut body, argv);
        }
        Event::Env { envp } => {
            write_vec_bytes_field(&mut body, envp);
        }
        Event::GlobalRegister { index, address, size } => {
            body.write_u32::<LittleEndian>(*index).unwrap();
            body.write_u64::<LittleEndian>(*address).unwrap();
            body.write_u64::<LittleEndian>(*size).unwrap();
        }
    }

    let mut out = Vec::with_capacity(body.len() + 6);
    out.push(kind as u8);
    out.extend_from_slice(&body);
    if kind_info(kind).fixed_len.is_none() {
        let total_len = (out.len() + 4 + 1) as u32;
        out.write_u32::<LittleEndian>(total_len).unwrap();
    }
    out.push(kind as u8);
    out
}

/// Decode the record beginning at `offset` in `data`.
/// Returns the decoded event and the offset of the next record.
pub fn decode_at(data: &[u8], offset: u64) -> Result<(Event, u64)> {
    let off = offset as usize;
    if off >= data.len() {
        return Err(truncated(offset));
    }
    let tag = data[off];
    let kind = EventKind::from_tag(tag).ok_or(EngineError::UnknownEventKind { tag, offset })?;
    let mut cur = Cursor::new(&data[off + 1..]);

    let event = decode_body(kind, &mut cur, offset)?;
    let consumed = cur.position();

    let info = kind_info(kind);
    let next_offset = if let Some(fixed) = info.fixed_len {
        if consumed != fixed as u64 {
            return Err(malformed(
                offset,
                format!(
                    "{} expected {} body bytes, consumed {}",
                    info.name, fixed, consumed
                ),
            ));
        }
        let trailing_pos = off + 1 + fixed;
        check_trailing_tag(data, trailing_pos, tag, offset)?;
        offset + 1 + fixed as u64 + 1
    } else {
        let suffix_pos = off + 1 + consumed as usize;
        if suffix_pos + 4 > data.len() {
            return Err(truncated(offset));
        }
        let total_len =
            u32::from_le_bytes(data[suffix_pos..suffix_pos + 4].try_into().unwrap()) as u64;
        let trailing_pos = off + total_len as usize - 1;
        check_trailing_tag(data, trailing_pos, tag, offset)?;
        offset + total_len
    };

    Ok((event, next_offset))
}

fn check_trailing_tag(data: &[u8], trailing_pos: usize, tag: u8, offset: u64) -> Result<()> {
    if trailing_pos >= data.len() {
        return Err(truncated(offset));
    }
    if data[trailing_pos] != tag {
        return Err(malformed(
            offset,
            "trailing tag byte does not match leading tag",
        ));
    }
    Ok(())
}

/// Decode the record ending immediately before `offset` in `data`.
/// Returns the decoded event and the offset at which it begins.
pub fn decode_before(data: &[u8], offset: u64) -> Result<(Event, u64)> {
    if offset == 0 {
        return Err(truncated(offset));
    }
    let trailing_pos = offset as usize - 1;
    let tag = *data.get(trailing_pos).ok_or(truncated(offset))?;
    let kind = EventKind::from_tag(tag).ok_or(EngineError::UnknownEventKind { tag, offset })?;
    let info = kind_info(kind);

    let start = if let Some(fixed) = info.fixed_len {
        let total = 1 + fixed + 1;
        offset
            .checked_sub(total as u64)
            .ok_or_else(|| malformed(offset, "fixed-length record underflows buffer"))?
    } else {
        if trailing_pos < 4 {
            return Err(truncated(offset));
        }
        let len_pos = trailing_pos - 4;
        let total_len =
            u32::from_le_bytes(data[len_pos..len_pos + 4].try_into().unwrap()) as u64;
        offset
            .checked_sub(total_len)
            .ok_or_else(|| malformed(offset, "variable-length record underflows buffer"))?
    };

    let (event, next) = decode_at(data, start)?;
    if next != offset {
        return Err(malformed(
            start,
            "forward re-decode did not land back on the requested offset",
        ));
    }
    Ok((event, start))
}

fn decode_body(kind: EventKind, cur: &mut Cursor<&[u8]>, offset: u64) -> Result<Event> {
    let err = || truncated(offset);
    use EventKind::*;
    Ok(match kind {
        FunctionStart => Event::FunctionStart {
            function_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
        },
        FunctionEnd => Event::FunctionEnd,
        NewThreadTime => Event::NewThreadTime {
            time: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        NewProcessTime => Event::NewProcessTime {
            time: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        PreInstruction => Event::PreInstruction {
            instruction_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
        },
        Instruction => Event::Instruction {
            instruction_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
        },
        InstructionWithI8 => Event::InstructionWithI8 {
            instruction_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
            value: cur.read_i8().map_err(|_| err())?,
        },
        InstructionWithI16 => Event::InstructionWithI16 {
            instruction_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
            value: cur.read_i16::<LittleEndian>().map_err(|_| err())?,
        },
        InstructionWithI32 => Event::InstructionWithI32 {
            instruction_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
            value: cur.read_i32::<LittleEndian>().map_err(|_| err())?,
        },
        InstructionWithI64 => Event::InstructionWithI64 {
            instruction_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
            value: cur.read_i64::<LittleEndian>().map_err(|_| err())?,
        },
        InstructionWithF32 => Event::InstructionWithF32 {
            instruction_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
            value: cur.read_f32::<LittleEndian>().map_err(|_| err())?,
        },
        InstructionWithF64 => Event::InstructionWithF64 {
            instruction_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
            value: cur.read_f64::<LittleEndian>().map_err(|_| err())?,
        },
        InstructionWithF80 => {
            let instruction_index = cur.read_u32::<LittleEndian>().map_err(|_| err())?;
            let mut value = [0u8; 10];
            cur.read_exact(&mut value).map_err(|_| err())?;
            Event::InstructionWithF80 {
                instruction_index,
                value,
            }
        }
        InstructionWithPtr => Event::InstructionWithPtr {
            instruction_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
            value: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        Alloca => Event::Alloca {
            instruction_index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
            address: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            element_size: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            element_count: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        ByValArgBegin => Event::ByValArgBegin {
            address: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            size: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        ByValArgEnd => Event::ByValArgEnd {
            address: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        Malloc => Event::Malloc {
            address: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            size: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            allocating_instruction: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
        },
        Free => Event::Free {
            address: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        StateUntyped => {
            let address = cur.read_u64::<LittleEndian>().map_err(|_| err())?;
            let data = read_bytes_field(cur, offset)?;
            Event::StateUntyped { address, data }
        }
        StateTyped => {
            let address = cur.read_u64::<LittleEndian>().map_err(|_| err())?;
            let data = read_bytes_field(cur, offset)?;
            let value_descriptor_offset = cur.read_u64::<LittleEndian>().map_err(|_| err())?;
            Event::StateTyped {
                address,
                data,
                value_descriptor_offset,
            }
        }
        StateClear => Event::StateClear {
            address: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            length: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        StateOverwriteReplace => Event::StateOverwriteReplace {
            old: read_old_fragment(cur, offset)?,
        },
        StateOverwriteSplitFragment => {
            let old = read_old_fragment(cur, offset)?;
            Event::StateOverwriteSplitFragment {
                old,
                overwrite_start: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
                overwrite_last: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            }
        }
        StateOverwriteTrimLeft => {
            let old = read_old_fragment(cur, offset)?;
            Event::StateOverwriteTrimLeft {
                old,
                new_start: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            }
        }
        StateOverwriteTrimRight => {
            let old = read_old_fragment(cur, offset)?;
            Event::StateOverwriteTrimRight {
                old,
                new_last: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            }
        }
        StreamOpen => {
            let handle = cur.read_u64::<LittleEndian>().map_err(|_| err())?;
            let mode_bytes = read_bytes_field(cur, offset)?;
            let mode = String::from_utf8(mode_bytes)
                .map_err(|_| malformed(offset, "stream mode is not valid utf-8"))?;
            Event::StreamOpen { handle, mode }
        }
        StreamClose => Event::StreamClose {
            handle: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        StreamWrite => {
            let handle = cur.read_u64::<LittleEndian>().map_err(|_| err())?;
            let data = read_bytes_field(cur, offset)?;
            Event::StreamWrite { handle, data }
        }
        DirOpen => Event::DirOpen {
            handle: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        DirClose => Event::DirClose {
            handle: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        RuntimeError => {
            let instruction_index = cur.read_u32::<LittleEndian>().map_err(|_| err())?;
            let severity = cur.read_u8().map_err(|_| err())?;
            let payload = read_bytes_field(cur, offset)?;
            Event::RuntimeError {
                instruction_index,
                severity,
                payload,
            }
        }
        KnownRegionAdd => Event::KnownRegionAdd {
            address: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            length: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            permission: cur.read_u8().map_err(|_| err())?,
        },
        KnownRegionRemove => Event::KnownRegionRemove {
            address: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
        Args => Event::Args {
            argv: read_vec_bytes_field(cur, offset)?,
        },
        Env => Event::Env {
            envp: read_vec_bytes_field(cur, offset)?,
        },
        GlobalRegister => Event::GlobalRegister {
            index: cur.read_u32::<LittleEndian>().map_err(|_| err())?,
            address: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
            size: cur.read_u64::<LittleEndian>().map_err(|_| err())?,
        },
    })
}

use std::io::Read;

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(event: Event) {
        let encoded = encode(&event);
        let (decoded, next) = decode_at(&encoded, 0).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(next, encoded.len() as u64);

        let (decoded_back, start) = decode_before(&encoded, encoded.len() as u64).unwrap();
        assert_eq!(decoded_back, event);
        assert_eq!(start, 0);
    }

    #[test]
    fn fixed_length_events_round_trip_forward_and_backward() {
        roundtrip(Event::FunctionStart { function_index: 7 });
        roundtrip(Event::FunctionEnd);
        roundtrip(Event::NewProcessTime { time: 42 });
        roundtrip(Event::Alloca {
            instruction_index: 3,
            address: 0x1000,
            element_size: 4,
            element_count: 1,
        });
        roundtrip(Event::Malloc {
            address: 0x2000,
            size: 16,
            allocating_instruction: 9,
        });
        roundtrip(Event::GlobalRegister {
            index: 2,
            address: 0x5000,
            size: 8,
        });
    }

    #[test]
    fn variable_length_events_round_trip_forward_and_backward() {
        roundtrip(Event::StateUntyped {
            address: 0x1000,
            data: vec![0xEF, 0xBE, 0xAD, 0xDE],
        });
        roundtrip(Event::RuntimeError {
            instruction_index: 5,
            severity: 1,
            payload: vec![1, 2, 3, 4, 5],
        });
        roundtrip(Event::Args {
            argv: vec![b"prog".to_vec(), b"--flag".to_vec()],
        });
    }

    #[test]
    fn bidirectional_walk_over_a_mixed_stream() {
        let events = vec![
            Event::FunctionStart { function_index: 1 },
            Event::StateUntyped {
                address: 0x1000,
                data: vec![1, 2, 3],
            },
            Event::Free { address: 0x1000 },
            Event::FunctionEnd,
        ];
        let mut buf = Vec::new();
        let mut offsets = vec![0u64];
        for e in &events {
            buf.extend(encode(e));
            offsets.push(buf.len() as u64);
        }

        // Forward walk.
        let mut offset = 0u64;
        for e in &events {
            let (decoded, next) = decode_at(&buf, offset).unwrap();
            assert_eq!(&decoded, e);
            offset = next;
        }
        assert_eq!(offset, buf.len() as u64);

        // Backward walk from the end must reproduce events in reverse.
        let mut offset = buf.len() as u64;
        for e in events.iter().rev() {
            let (decoded, start) = decode_before(&buf, offset).unwrap();
            assert_eq!(&decoded, e);
            offset = start;
        }
        assert_eq!(offset, 0);
    }

    #[test]
    fn fixed_len_table_matches_actual_encoded_body_size() {
        // Guards against the table drifting out of sync with the encoder,
        // e.g. after adding a field to a fixed-length event's payload.
        let samples = vec![
            Event::FunctionStart { function_index: 0 },
            Event::FunctionEnd,
            Event::NewThreadTime { time: 0 },
            Event::NewProcessTime { time: 0 },
            Event::PreInstruction { instruction_index: 0 },
            Event::Instruction { instruction_index: 0 },
            Event::InstructionWithI8 { instruction_index: 0, value: 0 },
            Event::InstructionWithI16 { instruction_index: 0, value: 0 },
            Event::InstructionWithI32 { instruction_index: 0, value: 0 },
            Event::InstructionWithI64 { instruction_index: 0, value: 0 },
            Event::InstructionWithF32 { instruction_index: 0, value: 0.0 },
            Event::InstructionWithF64 { instruction_index: 0, value: 0.0 },
            Event::InstructionWithF80 { instruction_index: 0, value: [0; 10] },
            Event::InstructionWithPtr { instruction_index: 0, value: 0 },
            Event::Alloca { instruction_index: 0, address: 0, element_size: 0, element_count: 0 },
            Event::ByValArgBegin { address: 0, size: 0 },
            Event::ByValArgEnd { address: 0 },
            Event::Malloc { address: 0, size: 0, allocating_instruction: 0 },
            Event::Free { address: 0 },
            Event::StateClear { address: 0, length: 0 },
            Event::StateOverwriteReplace {
                old: OldFragment { start: 0, last: 0, thread_id: 0, event_offset: 0, process_time: 0 },
            },
            Event::StateOverwriteSplitFragment {
                old: OldFragment { start: 0, last: 0, thread_id: 0, event_offset: 0, process_time: 0 },
                overwrite_start: 0,
                overwrite_last: 0,
            },
            Event::StateOverwriteTrimLeft {
                old: OldFragment { start: 0, last: 0, thread_id: 0, event_offset: 0, process_time: 0 },
                new_start: 0,
            },
            Event::StateOverwriteTrimRight {
                old: OldFragment { start: 0, last: 0, thread_id: 0, event_offset: 0, process_time: 0 },
                new_last: 0,
            },
            Event::StreamClose { handle: 0 },
            Event::DirOpen { handle: 0 },
            Event::DirClose { handle: 0 },
            Event::KnownRegionAdd { address: 0, length: 0, permission: 0 },
            Event::KnownRegionRemove { address: 0 },
            Event::GlobalRegister { index: 0, address: 0, size: 0 },
        ];
        for event in samples {
            let kind = event.kind();
            if let Some(fixed) = kind_info(kind).fixed_len {
                let encoded = encode(&event);
                // tag + body + trailing tag, no length suffix.
                assert_eq!(
                    encoded.len(),
                    1 + fixed + 1,
                    "{:?} table fixed_len disagrees with encoder",
                    kind
                );
            }
        }
    }

    #[test]
    fn unknown_tag_is_reported() {
        let buf = vec![200u8, 0, 0, 0, 0, 200];
        let result = decode_at(&buf, 0);
        assert!(matches!(
            result,
            Err(EngineError::UnknownEventKind { tag: 200, .. })
        ));
    }
}
