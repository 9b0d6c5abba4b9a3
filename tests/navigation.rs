//! End-to-end round trip: record a malloc/write/free sequence to a real
//! trace directory, then replay it forward to the end and back, checking
//! the spec's "round-trip navigation" and "end-boundedness" properties
//! (scenario 2 in the spec's concrete examples).

use std::path::Path;

use seec_engine::record::{ProcessListener, ThreadListener};
use seec_engine::replay::{navigation, ProcessState};
use seec_engine::trace::reader::{self, FunctionTable, TraceHeader, TraceReader};
use seec_engine::trace::stream::TraceStreamWriter;

fn record_malloc_write_free(dir: &Path) {
    let process = ProcessListener::new(
        TraceStreamWriter::create(&reader::process_events_path(dir)).unwrap(),
    );

    let mut thread = ThreadListener::create(&process, 1, &reader::thread_events_path(dir, 1)).unwrap();
    thread.enter_notification();
    thread.notify_malloc(0x2000, 16, 0);
    thread.notify_state_untyped(0x2000, &[0xAA; 16]);
    thread.exit_notification();

    thread.enter_notification();
    thread.notify_free(0x2000);
    thread.exit_notification();

    let final_thread_time = thread.thread_time();
    let (records, top_level_offsets) = thread.finish().unwrap();

    process.record_args(vec![]).unwrap();
    process.record_env(vec![]).unwrap();
    process.flush_process_events().unwrap();

    let table = FunctionTable { records, top_level_offsets };
    std::fs::write(reader::thread_functions_path(dir, 1), table.encode()).unwrap();

    reader::write_header(
        dir,
        &TraceHeader {
            thread_count: 1,
            final_process_time: process.current_time(),
            thread_final_times: vec![final_thread_time],
        },
    )
    .unwrap();
}

#[test]
fn forward_to_end_then_backward_to_start_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    record_malloc_write_free(dir.path());

    let trace = TraceReader::open(dir.path()).unwrap();
    let mut state = ProcessState::open(trace).unwrap();

    navigation::move_forward_to_end(&mut state, 1, &navigation::CancellationFlag::new());
    assert!(!navigation::move_forward(&mut state, 1));
    assert_eq!(state.process_time(), state.trace().final_process_time());
    assert!(state.mallocs().is_empty());
    assert!(!state.memory().contains_known(0x2000, 16));

    navigation::move_backward_to_end(&mut state, 1, &navigation::CancellationFlag::new());
    assert!(!navigation::move_backward(&mut state, 1));
    assert_eq!(state.process_time(), 0);
    assert!(state.mallocs().is_empty());
    assert!(state.thread_state(1).frames().is_empty());
}

fn record_malloc_then_write(dir: &Path) {
    let process = ProcessListener::new(
        TraceStreamWriter::create(&reader::process_events_path(dir)).unwrap(),
    );

    let mut thread = ThreadListener::create(&process, 1, &reader::thread_events_path(dir, 1)).unwrap();
    thread.enter_notification();
    thread.notify_malloc(0x3000, 16, 0);
    thread.exit_notification();

    thread.enter_notification();
    thread.notify_state_untyped(0x3000, &[0xAA; 16]);
    thread.exit_notification();

    let final_thread_time = thread.thread_time();
    let (records, top_level_offsets) = thread.finish().unwrap();

    process.record_args(vec![]).unwrap();
    process.record_env(vec![]).unwrap();
    process.flush_process_events().unwrap();

    let table = FunctionTable { records, top_level_offsets };
    std::fs::write(reader::thread_functions_path(dir, 1), table.encode()).unwrap();

    reader::write_header(
        dir,
        &TraceHeader {
            thread_count: 1,
            final_process_time: process.current_time(),
            thread_final_times: vec![final_thread_time],
        },
    )
    .unwrap();
}

#[test]
fn move_to_allocation_lands_right_after_malloc_with_no_later_writes_applied() {
    let dir = tempfile::tempdir().unwrap();
    record_malloc_then_write(dir.path());

    let trace = TraceReader::open(dir.path()).unwrap();
    let mut state = ProcessState::open(trace).unwrap();
    navigation::move_forward_to_end(&mut state, 1, &navigation::CancellationFlag::new());
    assert!(state.memory().contains_known(0x3000, 16));

    // An interior address, not the allocation's base.
    assert!(navigation::move_to_allocation(&mut state, 0x3008));
    assert!(state.mallocs().contains_key(&0x3000));
    assert!(!state.memory().contains_known(0x3000, 16));
}

#[test]
fn move_to_allocation_reports_an_unallocated_address_as_not_found() {
    let dir = tempfile::tempdir().unwrap();
    record_malloc_then_write(dir.path());

    let trace = TraceReader::open(dir.path()).unwrap();
    let mut state = ProcessState::open(trace).unwrap();
    navigation::move_forward_to_end(&mut state, 1, &navigation::CancellationFlag::new());

    assert!(!navigation::move_to_allocation(&mut state, 0xDEAD0000));
}

#[test]
fn one_step_backward_from_end_restores_the_freed_allocation() {
    let dir = tempfile::tempdir().unwrap();
    record_malloc_write_free(dir.path());

    let trace = TraceReader::open(dir.path()).unwrap();
    let mut state = ProcessState::open(trace).unwrap();
    navigation::move_forward_to_end(&mut state, 1, &navigation::CancellationFlag::new());
    assert!(state.mallocs().is_empty());

    navigation::move_backward(&mut state, 1);
    assert!(state.mallocs().contains_key(&0x2000));
    assert!(state.memory().contains_known(0x2000, 16));
}
