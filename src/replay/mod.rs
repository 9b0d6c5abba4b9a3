//! Replay side of the engine (spec §4.6–§4.8): process and thread state
//! reconstruction, and navigation over it.

pub mod navigation;
pub mod process_state;
pub mod thread_state;

pub use navigation::{move_backward, move_backward_to_end, move_forward, move_forward_to_end, move_to_allocation, move_to_deallocation, CancellationFlag};
pub use process_state::ProcessState;
pub use thread_state::{AllocaRecord, FunctionFrame, RuntimeValue, ThreadState};
