//! Recording side of the engine (spec §4.4, §4.5): the process-wide state
//! shared by every traced thread, and each thread's own listener.

pub mod process_listener;
pub mod thread_listener;

pub use process_listener::ProcessListener;
pub use thread_listener::ThreadListener;
