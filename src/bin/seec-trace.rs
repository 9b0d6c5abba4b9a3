//! Companion CLI binary: subcommands for inspecting an on-disk trace
//! without replaying it interactively.

use std::path::PathBuf;

use structopt::StructOpt;

use seec_engine::commands::replay_dump::ReplayDumpCommand;
use seec_engine::commands::trace_info::TraceInfoCommand;
use seec_engine::commands::SeecCommand;

#[derive(StructOpt)]
#[structopt(name = "seec-trace", about = "Inspect SeeC event traces")]
enum SeecOptions {
    /// Print a trace's header as JSON.
    Info {
        #[structopt(parse(from_os_str))]
        trace_dir: PathBuf,
    },
    /// Print every event in a trace, in stream order.
    Dump {
        #[structopt(parse(from_os_str))]
        trace_dir: PathBuf,
    },
}

fn main() -> std::io::Result<()> {
    seec_engine::logging::init();
    let options = SeecOptions::from_args();
    match options {
        SeecOptions::Info { trace_dir } => TraceInfoCommand::new(trace_dir).run(),
        SeecOptions::Dump { trace_dir } => ReplayDumpCommand::new(trace_dir).run(),
    }
}
