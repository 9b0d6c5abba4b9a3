//! Companion CLI commands built on top of the engine (spec §6: "No
//! command-line surface or configuration is part of the core; those
//! belong to tooling on top of the engine").

use std::io;

pub mod replay_dump;
pub mod trace_info;

pub trait SeecCommand {
    fn run(&mut self) -> io::Result<()>;
}
