//! Shared runtime utilities for the amoebot simulation.
//!
//! This crate re-exports the data contracts from `sim_schema` and
//! accumulates helpers that operate on those types (command payloads,
//! command-line parsing) without depending on the Bevy runtime in
//! `core_sim`.

mod command_text;
mod commands;

pub use command_text::{parse_command_line, CommandParseError};
pub use commands::CommandPayload;

pub use sim_schema::*;
