//! Ralph Supervisor - run a coding agent in a bounded loop until it signals
//! completion.

pub mod cli;
pub mod config;
pub mod debug_log;
pub mod detect;
pub mod display;
pub mod supervisor;
