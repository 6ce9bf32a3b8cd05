//! Shared utilities: subprocess execution and terminal logging.

pub mod exec;
pub mod log;
