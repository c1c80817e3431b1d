//! Command implementations and terminal output

pub mod harvest;
pub mod serve;
pub mod snapshot;
pub mod ui;
