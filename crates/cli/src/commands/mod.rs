//! CLI Commands

pub mod discover;
pub mod probe;
pub mod report;
pub mod serve;
