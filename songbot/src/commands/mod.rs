//! Command implementations for the songbot CLI.

pub mod doctor;
pub mod fetch;
pub mod run;
