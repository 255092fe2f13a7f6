//! CLI Commands

pub mod generate;
pub mod health;
pub mod samples;
