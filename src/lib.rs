pub mod agent;
pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod exec;
pub mod prompt;
