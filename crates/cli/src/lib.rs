//! roundtable command-line host and controller.

pub mod cdp;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod server;
pub mod stdio;
