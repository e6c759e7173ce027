//! Operator console

mod cli;

pub use cli::{Args, Cli, ConsoleCommand};
