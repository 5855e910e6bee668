//! CLI command handlers
//!
//! Each subcommand of the binary maps to one function here. Handlers take
//! the process runner as a parameter and return typed results; printing is
//! left to `main`.

pub mod export;
pub mod system;
