//! CLI subcommands.

pub mod cat;
pub mod common;
pub mod info;
pub mod simulate;
