//! The Luna `PKCS#11` sample programs as subcommands of a single binary.

pub mod actions;
pub mod commands;
pub mod config;
pub mod error;
