//! Command-line front end for Ventus
//!
//! Drives the attestation pipeline against a file-backed software key
//! store, with a terminal prompt in place of the biometric gate.

pub mod commands;
pub mod config;
pub mod gate;

pub use commands::Session;
pub use config::{Cli, Command};
pub use gate::ConsoleGate;
