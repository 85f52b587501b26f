//! rvforge - RISC-V software stack builder
//!
//! Builds cross toolchains, QEMU, Linux, BBL, OpenSBI and a BusyBox/Dropbear
//! root filesystem from pinned upstream sources, one stage at a time.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line parsing, dispatch and console output
//! - [`core`] - Stages and orchestration
//! - [`infra`] - Infrastructure layer (filesystem, processes, git, directories)
//! - [`config`] - Constants: pinned refs, upstream URLs, default paths
//! - [`error`] - Error types and exit codes

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
