//! Infrastructure layer
//!
//! Handles I/O with the outside world: the filesystem, external processes
//! and git checkouts.

pub mod dirs;
pub mod filesystem;
pub mod git;
pub mod process;
