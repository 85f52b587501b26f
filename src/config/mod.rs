//! Configuration constants
//!
//! - [`defaults`] - Default paths, pinned refs and workspace layout names
//! - [`urls`] - Upstream source repositories

pub mod defaults;
pub mod urls;
