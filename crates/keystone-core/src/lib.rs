//! # Keystone Core
//!
//! Core types shared by every Keystone crate: the cache error taxonomy,
//! result aliases and logging initialisation.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::*;
