//! # Keystone Server Library
//!
//! Wires configuration, the remote store and the cache façade together,
//! and provides startup utilities for the `keystone-server` binary.

pub mod app;
pub mod startup;
