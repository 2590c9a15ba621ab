//! Shared helpers for binaries built on the registry.

pub mod bootstrap;
