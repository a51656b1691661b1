//! Infrastructure layer.
//!
//! Contains the OS-facing adapters: the UDP discovery engine, config-file
//! storage, and session transport adapters.
//!
//! **Dependency rule**: this layer may depend on `application` and `roon_core`,
//! but MUST NOT be imported by the `application` or domain layers.

pub mod network;
pub mod storage;
pub mod transport;
