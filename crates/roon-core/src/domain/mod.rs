//! Domain types shared between discovery and the connection lifecycle.

pub mod server;
