//! Application layer: the connection lifecycle use case.
//!
//! This layer decides *what* happens when a server is discovered, a user asks
//! to connect, or the transport reports progress.  It depends only on the
//! collaborator traits in [`ports`]; sockets, files, and the Roon session
//! transport are injected from `infrastructure`.
//!
//! # Sub-modules
//!
//! - **`connection`** – The `ConnectionManager` state machine driving
//!   discovery, connection, authorization, and teardown, and publishing a
//!   `StatusUpdate` on every state change.
//!
//! - **`ports`** – Traits and error types for the credential store, the
//!   session transport, and the discovery engine.

pub mod connection;
pub mod ports;
