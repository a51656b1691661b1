//! Storage infrastructure: configuration file and credential persistence.
//!
//! - **`config`** – Reads and writes the TOML configuration file from the
//!   platform config directory, with defaults for every missing field.
//! - **`credentials`** – The file-backed `CredentialStore`, stored in the
//!   `[saved_server]` section of that same file.
//! - **`memory`** – An in-memory `CredentialStore` for tests.

pub mod config;
pub mod credentials;
pub mod memory;
