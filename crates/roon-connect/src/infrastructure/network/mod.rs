//! Network infrastructure.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Sends SOOD queries to the multicast group and the LAN
//!   broadcast address and collects the Roon Cores that answer within the
//!   round's deadline.  This is how cores are found without manual IP
//!   configuration.

pub mod discovery;
