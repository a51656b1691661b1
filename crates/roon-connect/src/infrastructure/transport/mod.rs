//! Session transport adapters.
//!
//! The Roon extension API session (WebSocket, registration, token exchange)
//! is provided by an external library and plugs into the state machine
//! through the `TransportFactory` / `SessionTransport` traits in
//! `application::ports`.  The factory's `open` must return immediately; the
//! link outcome and the authorization result are reported asynchronously as
//! `TransportEvent`s on the sender passed to `open`.
//!
//! # Testability
//!
//! The `mock` sub-module provides a factory whose transports record every call
//! and whose events are injected by the test.

pub mod mock;
