//! Penn Clubs realtime client for Rust
//!
//! Live features (the club chat widget, the admin script console) talk to
//! the backend over a WebSocket at `/api/ws/<feature>/<id>/`, exchanging JSON
//! frames shaped like `{"message": "...", ...}`.
//!
//! There is no reconnection: once the connection drops the client refuses to
//! send, and a new client has to be created.

mod client;
mod error;
mod message;

pub use client::{socket_url, ConnectionState, SocketClient, SocketClientOptions};
pub use error::RealtimeError;
pub use message::SocketFrame;
