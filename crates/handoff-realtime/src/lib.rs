//! Signaling relay client over Phoenix Channels v1.
//!
//! One authenticated WebSocket connection per principal session, shared by
//! three independent logical streams: pairing signals, driver positions,
//! and order notes. The connection never reconnects on its own; the owner
//! of [`RelayConnectionManager`] calls `connect()` / `disconnect()` as the
//! credential comes and goes.

mod client;
mod connection;
mod credentials;
mod handler;
mod manager;
pub mod protocol;
mod types;

pub use credentials::{CredentialSource, RealtimeCredential, StaticCredentials};
pub use manager::RelayConnectionManager;
pub use protocol::{DriverPosition, OrderNote, SignalEnvelope};
pub use types::{PhoenixMessage, RelayClientConfig, RelayEvent};
