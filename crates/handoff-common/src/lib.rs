pub mod errors;
pub mod id;

pub use errors::{BridgeError, ConfigError, HandoffError, RelayError};
pub use id::{new_connection_nonce, ConnectionId};
