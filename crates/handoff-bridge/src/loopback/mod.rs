//! In-process transport and signal hub.
//!
//! Lets two bridges in one process pair without a relay or a network,
//! which is how the bridge's end-to-end behavior is tested.

mod signals;
mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use signals::{HubEndpoint, SignalHub};
pub use transport::{LoopbackConnector, LoopbackNetwork};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
