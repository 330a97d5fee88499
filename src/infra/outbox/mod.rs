//! Controller-to-client delivery backends.

pub mod memory;
#[cfg(unix)]
pub mod fifo;

use async_trait::async_trait;

use crate::core::DispatchError;
use crate::infra::message::Message;
use crate::util::types::ClientPid;

pub use memory::InMemoryOutbox;
#[cfg(unix)]
pub use fifo::{ControllerPipe, FifoOutbox};

/// Abstraction for delivering a message to one client's reply channel.
///
/// Implementations must not be called while holding any controller state lock.
#[async_trait]
pub trait Outbox: Send + Sync + 'static {
    /// Deliver `message` to the client identified by `pid`.
    ///
    /// # Errors
    ///
    /// Returns `ResourceUnavailable` if the client's channel cannot be reached.
    async fn deliver(&self, pid: ClientPid, message: Message) -> Result<(), DispatchError>;
}
