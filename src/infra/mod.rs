//! Infrastructure adapters: the client message record and its channels.

pub mod message;
pub mod outbox;

pub use message::{ClientCommand, Message, ReplyKind, RECORD_LEN};
pub use outbox::{InMemoryOutbox, Outbox};
#[cfg(unix)]
pub use outbox::{ControllerPipe, FifoOutbox};
