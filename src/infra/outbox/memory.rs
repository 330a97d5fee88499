//! In-memory outbox backend.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::DispatchError;
use crate::infra::message::{Message, ReplyKind};
use crate::util::types::ClientPid;

use super::Outbox;

/// Outbox that keeps every delivered message per client, for tests and
/// embedding.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    messages: Mutex<HashMap<ClientPid, Vec<Message>>>,
    unreachable: Mutex<HashSet<ClientPid>>,
}

impl InMemoryOutbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages delivered to `pid` so far.
    #[must_use]
    pub fn fetch(&self, pid: ClientPid) -> Vec<Message> {
        self.messages.lock().get(&pid).cloned().unwrap_or_default()
    }

    /// Remove and return the messages delivered to `pid`.
    pub fn take(&self, pid: ClientPid) -> Vec<Message> {
        self.messages.lock().remove(&pid).unwrap_or_default()
    }

    /// Messages delivered to `pid` with the given kind.
    #[must_use]
    pub fn fetch_kind(&self, pid: ClientPid, kind: ReplyKind) -> Vec<Message> {
        self.fetch(pid).into_iter().filter(|m| m.is(kind)).collect()
    }

    /// Make deliveries to `pid` fail as if its channel were gone.
    pub fn disconnect(&self, pid: ClientPid) {
        self.unreachable.lock().insert(pid);
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn deliver(&self, pid: ClientPid, message: Message) -> Result<(), DispatchError> {
        if self.unreachable.lock().contains(&pid) {
            return Err(DispatchError::ResourceUnavailable(format!("client {pid}")));
        }
        self.messages.lock().entry(pid).or_default().push(message);
        Ok(())
    }
}
