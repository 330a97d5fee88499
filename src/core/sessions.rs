//! Session registry: fixed-capacity table of logged-in clients.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::DispatchError;
use crate::util::types::ClientPid;

/// One logged-in client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    /// Client process id; also names its reply channel.
    pub pid: ClientPid,
    /// Unique login name.
    pub username: String,
}

/// Fixed-capacity table of active sessions.
///
/// Uniqueness and capacity are checked inside the same critical section as the
/// insertion, so concurrent logins cannot both claim a name.
pub struct SessionRegistry {
    capacity: usize,
    slots: Mutex<Vec<Option<ClientSession>>>,
}

impl SessionRegistry {
    /// Create a registry with room for `capacity` sessions.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(vec![None; capacity]),
        }
    }

    /// Maximum number of simultaneous sessions.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a session after checking name and pid uniqueness.
    ///
    /// # Errors
    ///
    /// - `DuplicateIdentity` if the username or pid is already active
    /// - `CapacityExceeded` if every slot is taken
    pub fn try_register(&self, pid: ClientPid, username: &str) -> Result<(), DispatchError> {
        let mut slots = self.slots.lock();
        let taken = slots
            .iter()
            .flatten()
            .any(|s| s.username == username || s.pid == pid);
        if taken {
            return Err(DispatchError::DuplicateIdentity(username.to_string()));
        }
        let Some(free) = slots.iter_mut().find(|s| s.is_none()) else {
            return Err(DispatchError::CapacityExceeded("session table full".into()));
        };
        *free = Some(ClientSession {
            pid,
            username: username.to_string(),
        });
        Ok(())
    }

    /// Remove the session for `pid`. Returns the removed session, if any.
    pub fn remove(&self, pid: ClientPid) -> Option<ClientSession> {
        let mut slots = self.slots.lock();
        slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|s| s.pid == pid))
            .and_then(Option::take)
    }

    /// Look up the session owned by `pid`.
    #[must_use]
    pub fn get(&self, pid: ClientPid) -> Option<ClientSession> {
        self.slots.lock().iter().flatten().find(|s| s.pid == pid).cloned()
    }

    /// Snapshot of all active sessions in slot order.
    #[must_use]
    pub fn list(&self) -> Vec<ClientSession> {
        self.slots.lock().iter().flatten().cloned().collect()
    }

    /// Number of active sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    /// Whether no client is logged in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
