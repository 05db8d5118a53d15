//! Checkout Sessions
//!
//! One session per opened payment link, alive until it closes itself.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use checkout_core::{CheckoutError, CheckoutOptions, EntryParams, Result, SessionId};
use checkout_notify::OutcomeDispatcher;

/// An opened payment link
pub struct CheckoutSession {
    pub id: SessionId,
    pub params: EntryParams,
    pub checkout: CheckoutOptions,
    pub dispatcher: Arc<OutcomeDispatcher>,
}

/// Session storage trait
pub trait SessionStore: Send + Sync {
    /// Save or replace a session
    fn save(&self, session: Arc<CheckoutSession>) -> Result<()>;

    /// Get session by id
    fn get(&self, id: &SessionId) -> Result<Option<Arc<CheckoutSession>>>;

    /// Remove a session; returns whether it existed
    fn remove(&self, id: &SessionId) -> Result<bool>;

    /// Number of open sessions
    fn len(&self) -> Result<usize>;
}

/// In-memory session store
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<CheckoutSession>>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

fn poisoned<T>(_: T) -> CheckoutError {
    CheckoutError::Other("session store lock poisoned".into())
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: Arc<CheckoutSession>) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    fn get(&self, id: &SessionId) -> Result<Option<Arc<CheckoutSession>>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(id).cloned())
    }

    fn remove(&self, id: &SessionId) -> Result<bool> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        Ok(sessions.remove(id).is_some())
    }

    fn len(&self) -> Result<usize> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.len())
    }
}
