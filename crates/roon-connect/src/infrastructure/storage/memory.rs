//! In-memory credential store for unit and integration testing.
//!
//! Clones share state, so a test can hand one clone to the
//! `ConnectionManager` and inspect the recorded calls through another.

use std::sync::{Arc, Mutex};

use roon_core::ServerDescriptor;

use crate::application::ports::{CredentialStore, SavedServer, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    saved: Option<SavedServer>,
    save_calls: Vec<(ServerDescriptor, String)>,
    clear_calls: Vec<String>,
    fail_writes: bool,
}

/// A [`CredentialStore`] that keeps the saved server in memory and records
/// every write.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `server` and `token`.
    pub fn with_saved(server: ServerDescriptor, token: Option<String>) -> Self {
        let store = Self::new();
        store.lock().saved = Some(SavedServer { server, token });
        store
    }

    /// Makes every subsequent write fail with a [`StoreError`].
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// The currently saved server, if any.
    pub fn saved(&self) -> Option<SavedServer> {
        self.lock().saved.clone()
    }

    /// Every `save_server` call, in order, including failed ones.
    pub fn save_calls(&self) -> Vec<(ServerDescriptor, String)> {
        self.lock().save_calls.clone()
    }

    /// Every `clear_token` call, in order.
    pub fn clear_calls(&self) -> Vec<String> {
        self.lock().clear_calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("lock poisoned")
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_saved_server(&self) -> Result<Option<SavedServer>, StoreError> {
        Ok(self.lock().saved.clone())
    }

    fn save_server(&mut self, server: &ServerDescriptor, token: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.save_calls.push((server.clone(), token.to_string()));
        if state.fail_writes {
            return Err(StoreError("write refused".to_string()));
        }
        state.saved = Some(SavedServer {
            server: server.clone(),
            token: Some(token.to_string()),
        });
        Ok(())
    }

    fn clear_token(&mut self, unique_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.clear_calls.push(unique_id.to_string());
        if state.fail_writes {
            return Err(StoreError("write refused".to_string()));
        }
        if let Some(saved) = state.saved.as_mut() {
            if saved.server.unique_id == unique_id {
                saved.token = None;
            }
        }
        Ok(())
    }
}
