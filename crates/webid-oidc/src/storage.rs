//! Durable keyed store adapter.
//!
//! The host injects a synchronous string key-value store (browser
//! `localStorage` or equivalent). This module defines that contract,
//! ships an in-memory reference implementation, and layers the session's
//! namespacing conventions on top of it.
//!
//! Three record kinds are persisted:
//!
//! - the current session snapshot (fixed key, JSON);
//! - the current provider (fixed key, plain URI string);
//! - per-provider client registrations (`by-provider.<uri>`, opaque blob
//!   produced by the Relying-Party capability);
//! - per-state correlation records (`by-state.<state>`, plain URI string)
//!   written immediately before the authorization redirect so the provider
//!   can be recovered when the page reloads with that state echoed back.
//!
//! The store is treated as a single-writer-at-a-time, last-write-wins
//! resource. Concurrent tabs sharing one store may race on these keys;
//! no locking is attempted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use url::Url;

use crate::error::AuthError;
use crate::session::Session;
use crate::AuthResult;

/// Fixed key holding the serialized current session snapshot.
pub const CURRENT_SESSION_KEY: &str = "current-session";

/// Fixed key holding the current provider URI.
pub const CURRENT_PROVIDER_KEY: &str = "current-provider";

/// Synchronous, string-keyed, string-valued durable store.
///
/// Entries have no expiry and unbounded lifetime. Implementations make no
/// consistency guarantee across concurrent writers; the session treats
/// every key as last-write-wins.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, overwriting any previous value.
    fn set(&self, key: &str, value: &str);

    /// Removes the value stored under `key`, if any.
    fn remove(&self, key: &str);
}

/// In-memory [`KeyValueStore`] backed by a `HashMap`.
///
/// Useful for tests and for hosts without durable storage (where losing
/// state on reload is acceptable).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .expect("store lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .write()
            .expect("store lock poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .expect("store lock poisoned")
            .remove(key);
    }
}

/// Namespacing adapter over the injected store.
///
/// Owns the key conventions for the session's record kinds and the
/// (de)serialization of each record.
#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<dyn KeyValueStore>,
}

impl AuthStore {
    /// Wraps an injected store.
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// The underlying store, for handing to the Relying-Party capability
    /// (which stashes its own nonce/PKCE material there).
    #[must_use]
    pub fn raw(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner
    }

    fn by_state_key(state: &str) -> String {
        format!("by-state.{state}")
    }

    fn by_provider_key(provider: &Url) -> String {
        format!("by-provider.{provider}")
    }

    /// Persists the correlation record `state -> provider`.
    ///
    /// Must complete before the authorization redirect is issued: the
    /// record is the only link between the outgoing request and the
    /// execution that resumes after the provider redirects back.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidArgument`] if `state` is empty, before
    /// any store write.
    pub fn save_provider_by_state(&self, state: &str, provider: &Url) -> AuthResult<()> {
        if state.is_empty() {
            return Err(AuthError::invalid_argument(
                "state is required to save a provider correlation record",
            ));
        }
        self.inner.set(&Self::by_state_key(state), provider.as_str());
        Ok(())
    }

    /// Looks up the provider recorded for `state`.
    ///
    /// Returns `None` when no record exists or the stored value is not a
    /// valid URI (a corrupt record is logged and treated as absent).
    #[must_use]
    pub fn load_provider_by_state(&self, state: &str) -> Option<Url> {
        let value = self.inner.get(&Self::by_state_key(state))?;
        match Url::parse(&value) {
            Ok(provider) => Some(provider),
            Err(err) => {
                tracing::warn!("Discarding corrupt correlation record for state: {err}");
                None
            }
        }
    }

    /// Removes the correlation record for `state`.
    pub fn remove_provider_by_state(&self, state: &str) {
        self.inner.remove(&Self::by_state_key(state));
    }

    /// Persists the serialized client registration for `provider`.
    pub fn save_client_registration(&self, provider: &Url, serialized: &str) {
        self.inner.set(&Self::by_provider_key(provider), serialized);
    }

    /// Returns the serialized client registration for `provider`, if any.
    #[must_use]
    pub fn load_client_registration(&self, provider: &Url) -> Option<String> {
        self.inner.get(&Self::by_provider_key(provider))
    }

    /// Persists `provider` as the current provider.
    pub fn save_current_provider(&self, provider: &Url) {
        self.inner.set(CURRENT_PROVIDER_KEY, provider.as_str());
    }

    /// Returns the persisted current provider, if any.
    #[must_use]
    pub fn load_current_provider(&self) -> Option<Url> {
        let value = self.inner.get(CURRENT_PROVIDER_KEY)?;
        match Url::parse(&value) {
            Ok(provider) => Some(provider),
            Err(err) => {
                tracing::warn!("Discarding corrupt current-provider record: {err}");
                None
            }
        }
    }

    /// Persists the session snapshot as one JSON record.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Serialization`] if the snapshot cannot be
    /// serialized.
    pub fn save_session(&self, session: &Session) -> AuthResult<()> {
        let serialized = serde_json::to_string(session)?;
        self.inner.set(CURRENT_SESSION_KEY, &serialized);
        Ok(())
    }

    /// Hydrates the session snapshot from the store.
    ///
    /// Returns `None` when nothing is persisted; a corrupt record is
    /// logged and treated as absent.
    #[must_use]
    pub fn load_session(&self) -> Option<Session> {
        let serialized = self.inner.get(CURRENT_SESSION_KEY)?;
        match serde_json::from_str(&serialized) {
            Ok(session) => Some(session),
            Err(err) => {
                tracing::warn!("Discarding corrupt session record: {err}");
                None
            }
        }
    }

    /// Removes the persisted session snapshot.
    pub fn clear_session(&self) {
        self.inner.remove(CURRENT_SESSION_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AuthStore {
        AuthStore::new(Arc::new(MemoryStore::new()))
    }

    fn provider() -> Url {
        Url::parse("https://p.example/").unwrap()
    }

    #[test]
    fn test_provider_by_state_round_trip() {
        let store = store();
        store.save_provider_by_state("abcd", &provider()).unwrap();
        assert_eq!(store.load_provider_by_state("abcd"), Some(provider()));

        // Key shape per the store contract.
        assert_eq!(
            store.raw().get("by-state.abcd"),
            Some("https://p.example/".to_string())
        );
    }

    #[test]
    fn test_save_provider_by_state_rejects_empty_state() {
        let store = store();
        let err = store.save_provider_by_state("", &provider()).unwrap_err();
        assert!(err.is_argument_error());
        // Nothing was written.
        assert_eq!(store.raw().get("by-state."), None);
    }

    #[test]
    fn test_provider_by_state_last_write_wins() {
        let store = store();
        let other = Url::parse("https://other.example/").unwrap();
        store.save_provider_by_state("abcd", &provider()).unwrap();
        store.save_provider_by_state("abcd", &other).unwrap();
        assert_eq!(store.load_provider_by_state("abcd"), Some(other));
    }

    #[test]
    fn test_corrupt_correlation_record_is_absent() {
        let store = store();
        store.raw().set("by-state.abcd", "not a uri");
        assert_eq!(store.load_provider_by_state("abcd"), None);
    }

    #[test]
    fn test_remove_provider_by_state() {
        let store = store();
        store.save_provider_by_state("abcd", &provider()).unwrap();
        store.remove_provider_by_state("abcd");
        assert_eq!(store.load_provider_by_state("abcd"), None);
    }

    #[test]
    fn test_client_registration_round_trip() {
        let store = store();
        assert_eq!(store.load_client_registration(&provider()), None);
        store.save_client_registration(&provider(), r#"{"client_id":"c1"}"#);
        assert_eq!(
            store.load_client_registration(&provider()),
            Some(r#"{"client_id":"c1"}"#.to_string())
        );
        assert!(store.raw().get("by-provider.https://p.example/").is_some());
    }

    #[test]
    fn test_current_provider_round_trip() {
        let store = store();
        assert_eq!(store.load_current_provider(), None);
        store.save_current_provider(&provider());
        assert_eq!(store.load_current_provider(), Some(provider()));
    }

    #[test]
    fn test_session_round_trip() {
        let store = store();
        assert!(store.load_session().is_none());

        let session = Session {
            web_id: Some(Url::parse("https://alice.example/profile#me").unwrap()),
            id_token: Some("idt".to_string()),
            access_token: Some("act".to_string()),
        };
        store.save_session(&session).unwrap();

        let loaded = store.load_session().unwrap();
        assert_eq!(loaded.web_id, session.web_id);
        assert_eq!(loaded.id_token, session.id_token);
        assert_eq!(loaded.access_token, session.access_token);

        store.clear_session();
        assert!(store.load_session().is_none());
    }

    #[test]
    fn test_corrupt_session_record_is_absent() {
        let store = store();
        store.raw().set(CURRENT_SESSION_KEY, "{not json");
        assert!(store.load_session().is_none());
    }
}
