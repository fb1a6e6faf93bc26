//! Relying-Party capability contract.
//!
//! The actual OIDC protocol mechanics — provider discovery, dynamic client
//! registration, authorization-request construction, ID-token signature
//! verification — are delegated to an injected capability defined here.
//! The session orchestrates when these operations happen and persists
//! their results; it never performs cryptography or network transport
//! itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::storage::KeyValueStore;
use crate::AuthResult;

/// Options for registering a relying-party client with a provider.
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    /// The redirect URI the provider will send the callback to.
    pub redirect_uri: Url,

    /// The OAuth scope to request.
    pub scope: String,
}

impl RegisterOptions {
    /// Creates registration options with the default scope
    /// (`"openid profile"`).
    #[must_use]
    pub fn new(redirect_uri: Url) -> Self {
        Self {
            redirect_uri,
            scope: "openid profile".to_string(),
        }
    }

    /// Overrides the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
}

/// Decoded claims from a validated ID token.
///
/// Only the subject claim is interpreted by the session (as the WebID);
/// everything else is carried through for the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Subject identifier. For WebID-OIDC this is the user's WebID URI.
    pub sub: String,

    /// Claims not interpreted by the session.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl IdTokenClaims {
    /// Creates claims with only the subject set.
    #[must_use]
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            extra: HashMap::new(),
        }
    }
}

/// The authorization payload extracted from a validated callback.
#[derive(Debug, Clone)]
pub struct ValidatedResponse {
    /// The raw ID token.
    pub id_token: String,

    /// The access token returned in the fragment.
    pub access_token: String,

    /// Decoded identity claims from the ID token.
    pub claims: IdTokenClaims,
}

/// Capability for registering and reconstituting relying-party clients.
///
/// Implementations wrap a real OIDC RP library; `register` performs
/// provider discovery and dynamic client registration, and `reconstitute`
/// rebuilds a client from the serialized form a previous execution
/// persisted.
#[async_trait]
pub trait RelyingParty: Send + Sync {
    /// Registers a new client with `provider`.
    ///
    /// # Errors
    ///
    /// Implementation-defined errors (discovery or registration failures)
    /// propagate unmodified to the caller of `login`.
    async fn register(
        &self,
        provider: &Url,
        options: &RegisterOptions,
    ) -> AuthResult<Arc<dyn RpClient>>;

    /// Rebuilds a client from its serialized registration record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is corrupt or refers to a
    /// registration shape this capability no longer supports.
    fn reconstitute(&self, serialized: &str) -> AuthResult<Arc<dyn RpClient>>;
}

/// A registered relying-party client for one provider.
#[async_trait]
pub trait RpClient: Send + Sync {
    /// Constructs an authorization request URI.
    ///
    /// The client may stash its own nonce/PKCE material in `store`; the
    /// returned URI must carry a `state` query parameter, which the
    /// session uses as the correlation token for the redirect round trip.
    ///
    /// # Errors
    ///
    /// Implementation-defined errors propagate unmodified.
    async fn create_request(&self, store: &dyn KeyValueStore) -> AuthResult<Url>;

    /// Validates the callback carried by `current_uri` and extracts the
    /// authorization payload.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SigningKeyUnresolvable`](crate::AuthError::SigningKeyUnresolvable)
    /// when the provider rotated its signing keys since this client was
    /// registered; any other failure is fatal to the login.
    async fn validate_response(
        &self,
        current_uri: &Url,
        store: &dyn KeyValueStore,
    ) -> AuthResult<ValidatedResponse>;

    /// Serializes this client's registration for persistence.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration cannot be serialized.
    fn serialize(&self) -> AuthResult<String>;

    /// The provider this client is registered with.
    fn provider_url(&self) -> &Url;

    /// The provider's advertised end-session endpoint, if any.
    fn end_session_endpoint(&self) -> Option<Url>;
}
