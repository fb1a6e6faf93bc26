//! The authentication session state machine.
//!
//! [`AuthSession`] orchestrates the redirect-based implicit-flow login
//! sequence across page navigations: it resolves which provider to use,
//! loads or registers a relying-party client, decides whether the current
//! page load is a fresh login or the callback half of an earlier one, and
//! keeps the resulting identity in memory and in the durable store.
//!
//! A login spans two independent executions separated by a full-page
//! redirect. Everything that must survive the redirect — the correlation
//! record, the client registration, any nonce material the RP capability
//! stashes — is written to the durable store *before* the navigation; the
//! post-redirect execution is a fresh `AuthSession` reconstructed from the
//! store and the callback URI.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use webid_oidc::{AuthSession, SessionConfig};
//!
//! let mut session = AuthSession::new(host, store, rp, SessionConfig::new());
//!
//! // On every page load: resume an existing session or do nothing.
//! if let Some(web_id) = session.current_user().await? {
//!     println!("logged in as {web_id}");
//! }
//!
//! // On a login button press:
//! session.login(Some("https://p.example".parse()?)).await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;
use crate::host::HostWindow;
use crate::popup::{SelectionChannel, SelectionEvent};
use crate::registry::ClientRegistry;
use crate::rp::{RegisterOptions, RelyingParty, RpClient};
use crate::storage::{AuthStore, KeyValueStore};
use crate::uri::{self, StateLocation};
use crate::AuthResult;

/// The current identity and tokens.
///
/// Owned by the session; mirrored into the durable store as one JSON
/// record. Replaced wholesale on successful login, cleared on logout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The authenticated user's WebID, from the ID token's subject claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_id: Option<Url>,

    /// The raw ID token from the last validated callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// The access token from the last validated callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Session configuration.
///
/// ```
/// use webid_oidc::SessionConfig;
///
/// let config = SessionConfig::new()
///     .with_scope("openid profile email")
///     .with_provider_select_url("https://app.example/select".parse().unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// OAuth scope requested at client registration
    /// (default: `"openid profile"`).
    pub scope: String,

    /// Redirect URI override. When unset, the current location with the
    /// fragment stripped is used.
    pub redirect_uri: Option<Url>,

    /// URL of the provider-picker page opened in a popup when no provider
    /// can be resolved. Without one, interactive selection is disabled.
    pub provider_select_url: Option<Url>,
}

impl SessionConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scope: "openid profile".to_string(),
            redirect_uri: None,
            provider_select_url: None,
        }
    }

    /// Overrides the requested OAuth scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Overrides the redirect URI sent at registration.
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
        self.redirect_uri = Some(redirect_uri);
        self
    }

    /// Sets the provider-picker page for interactive selection.
    #[must_use]
    pub fn with_provider_select_url(mut self, url: Url) -> Self {
        self.provider_select_url = Some(url);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal state of a `login` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The callback validated; the session now holds this WebID.
    LoggedIn(Url),

    /// An authorization redirect was issued. In a real host the page is
    /// departing; nothing further happens in this execution.
    RedirectIssued,

    /// No provider could be resolved. The interactive selection flow, if
    /// configured, will re-invoke `login` out of band.
    AwaitingSelection,

    /// The callback could not be validated because the provider rotated
    /// its signing keys. Not an error: the caller sees "not logged in"
    /// and a subsequent login re-registers and retries.
    Incomplete,
}

impl LoginOutcome {
    /// The authenticated WebID, if this outcome carries one.
    #[must_use]
    pub fn web_id(&self) -> Option<&Url> {
        match self {
            Self::LoggedIn(web_id) => Some(web_id),
            _ => None,
        }
    }

    /// Returns `true` if the login completed with an identity.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::LoggedIn(_))
    }
}

/// The login session orchestrator.
///
/// One instance per page load. Owns the in-memory identity, the current
/// provider, the provider-scoped client cache, and the selection popup
/// handle; everything that must outlive the instance goes through the
/// injected durable store.
pub struct AuthSession {
    host: Arc<dyn HostWindow>,
    store: AuthStore,
    registry: ClientRegistry,
    channel: SelectionChannel,
    config: SessionConfig,
    session: Session,
    current_provider: Option<Url>,
}

impl AuthSession {
    /// Creates a session, hydrating any persisted identity from `store`.
    #[must_use]
    pub fn new(
        host: Arc<dyn HostWindow>,
        store: Arc<dyn KeyValueStore>,
        rp: Arc<dyn RelyingParty>,
        config: SessionConfig,
    ) -> Self {
        let store = AuthStore::new(store);
        let session = store.load_session().unwrap_or_default();
        Self {
            host,
            registry: ClientRegistry::new(rp, store.clone()),
            store,
            channel: SelectionChannel::default(),
            config,
            session,
            current_provider: None,
        }
    }

    /// The current session snapshot.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs the login sequence.
    ///
    /// Depending on what the current page load is, this either returns the
    /// already-authenticated identity, issues an authorization redirect
    /// (after persisting the correlation record), validates a callback, or
    /// hands off to interactive provider selection.
    ///
    /// # Errors
    ///
    /// Registration and request-construction failures from the RP
    /// capability propagate unmodified; a non-recoverable callback
    /// validation failure is returned as
    /// [`AuthError::AuthResponseInvalid`].
    pub async fn login(&mut self, provider: Option<Url>) -> AuthResult<LoginOutcome> {
        if let Some(web_id) = self.session.web_id.clone() {
            tracing::debug!("Already logged in as {web_id}");
            return Ok(LoginOutcome::LoggedIn(web_id));
        }

        // A failed new login must never expose a previous identity.
        self.clear_session_credentials();

        let Some(provider) = self.resolve_provider(provider, true) else {
            tracing::debug!("No provider resolved; awaiting interactive selection");
            return Ok(LoginOutcome::AwaitingSelection);
        };

        self.load_or_register_client(&provider).await?;
        self.validate_or_send_auth_request().await
    }

    /// Returns the current user's WebID, resuming a persisted session or
    /// completing a pending callback if possible.
    ///
    /// Safe to call unconditionally on every page load: when nothing can
    /// be resumed it resolves `None` without side effects, and it never
    /// opens the selection popup.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`login`](Self::login) when a pending flow is
    /// resumed.
    pub async fn current_user(&mut self) -> AuthResult<Option<Url>> {
        if let Some(web_id) = self.session.web_id.clone() {
            return Ok(Some(web_id));
        }

        if let Some(stored) = self.store.load_session() {
            if stored.web_id.is_some() {
                tracing::debug!("Hydrated session from store");
                self.session = stored;
                return Ok(self.session.web_id.clone());
            }
        }

        match self.resolve_provider(None, false) {
            Some(provider) => Ok(self.login(Some(provider)).await?.web_id().cloned()),
            None => Ok(None),
        }
    }

    /// Logs out: clears the session from memory and store, then redirects
    /// to the provider's end-session endpoint if one is advertised.
    ///
    /// The redirect (rather than a background request) lets the provider
    /// clear its own first-party session cookies; `returnToUrl` tells it
    /// where to send the user afterwards. With no current client, or a
    /// client whose provider advertises no end-session endpoint, this is a
    /// no-op beyond clearing the session.
    pub fn logout(&mut self) {
        let end_session = self
            .registry
            .current()
            .and_then(|client| client.end_session_endpoint());

        self.clear_session_credentials();

        if let Some(mut endpoint) = end_session {
            if let Some(current) = self.host.current_location() {
                endpoint
                    .query_pairs_mut()
                    .append_pair("returnToUrl", current.as_str());
            }
            tracing::info!("Redirecting to provider end-session endpoint");
            self.host.navigate(&endpoint);
        }
    }

    /// Resolves which identity provider to use.
    ///
    /// Order: explicit argument, cached current provider (memory, then
    /// store), provider recovered from the current URI's callback state,
    /// then — as a non-blocking fallback — the interactive popup flow,
    /// which returns `None` immediately and re-invokes `login` out of band
    /// via [`deliver_message`](Self::deliver_message).
    pub fn select_provider(&mut self, provider: Option<Url>) -> Option<Url> {
        self.resolve_provider(provider, true)
    }

    /// Handles a structured window message.
    ///
    /// The host forwards every message arriving on the window to this
    /// method. A `providerSelected` event persists the provider, restarts
    /// `login`, and closes the selection popup; anything else is logged
    /// and ignored, since the window may receive unrelated messages.
    ///
    /// # Errors
    ///
    /// Propagates failures from the restarted `login`.
    pub async fn deliver_message(
        &mut self,
        message: &serde_json::Value,
    ) -> AuthResult<Option<LoginOutcome>> {
        match SelectionEvent::parse(message) {
            SelectionEvent::ProviderSelected(provider) => {
                tracing::info!("Provider selected interactively: {provider}");
                self.set_current_provider(provider.clone());
                // The selection is done either way; the popup must not
                // outlive it just because the resumed login failed.
                let outcome = self.login(Some(provider)).await;
                self.channel.close();
                Ok(Some(outcome?))
            }
            SelectionEvent::Unknown(reason) => {
                tracing::debug!("Ignoring window message: {reason}");
                Ok(None)
            }
        }
    }

    /// The current location with the fragment cleared, or `None` if the
    /// host has no location.
    #[must_use]
    pub fn current_location_no_hash(&self) -> Option<Url> {
        self.host
            .current_location()
            .map(|uri| uri::strip_fragment(&uri))
    }

    /// Replaces the visible URI with its fragment-stripped form, so tokens
    /// do not linger in history or bookmarks. No-op if the host exposes no
    /// history capability.
    pub fn clear_auth_response_from_url(&self) {
        if let Some(stripped) = self.current_location_no_hash() {
            self.host.replace_history(&stripped);
        }
    }

    fn resolve_provider(&mut self, explicit: Option<Url>, interactive: bool) -> Option<Url> {
        if let Some(provider) = explicit {
            return Some(provider);
        }
        if let Some(provider) = self.current_provider() {
            return Some(provider);
        }
        if let Some(provider) = self.provider_from_current_uri() {
            return Some(provider);
        }
        if interactive {
            self.select_provider_ui();
        }
        None
    }

    fn current_provider(&mut self) -> Option<Url> {
        if self.current_provider.is_none() {
            self.current_provider = self.store.load_current_provider();
        }
        self.current_provider.clone()
    }

    /// Recovers the provider for a reload that carries a callback state
    /// token, promoting it to current provider.
    ///
    /// The correlation record is read back exactly once per login, so it
    /// is removed after a successful hit; records for abandoned logins are
    /// the only ones that accumulate.
    fn provider_from_current_uri(&mut self) -> Option<Url> {
        let current = self.host.current_location()?;
        let state = uri::extract_state(&current, StateLocation::Fragment)?;
        let provider = self.store.load_provider_by_state(&state)?;
        self.store.remove_provider_by_state(&state);
        tracing::debug!("Recovered provider {provider} from callback state");
        self.set_current_provider(provider.clone());
        Some(provider)
    }

    fn set_current_provider(&mut self, provider: Url) {
        self.store.save_current_provider(&provider);
        self.current_provider = Some(provider);
    }

    fn select_provider_ui(&mut self) {
        let Some(picker) = self.config.provider_select_url.clone() else {
            tracing::warn!("No provider resolved and no provider picker configured");
            return;
        };
        self.channel.open_or_focus(self.host.as_ref(), &picker);
    }

    async fn load_or_register_client(&mut self, provider: &Url) -> AuthResult<Arc<dyn RpClient>> {
        let redirect_uri = self
            .config
            .redirect_uri
            .clone()
            .or_else(|| self.current_location_no_hash())
            .ok_or_else(|| {
                AuthError::invalid_argument(
                    "no redirect URI: configure one or run in a host with a location",
                )
            })?;
        let options = RegisterOptions::new(redirect_uri).with_scope(self.config.scope.clone());
        self.registry.load_or_register(provider, options).await
    }

    /// Decides the direction of the current page load: callback half of an
    /// earlier login, or point of departure for a new one.
    async fn validate_or_send_auth_request(&mut self) -> AuthResult<LoginOutcome> {
        let client = self.registry.current().ok_or(AuthError::MissingClient)?;
        if self.current_uri_has_auth_response() {
            self.init_user_from_response(client.as_ref()).await
        } else {
            self.send_auth_request(client.as_ref()).await
        }
    }

    fn current_uri_has_auth_response(&self) -> bool {
        self.host
            .current_location()
            .is_some_and(|uri| uri::has_auth_response(&uri))
    }

    async fn init_user_from_response(&mut self, client: &dyn RpClient) -> AuthResult<LoginOutcome> {
        let current = self.host.current_location().ok_or_else(|| {
            AuthError::invalid_argument("cannot validate a response without a current location")
        })?;

        let response = match client
            .validate_response(&current, self.store.raw().as_ref())
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_recoverable() => {
                // The provider rotated its signing keys since this client
                // was registered. Resolve "not logged in" so a subsequent
                // login can re-register and retry.
                tracing::warn!("Auth response not validated: {err}; treating as not logged in");
                self.clear_auth_response_from_url();
                return Ok(LoginOutcome::Incomplete);
            }
            Err(err) => {
                return Err(AuthError::auth_response_invalid(err.to_string()));
            }
        };

        // Tokens must leave the visible URI before anything else can fail.
        self.clear_auth_response_from_url();

        let web_id = Url::parse(&response.claims.sub).map_err(|err| {
            AuthError::auth_response_invalid(format!(
                "subject claim is not a valid WebID URI: {err}"
            ))
        })?;

        self.session = Session {
            web_id: Some(web_id.clone()),
            id_token: Some(response.id_token),
            access_token: Some(response.access_token),
        };
        self.store.save_session(&self.session)?;
        tracing::info!("Validated auth response; logged in as {web_id}");
        Ok(LoginOutcome::LoggedIn(web_id))
    }

    async fn send_auth_request(&mut self, client: &dyn RpClient) -> AuthResult<LoginOutcome> {
        let request_uri = client.create_request(self.store.raw().as_ref()).await?;

        let Some(state) = uri::extract_state(&request_uri, StateLocation::Query) else {
            return Err(AuthError::invalid_auth_request(
                "authorization URI carries no state parameter",
            ));
        };

        // The correlation record must be durable before the point of no
        // return: once navigate() runs, nothing in this execution does.
        self.store
            .save_provider_by_state(&state, client.provider_url())?;

        tracing::info!(
            "Issuing authorization redirect to provider {}",
            client.provider_url()
        );
        self.host.navigate(&request_uri);
        Ok(LoginOutcome::RedirectIssued)
    }

    fn clear_session_credentials(&mut self) {
        self.session = Session::default();
        self.store.clear_session();
    }
}
