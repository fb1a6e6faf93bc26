//! # webid-oidc
//!
//! Client-side orchestrator for the redirect-based WebID-OIDC / OAuth2
//! implicit-flow login sequence.
//!
//! A redirect login spans two executions of the application: the one that
//! departs to the identity provider, and the fresh one constructed when
//! the provider redirects back with tokens in the URI fragment. This crate
//! owns the state machine that bridges the two — correlating the outgoing
//! request with its callback via an opaque `state` token persisted in a
//! durable key-value store, caching one relying-party client per provider,
//! extracting the WebID from the validated callback, and keeping the
//! session alive across full-page reloads.
//!
//! The protocol mechanics themselves are injected: the host window, the
//! durable store, and the OIDC Relying-Party machinery (discovery, dynamic
//! registration, token validation) are all traits implemented by the
//! embedding application.
//!
//! ## Modules
//!
//! - [`session`] - The auth session state machine (`login`, `logout`,
//!   `current_user`, provider selection)
//! - [`registry`] - Provider-scoped relying-party client cache and registry
//! - [`storage`] - Durable key-value store contract and key conventions
//! - [`rp`] - Injected Relying-Party capability contract
//! - [`host`] - Browser-like host window contract
//! - [`popup`] - Cross-window provider selection channel
//! - [`uri`] - URI state codec
//! - [`error`] - Error taxonomy

pub mod error;
pub mod host;
pub mod popup;
pub mod registry;
pub mod rp;
pub mod session;
pub mod storage;
pub mod uri;

pub use error::AuthError;
pub use host::{HostWindow, PopupWindow};
pub use popup::SelectionEvent;
pub use registry::ClientRegistry;
pub use rp::{IdTokenClaims, RegisterOptions, RelyingParty, RpClient, ValidatedResponse};
pub use session::{AuthSession, LoginOutcome, Session, SessionConfig};
pub use storage::{AuthStore, KeyValueStore, MemoryStore};
pub use uri::{extract_state, has_auth_response, strip_fragment, StateLocation};

/// Type alias for login session results.
pub type AuthResult<T> = Result<T, AuthError>;
