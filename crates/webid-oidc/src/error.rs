//! Login session error types.
//!
//! This module defines all error types that can occur while orchestrating
//! the WebID-OIDC login sequence: argument validation, authorization
//! request construction, and callback validation.

/// Errors that can occur during login session operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A required argument (provider URI, state token) is missing or empty.
    ///
    /// Detected synchronously, before any store or network I/O.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the missing or malformed argument.
        message: String,
    },

    /// Response validation was attempted with no resolved client.
    #[error("No client registered for the current provider")]
    MissingClient,

    /// The constructed authorization URI lacks a `state` correlation token.
    ///
    /// Without a state token the redirect round trip cannot be correlated
    /// back to its provider, so the request is unusable. Indicates a
    /// misbehaving provider or Relying-Party capability.
    #[error("Invalid auth request: {message}")]
    InvalidAuthRequest {
        /// Description of why the request is unusable.
        message: String,
    },

    /// Callback validation failed for a non-recoverable reason.
    #[error("Invalid auth response: {message}")]
    AuthResponseInvalid {
        /// Description of why the response was rejected.
        message: String,
    },

    /// The signing key for the ID token could not be resolved.
    ///
    /// Raised by the Relying-Party capability when the provider rotated
    /// its keys since this client was registered. Explicitly recoverable:
    /// the controller converts it to "not logged in" so a subsequent
    /// login can re-register and retry.
    #[error("Cannot resolve signing key for ID Token")]
    SigningKeyUnresolvable,

    /// An error surfaced by the Relying-Party capability.
    ///
    /// Covers registration and network failures from the injected RP
    /// implementation; propagated unmodified to the caller of `login`.
    #[error("Relying-party error: {message}")]
    Provider {
        /// Description of the underlying RP failure.
        message: String,
    },

    /// A persisted record could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    /// Creates an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an `InvalidAuthRequest` error.
    #[must_use]
    pub fn invalid_auth_request(message: impl Into<String>) -> Self {
        Self::InvalidAuthRequest {
            message: message.into(),
        }
    }

    /// Creates an `AuthResponseInvalid` error.
    #[must_use]
    pub fn auth_response_invalid(message: impl Into<String>) -> Self {
        Self::AuthResponseInvalid {
            message: message.into(),
        }
    }

    /// Creates a `Provider` error.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Returns `true` if the controller recovers from this error by
    /// resolving "not logged in" instead of propagating it.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SigningKeyUnresolvable)
    }

    /// Returns `true` if this is a synchronous argument error raised
    /// before any I/O.
    #[must_use]
    pub fn is_argument_error(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}
