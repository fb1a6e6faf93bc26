//! URI state codec.
//!
//! Extracts the opaque `state` correlation token from a URI's query string
//! or fragment, and strips the authentication payload from the fragment
//! once it has been consumed. All functions here are pure.
//!
//! In the implicit flow the provider returns tokens in the redirect URI
//! fragment, encoded as a query string after the `#`. The fragment is
//! therefore parsed with the same rules as a query string.

use url::Url;

/// Where in a URI to look for the `state` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateLocation {
    /// The regular query string (`?state=...`), as in an outgoing
    /// authorization request.
    Query,
    /// The fragment parsed as a query string (`#state=...`), as in an
    /// implicit-flow callback.
    Fragment,
}

/// Extracts the `state` parameter from `uri`.
///
/// Returns `None` if the relevant part is missing (a bare `#`, no query
/// string) or carries no non-empty `state` parameter; `state=` counts as
/// absent. When the parameter occurs more than once, the first non-empty
/// occurrence wins.
#[must_use]
pub fn extract_state(uri: &Url, location: StateLocation) -> Option<String> {
    let raw = match location {
        StateLocation::Query => uri.query()?,
        StateLocation::Fragment => uri.fragment()?,
    };

    url::form_urlencoded::parse(raw.as_bytes())
        .find(|(key, value)| key == "state" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Returns `uri` with the fragment cleared.
#[must_use]
pub fn strip_fragment(uri: &Url) -> Url {
    let mut stripped = uri.clone();
    stripped.set_fragment(None);
    stripped
}

/// Returns `true` iff the fragment of `uri` carries a `state` parameter,
/// i.e. this URI is an implicit-flow callback.
#[must_use]
pub fn has_auth_response(uri: &Url) -> bool {
    extract_state(uri, StateLocation::Fragment).is_some()
}
