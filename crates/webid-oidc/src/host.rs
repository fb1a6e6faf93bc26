//! Host window contract.
//!
//! The login sequence runs inside a browser-like host: it reads the current
//! location, performs full-page redirects, rewrites history after consuming
//! a callback, and opens a popup for interactive provider selection. This
//! module defines the seam to that host so the session logic stays
//! independent of any particular windowing environment.
//!
//! Message delivery is deliberately not part of this trait: the host
//! forwards each structured window message to
//! [`AuthSession::deliver_message`](crate::session::AuthSession::deliver_message),
//! keeping the cross-window channel an explicit message-passing boundary.

use url::Url;

/// The browser-like host the session runs in.
///
/// Implementations wrap a real `window` (wasm), a webview bridge, or a
/// test double. All methods are infallible from the session's point of
/// view; a host that cannot satisfy a call signals it through the return
/// value (`None`) or by doing nothing.
pub trait HostWindow: Send + Sync {
    /// Returns the current URI, or `None` if the host has no location.
    fn current_location(&self) -> Option<Url>;

    /// Performs a full-page redirect to `url`.
    ///
    /// In a real host this terminates the current execution context; no
    /// further session code runs until the provider redirects back and a
    /// new session instance is constructed.
    fn navigate(&self, url: &Url);

    /// Replaces the visible URI without navigating.
    ///
    /// Used to strip tokens from the fragment after a callback has been
    /// consumed, so they do not linger in history or bookmarks. Hosts
    /// without a history capability may leave the default no-op.
    fn replace_history(&self, url: &Url) {
        let _ = url;
    }

    /// Opens a child window and returns a handle to it, or `None` if the
    /// host cannot open windows (popup blocked, headless host).
    fn open_window(&self, url: &Url, name: &str, features: &str) -> Option<Box<dyn PopupWindow>>;
}

/// Handle to an open child window.
pub trait PopupWindow: Send + Sync {
    /// Brings the window to the foreground.
    fn focus(&self);

    /// Closes the window.
    fn close(&self);
}
