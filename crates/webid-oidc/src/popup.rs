//! Cross-window provider selection channel.
//!
//! When no provider can be resolved, the session opens a popup displaying
//! a provider-picker UI and waits for it to post a structured message back
//! to the opener. The message is parsed into a typed [`SelectionEvent`];
//! unknown event types are logged and ignored, since the same window
//! target may receive unrelated messages.

use serde::Deserialize;
use url::Url;

use crate::host::{HostWindow, PopupWindow};

/// Window name for the selection popup.
pub(crate) const POPUP_NAME: &str = "select-provider";

/// Window features for the selection popup.
pub(crate) const POPUP_FEATURES: &str = "width=500,height=600,resizable=yes,scrollbars=yes";

/// Wire shape of a window message: `{ "event_type": ..., "value": ... }`.
#[derive(Debug, Deserialize)]
struct RawMessage {
    event_type: String,
    #[serde(default)]
    value: Option<String>,
}

/// A window message, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    /// The picker reported a chosen provider URI.
    ProviderSelected(Url),

    /// Anything else: an unrelated message, an unknown event type, or a
    /// `providerSelected` message without a usable URI. Carries a short
    /// description for logging; never treated as a protocol error.
    Unknown(String),
}

impl SelectionEvent {
    /// Classifies a structured window message.
    #[must_use]
    pub fn parse(message: &serde_json::Value) -> Self {
        let Ok(raw) = serde_json::from_value::<RawMessage>(message.clone()) else {
            return Self::Unknown("message is not an {event_type, value} object".to_string());
        };

        if raw.event_type != "providerSelected" {
            return Self::Unknown(format!("event_type {}", raw.event_type));
        }

        match raw.value.as_deref().map(Url::parse) {
            Some(Ok(provider)) => Self::ProviderSelected(provider),
            Some(Err(err)) => Self::Unknown(format!("providerSelected with invalid URI: {err}")),
            None => Self::Unknown("providerSelected without a value".to_string()),
        }
    }
}

/// Tracks the provider-selection popup.
///
/// At most one popup is tracked at a time; a second selection request
/// while one is pending refocuses the existing window rather than opening
/// a duplicate. There is no timeout: if the user never completes
/// selection, the handle lives until the page itself goes away.
#[derive(Default)]
pub(crate) struct SelectionChannel {
    window: Option<Box<dyn PopupWindow>>,
}

impl SelectionChannel {
    /// Opens the picker popup, or refocuses it if one is already open.
    pub(crate) fn open_or_focus(&mut self, host: &dyn HostWindow, picker_url: &Url) {
        if let Some(window) = &self.window {
            tracing::debug!("Selection popup already open; refocusing");
            window.focus();
            return;
        }
        match host.open_window(picker_url, POPUP_NAME, POPUP_FEATURES) {
            Some(window) => self.window = Some(window),
            None => tracing::warn!("Host refused to open the provider selection popup"),
        }
    }

    /// Closes the popup after a selection completed.
    pub(crate) fn close(&mut self) {
        if let Some(window) = self.window.take() {
            window.close();
        }
    }
}
