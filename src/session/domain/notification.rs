//! Notification metadata carried by sessions.

use serde::{Deserialize, Serialize};

/// Title, text and icon of the notification shown for a session.
///
/// The contents are opaque to the session lifecycle; they are persisted and
/// handed to the notifier unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationData {
    /// Notification title.
    pub title: String,
    /// Notification body text.
    pub text: String,
    /// Icon resource reference.
    pub icon: Option<String>,
}

impl NotificationData {
    /// Creates notification data without an icon.
    #[must_use]
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            icon: None,
        }
    }

    /// Sets the icon reference.
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}
