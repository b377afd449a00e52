//! Parameter objects describing what a session installs or uninstalls.

use super::{
    CommitConstraints, NotificationData, ParseSessionKindError, SessionDomainError,
};
use serde::{Deserialize, Serialize};

/// Kind of operation a session performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Package install.
    Install,
    /// Package uninstall.
    Uninstall,
}

impl SessionKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
        }
    }
}

impl TryFrom<&str> for SessionKind {
    type Error = ParseSessionKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "install" => Ok(Self::Install),
            "uninstall" => Ok(Self::Uninstall),
            _ => Err(ParseSessionKindError(value.to_owned())),
        }
    }
}

/// How the user confirmation is surfaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// Show the confirmation as soon as the session is committed.
    #[default]
    Immediate,
    /// Post a notification the user taps to reach the confirmation.
    Deferred,
}

/// Details shown to the user when requesting install pre-approval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreapprovalDetails {
    /// Package that will be installed.
    pub package_name: String,
    /// User-visible application label.
    pub label: String,
    /// BCP 47 tag of the label's language.
    pub language_tag: String,
    /// Icon resource reference.
    pub icon: Option<String>,
}

impl PreapprovalDetails {
    /// Creates pre-approval details without an icon.
    #[must_use]
    pub fn new(
        package_name: impl Into<String>,
        label: impl Into<String>,
        language_tag: impl Into<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            label: label.into(),
            language_tag: language_tag.into(),
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

/// Parameters of an install session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallParameters {
    packages: Vec<String>,
    /// Confirmation mode.
    pub confirmation: Confirmation,
    /// Notification shown for deferred confirmation.
    pub notification: NotificationData,
    /// Whether the installer must always ask the user.
    pub require_user_action: bool,
    /// Pre-approval to request before staging, if any.
    pub preapproval: Option<PreapprovalDetails>,
    /// Constraints applied to the commit, if any.
    pub constraints: Option<CommitConstraints>,
}

impl InstallParameters {
    /// Creates install parameters for the given package archives.
    ///
    /// # Errors
    ///
    /// Returns [`SessionDomainError::NoPackages`] for an empty list and
    /// [`SessionDomainError::EmptyPackageName`] for a blank entry.
    pub fn new<I, S>(packages: I) -> Result<Self, SessionDomainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let staged = packages
            .into_iter()
            .map(|package| {
                let name: String = package.into();
                if name.trim().is_empty() {
                    Err(SessionDomainError::EmptyPackageName)
                } else {
                    Ok(name)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        if staged.is_empty() {
            return Err(SessionDomainError::NoPackages);
        }
        Ok(Self {
            packages: staged,
            confirmation: Confirmation::default(),
            notification: NotificationData::default(),
            require_user_action: true,
            preapproval: None,
            constraints: None,
        })
    }

    /// Returns the package archives to stage.
    #[must_use]
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Sets the confirmation mode.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Sets the notification data.
    #[must_use]
    pub fn with_notification(mut self, notification: NotificationData) -> Self {
        self.notification = notification;
        self
    }

    /// Sets whether user action is always required.
    #[must_use]
    pub fn with_require_user_action(mut self, require_user_action: bool) -> Self {
        self.require_user_action = require_user_action;
        self
    }

    /// Requests pre-approval before staging.
    #[must_use]
    pub fn with_preapproval(mut self, details: PreapprovalDetails) -> Self {
        self.preapproval = Some(details);
        self
    }

    /// Applies commit constraints.
    #[must_use]
    pub fn with_constraints(mut self, constraints: CommitConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }
}

/// Parameters of an uninstall session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallParameters {
    package_name: String,
    /// Confirmation mode.
    pub confirmation: Confirmation,
    /// Notification shown for deferred confirmation.
    pub notification: NotificationData,
}

impl UninstallParameters {
    /// Creates uninstall parameters for a package.
    ///
    /// # Errors
    ///
    /// Returns [`SessionDomainError::EmptyPackageName`] for a blank name.
    pub fn new(package_name: impl Into<String>) -> Result<Self, SessionDomainError> {
        let name: String = package_name.into();
        if name.trim().is_empty() {
            return Err(SessionDomainError::EmptyPackageName);
        }
        Ok(Self {
            package_name: name,
            confirmation: Confirmation::default(),
            notification: NotificationData::default(),
        })
    }

    /// Returns the package to uninstall.
    #[must_use]
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Sets the confirmation mode.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Sets the notification data.
    #[must_use]
    pub fn with_notification(mut self, notification: NotificationData) -> Self {
        self.notification = notification;
        self
    }
}

/// Parameters of either session kind, persisted as tagged JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionParameters {
    /// Install parameters.
    Install(InstallParameters),
    /// Uninstall parameters.
    Uninstall(UninstallParameters),
}

impl SessionParameters {
    /// Returns the session kind.
    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        match self {
            Self::Install(_) => SessionKind::Install,
            Self::Uninstall(_) => SessionKind::Uninstall,
        }
    }

    /// Returns the notification data.
    #[must_use]
    pub const fn notification(&self) -> &NotificationData {
        match self {
            Self::Install(parameters) => &parameters.notification,
            Self::Uninstall(parameters) => &parameters.notification,
        }
    }

    /// Returns the confirmation mode.
    #[must_use]
    pub const fn confirmation(&self) -> Confirmation {
        match self {
            Self::Install(parameters) => parameters.confirmation,
            Self::Uninstall(parameters) => parameters.confirmation,
        }
    }

    /// Returns the commit constraints of an install session.
    #[must_use]
    pub const fn constraints(&self) -> Option<&CommitConstraints> {
        match self {
            Self::Install(parameters) => parameters.constraints.as_ref(),
            Self::Uninstall(_) => None,
        }
    }
}

impl From<InstallParameters> for SessionParameters {
    fn from(parameters: InstallParameters) -> Self {
        Self::Install(parameters)
    }
}

impl From<UninstallParameters> for SessionParameters {
    fn from(parameters: UninstallParameters) -> Self {
        Self::Uninstall(parameters)
    }
}
