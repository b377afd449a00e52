//! Diesel schema for package session persistence.

diesel::table! {
    /// Durable package session records.
    package_sessions (id) {
        /// Session identifier.
        id -> Uuid,
        /// Session kind discriminant.
        #[max_length = 20]
        kind -> Varchar,
        /// Install or uninstall parameters.
        parameters -> Jsonb,
        /// Lifecycle state discriminant.
        #[max_length = 20]
        state -> Varchar,
        /// Failure payload, present only for failed sessions.
        failure -> Nullable<Jsonb>,
        /// Current progress.
        progress_current -> Int4,
        /// Maximum progress.
        progress_max -> Int4,
        /// Number of commits performed.
        commit_attempts -> Int4,
        /// Notification identifier.
        notification_id -> Int4,
        /// Whether a confirmation was ever launched.
        confirmation_launched -> Bool,
        /// Installer-side session handle.
        native_session_id -> Nullable<Int4>,
        /// Pre-approval claimed but not confirmed.
        preapproval_activating -> Bool,
        /// Pre-approval outstanding.
        preapproval_active -> Bool,
        /// Pre-approval granted.
        preapproved -> Bool,
        /// Latest launch timestamp.
        last_launched_at -> Nullable<Timestamptz>,
        /// Creation timestamp.
        created_at -> Timestamptz,
    }
}
