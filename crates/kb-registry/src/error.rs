//! Error types for registration

/// Result type for registration.
pub type Result<T> = std::result::Result<T, RegistrationError>;

/// Collisions that cannot be resolved by priority.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// Two workspace packages declare the same command id or alias.
    #[error(
        "command name '{name}' is declared by both workspace packages '{first}' and '{second}'"
    )]
    WorkspaceCollision {
        name: String,
        first: String,
        second: String,
    },
}
