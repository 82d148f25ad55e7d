//! Command registration for the KB command registry.
//!
//! The [`Registrar`] turns discovery results into a [`CommandIndex`]:
//! every loaded manifest becomes a [`RegisteredCommand`], name collisions
//! across packages are resolved by source priority (the loser is kept but
//! marked shadowed), and unmet `requires` entries make a command visible
//! but not executable.
//!
//! Two workspace packages claiming the same name is the one collision
//! that cannot be resolved and fails registration with
//! [`RegistrationError::WorkspaceCollision`].

pub mod error;
pub mod index;
pub mod probe;
pub mod registrar;
pub mod types;

pub use error::{RegistrationError, Result};
pub use index::CommandIndex;
pub use probe::{NodeModulesProbe, RequirementProbe};
pub use registrar::Registrar;
pub use types::RegisteredCommand;
