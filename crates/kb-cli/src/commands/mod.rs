//! Command implementations for kb-cli

pub mod discover;
pub mod health;
pub mod list;
pub mod refresh;
pub mod serve;

pub use discover::run_discover;
pub use health::run_health;
pub use list::run_list;
pub use refresh::run_refresh;
pub use serve::{run_serve, run_watch};
