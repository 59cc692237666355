//! System orchestration, startup, and shutdown logic.

pub mod admin;
pub mod catalog_system;
pub mod logging;

pub use admin::*;
pub use catalog_system::*;
pub use logging::*;
