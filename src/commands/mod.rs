pub mod admin;
pub mod run;

// Re-export command functions for convenience
pub use admin::{add, add_proxy, remove, report, seed, set_subscription};
pub use run::run;
