//! CLI command implementations

pub mod cleanup;
pub mod collect;
pub mod login;
pub mod watch;

pub use collect::CollectArgs;
pub use watch::WatchArgs;
