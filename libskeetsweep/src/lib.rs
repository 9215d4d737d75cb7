//! Skeetsweep - retention management for Bluesky accounts
//!
//! This library fetches an account's complete post and repost history,
//! decides what to keep according to a set of retention rules, and deletes
//! the rest through the account's PDS.

pub mod config;
pub mod credentials;
pub mod deletion;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod platforms;
pub mod retention;
pub mod service;
pub mod thread;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{PlatformError, Result, SweepError};
pub use retention::RetentionPolicy;
pub use types::{Collection, Post, RecordUri, Repost};
