//! Descript Core
//!
//! Host-side glue around the script policy: reads the whitelist out of the
//! preference store, keeps it in sync, and owns the global domain policy
//! for as long as the extension is running.

mod config;
mod domain_policy;
mod error;
mod extension;

pub use config::Config;
pub use domain_policy::{DomainPolicy, DomainPolicyRegistry};
pub use error::CoreError;
pub use extension::Extension;

// Re-export the policy and storage surface
pub use descript_policy::{
    ContentKind, Decision, Origin, PolicyDecider, PolicyError, Scheme, WhitelistStore,
};
pub use descript_storage::{Database, Preferences, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
///
/// `RUST_LOG` wins over the configured filter. Calling this more than once
/// is harmless.
pub fn init_logging(config: &Config) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
