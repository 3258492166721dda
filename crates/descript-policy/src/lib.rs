//! Descript Policy Core
//!
//! Decides whether a script load may run, based on a whitelist of origins.
//!
//! - [`origin`]: canonical (scheme, host) identity of a URL
//! - [`WhitelistStore`]: per-scheme host sets, round-tripped through a
//!   single whitespace-separated preference string
//! - [`PolicyDecider`]: the per-load decision function
//!
//! Only `https`, `http` and `file` URLs are restricted. Everything else
//! (`about:`, `data:`, `chrome:`, ...) always passes.

mod decider;
mod error;
pub mod origin;
mod whitelist;

pub use decider::{ContentKind, Decision, PolicyDecider};
pub use error::PolicyError;
pub use origin::{host_key, is_matchable, parse_url, Origin, Scheme};
pub use whitelist::WhitelistStore;

pub type Result<T> = std::result::Result<T, PolicyError>;
