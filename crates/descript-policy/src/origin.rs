//! Origin normalization
//!
//! An origin is the (scheme, host) pair a whitelist entry is keyed on. Port,
//! path, query, fragment and credentials never take part in the key.
//!
//! Recognized schemes:
//! | Scheme | Host key                    |
//! | https  | URL host, lowercased        |
//! | http   | URL host, lowercased        |
//! | file   | always `""` (one bucket)    |

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::error::PolicyError;
use crate::Result;

/// A scheme the policy is able to restrict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Https,
    Http,
    File,
}

impl Scheme {
    /// Serialization order of the whitelist
    pub const ALL: [Scheme; 3] = [Scheme::Https, Scheme::Http, Scheme::File];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Https => "https",
            Scheme::Http => "http",
            Scheme::File => "file",
        }
    }

    /// Whether URLs of this scheme carry a meaningful host
    pub fn has_host(&self) -> bool {
        !matches!(self, Scheme::File)
    }

    /// Slot of this scheme in per-scheme tables
    pub(crate) fn index(&self) -> usize {
        match self {
            Scheme::Https => 0,
            Scheme::Http => 1,
            Scheme::File => 2,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // Schemes come out of the URL parser already lowercased; anything
        // else is not a scheme we restrict.
        match s {
            "https" => Ok(Scheme::Https),
            "http" => Ok(Scheme::Http),
            "file" => Ok(Scheme::File),
            _ => Err(format!("Unrecognized scheme: {}", s)),
        }
    }
}

/// Canonical whitelist key of a URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub scheme: Scheme,
    pub host: String,
}

impl Origin {
    pub fn new(scheme: Scheme, host: impl Into<String>) -> Self {
        let host = if scheme.has_host() {
            host.into().to_ascii_lowercase()
        } else {
            String::new()
        };

        Self { scheme, host }
    }

    /// Same as [`host_key`]
    pub fn from_url(url: &Url) -> Result<Self> {
        host_key(url)
    }
}

/// Renders the preference form `scheme://host/`
impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/", self.scheme, self.host)
    }
}

/// Whether the policy restricts loads from this URL at all
pub fn is_matchable(url: &Url) -> bool {
    url.scheme().parse::<Scheme>().is_ok()
}

/// Compute the (scheme, host) key of a matchable URL.
///
/// Fails with [`PolicyError::InvalidUrl`] for unrecognized schemes and for
/// `http`/`https` URLs without a host.
pub fn host_key(url: &Url) -> Result<Origin> {
    let scheme: Scheme = url
        .scheme()
        .parse()
        .map_err(|e: String| PolicyError::InvalidUrl(format!("{}: {}", url, e)))?;

    if !scheme.has_host() {
        return Ok(Origin::new(scheme, ""));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(Origin::new(scheme, host)),
        _ => Err(PolicyError::InvalidUrl(format!("{}: missing host", url))),
    }
}

/// Parse user or preference input into a URL
pub fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|e| PolicyError::InvalidUrl(format!("{}: {}", raw, e)))
}
