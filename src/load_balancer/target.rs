//! Upstream target abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream address
//! - Normalise bare `host:port` addresses into `http://` URLs
//! - Provide value identity (two targets are equal iff their addresses are)

use std::fmt;
use std::sync::Arc;
use url::Url;

/// Error returned when an address cannot be turned into a [`Target`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("target address is empty")]
    Empty,
    #[error("invalid target address '{address}': {reason}")]
    Invalid { address: String, reason: String },
    #[error("unsupported scheme '{scheme}' for target '{address}' (only http is supported)")]
    UnsupportedScheme { address: String, scheme: String },
}

/// A single upstream server.
///
/// Cheap to clone; the parsed URL is shared.
#[derive(Clone)]
pub struct Target {
    address: Arc<str>,
    base_url: Arc<Url>,
}

impl Target {
    /// Parse an address such as `http://localhost:8001` or `127.0.0.1:8001`.
    pub fn parse(address: &str) -> Result<Self, TargetError> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(TargetError::Empty);
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        let url = Url::parse(&candidate).map_err(|e| TargetError::Invalid {
            address: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "http" {
            return Err(TargetError::UnsupportedScheme {
                address: trimmed.to_string(),
                scheme: url.scheme().to_string(),
            });
        }
        if url.host_str().is_none() {
            return Err(TargetError::Invalid {
                address: trimmed.to_string(),
                reason: "missing host".to_string(),
            });
        }

        // Identity is the normalised address without a trailing slash, so
        // "http://a:1" and "http://a:1/" name the same upstream.
        let address = candidate.trim_end_matches('/').to_string();

        Ok(Self {
            address: address.into(),
            base_url: Arc::new(url),
        })
    }

    /// The normalised address string (identity of the target).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// `host[:port]` as it should appear in an upstream URI authority.
    pub fn authority(&self) -> String {
        let host = self.base_url.host_str().unwrap_or_default();
        match self.base_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Path prefix configured on the target, without the trailing slash.
    pub fn base_path(&self) -> &str {
        self.base_url.path().trim_end_matches('/')
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Target {}

impl std::hash::Hash for Target {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Target").field(&self.address).finish()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}
