//! Action naming convention and endpoint derivation.
//!
//! Actions are named `{version}.{service}.{action}`; the remote instance
//! serving them is reached at `{service}-{version}:5000`.

use crate::config::WireConfig;
use crate::{CallgateError, Result};
use std::fmt;
use std::str::FromStr;

/// A parsed `version.service.action` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionName {
    pub version: String,
    pub service: String,
    pub action: String,
}

impl ActionName {
    pub fn parse(name: &str) -> Result<Self> {
        let malformed = || CallgateError::MalformedActionName {
            name: name.to_string(),
        };

        let mut parts = name.split('.');
        let (Some(version), Some(service), Some(action), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        if version.is_empty() || service.is_empty() || action.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            version: version.to_string(),
            service: service.to_string(),
            action: action.to_string(),
        })
    }

    /// Endpoint of the remote instance serving this action's service.
    pub fn endpoint(&self) -> EndpointAddress {
        EndpointAddress {
            host: format!("{}-{}", self.service, self.version),
            port: WireConfig::ENDPOINT_PORT,
        }
    }
}

impl FromStr for ActionName {
    type Err = CallgateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.version, self.service, self.action)
    }
}

/// `host:port` of a remote service instance. Recomputed per call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
