// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling for the cluster operation engine.
//!
//! Operations produce one error per plan step; the engine stops at the
//! first failing step and returns that error verbatim. Per-host failures
//! within a step are joined into a single [`HostErrors`] value unless the
//! operation documents a weaker requirement (for example "first passing
//! host wins").

use std::fmt;
use thiserror::Error;

/// One host's failure within a fan-out.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("host {host} rejected the request as unauthorized: {detail}")]
    Unauthorized { host: String, detail: String },
    #[error("host {host} reported an internal error (status {status}): {detail}")]
    Internal { host: String, status: u16, detail: String },
    #[error("host {host} returned status {status}: {detail}")]
    Status { host: String, status: u16, detail: String },
    #[error("request to host {host} failed: {detail}")]
    Transport { host: String, detail: String },
    #[error("host {host}: {detail}")]
    Response { host: String, detail: String },
}

impl HostError {
    pub fn host(&self) -> &str {
        match self {
            HostError::Unauthorized { host, .. }
            | HostError::Internal { host, .. }
            | HostError::Status { host, .. }
            | HostError::Transport { host, .. }
            | HostError::Response { host, .. } => host,
        }
    }
}

/// Per-host errors joined into one value, preserving host order.
#[derive(Debug, Clone, Default)]
pub struct HostErrors {
    errors: Vec<HostError>,
}

impl HostErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: HostError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostError> {
        self.errors.iter()
    }

    /// Convert the accumulated errors into an operation error, or `Ok`
    /// when nothing failed.
    pub fn into_result(self, op_name: &str) -> Result<(), OpsError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(OpsError::Hosts { op: op_name.to_string(), errors: self })
        }
    }
}

impl fmt::Display for HostErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
            first = false;
        }
        Ok(())
    }
}

/// The error produced by a failed plan step or by pre-dispatch
/// validation.
#[derive(Debug, Error)]
pub enum OpsError {
    /// Rejected before any remote call was made.
    #[error("invalid options: {message}")]
    Validation { message: String },

    /// A 401 carrying a known credential message. The same credentials
    /// will fail everywhere, so the first occurrence aborts the step.
    #[error("[{op}] authentication failed: {source}")]
    Auth {
        op: String,
        #[source]
        source: HostError,
    },

    /// Joined per-host transport and non-2xx failures.
    #[error("[{op}] {errors}")]
    Hosts { op: String, errors: HostErrors },

    /// The response parsed but violates the operation's expectation.
    #[error("[{op}] {message}")]
    Semantic { op: String, message: String },

    /// The cluster is not in the state the command requires.
    #[error("{message}")]
    Precondition { message: String },

    /// A polling operation exhausted its budget.
    #[error("[{op}] timed out after {elapsed:?}: {message}")]
    Timeout { op: String, elapsed: std::time::Duration, message: String },

    /// Cluster-config file access.
    #[error("cluster config: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A bug in plan construction (missing context data, absent host in
    /// a request map). Not a remote failure.
    #[error("[{op}] {message}")]
    Internal { op: String, message: String },
}

impl OpsError {
    pub fn validation(message: impl Into<String>) -> Self {
        OpsError::Validation { message: message.into() }
    }

    pub fn semantic(op: &str, message: impl Into<String>) -> Self {
        OpsError::Semantic { op: op.to_string(), message: message.into() }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        OpsError::Precondition { message: message.into() }
    }

    pub fn internal(op: &str, message: impl Into<String>) -> Self {
        OpsError::Internal { op: op.to_string(), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_errors_join_in_order() {
        let mut errors = HostErrors::new();
        errors.push(HostError::Transport {
            host: "h1".to_string(),
            detail: "connection refused".to_string(),
        });
        errors.push(HostError::Status {
            host: "h2".to_string(),
            status: 503,
            detail: "unavailable".to_string(),
        });
        let err = errors.into_result("TestOp").unwrap_err();
        let text = err.to_string();
        let h1 = text.find("h1").unwrap();
        let h2 = text.find("h2").unwrap();
        assert!(h1 < h2);
    }

    #[test]
    fn empty_host_errors_are_ok() {
        assert!(HostErrors::new().into_result("TestOp").is_ok());
    }
}
